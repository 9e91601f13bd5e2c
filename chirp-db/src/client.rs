use crate::record::{FullPostRecord, PostRecord, UserRecord};
use async_trait::async_trait;
use chirp_common::{
    error::ServiceError,
    model::{
        ChirpSnowflakeGenerator, Id, ModelValidationError,
        author::{Author, AuthorMarker, Username},
        post::{Post, PostContent, PostMarker, PostWithAuthor},
    },
    service::{self, PostStore, ReadProcedures},
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{PgPool, migrate::MigrateError, postgres::PgPoolOptions, query_as};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] MigrateError),
}

impl From<DbError> for ServiceError {
    fn from(value: DbError) -> Self {
        error!(error = %value, "Database error");
        ServiceError::unknown("Internal database error")
    }
}

const FULL_POST_COLUMNS: &str = "
    posts.post_snowflake,
    posts.content,
    posts.created_at,
    users.user_snowflake,
    users.username,
    users.profile_image_url
";

pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<ChirpSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator = Mutex::new(ChirpSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn connect(
        database_url: &str,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn fetch_user(&self, user_id: Id<AuthorMarker>) -> Result<Option<Author>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_snowflake,
                users.username,
                users.profile_image_url
            FROM
                users.users
            WHERE
                users.user_snowflake = $1
            ",
        )
        .bind(user_id.snowflake().get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        let author = record.map(Author::try_from).transpose()?;
        Ok(author)
    }

    pub async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<Author>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_snowflake,
                users.username,
                users.profile_image_url
            FROM
                users.users
            WHERE
                users.username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let author = record.map(Author::try_from).transpose()?;
        Ok(author)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<PostWithAuthor>> {
        let record = query_as::<_, FullPostRecord>(&format!(
            "
            SELECT {FULL_POST_COLUMNS}
            FROM
                posts.posts NATURAL JOIN users.users
            WHERE
                posts.post_snowflake = $1
            "
        ))
        .bind(post_id.snowflake().get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(PostWithAuthor::try_from).transpose()?;
        Ok(post)
    }

    /// Newest first, optionally only the posts of `author`.
    pub async fn fetch_feed(&self, author: Option<Id<AuthorMarker>>) -> Result<Vec<PostWithAuthor>> {
        let records = query_as::<_, FullPostRecord>(&format!(
            "
            SELECT {FULL_POST_COLUMNS}
            FROM
                posts.posts NATURAL JOIN users.users
            WHERE
                $1::BIGINT IS NULL OR users.user_snowflake = $1
            ORDER BY
                posts.post_snowflake DESC
            "
        ))
        .bind(author.map(|author| author.snowflake().get().cast_signed()))
        .fetch_all(&self.pool)
        .await?;

        let feed = records
            .into_iter()
            .map(PostWithAuthor::try_from)
            .collect::<Result<_, _>>()?;
        Ok(feed)
    }

    pub async fn create_post(
        &self,
        author: Id<AuthorMarker>,
        content: &PostContent,
    ) -> Result<Post> {
        let post_snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate();
        let created_at = OffsetDateTime::from(post_snowflake.created_at());

        let record = query_as::<_, PostRecord>(
            "
            INSERT INTO posts.posts (post_snowflake, user_snowflake, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING
                posts.post_snowflake,
                posts.user_snowflake,
                posts.content,
                posts.created_at
            ",
        )
        .bind(post_snowflake.get().cast_signed())
        .bind(author.snowflake().get().cast_signed())
        .bind(content.get())
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        let post = Post::try_from(record)?;
        debug!(id = %post.id, %author, "Inserted post");

        Ok(post)
    }
}

#[async_trait]
impl ReadProcedures for DbClient {
    async fn get_all_posts(&self) -> service::Result<Vec<PostWithAuthor>> {
        Ok(self.fetch_feed(None).await?)
    }

    async fn get_posts_by_user(
        &self,
        user_id: Id<AuthorMarker>,
    ) -> service::Result<Vec<PostWithAuthor>> {
        Ok(self.fetch_feed(Some(user_id)).await?)
    }

    async fn get_post_by_id(&self, post_id: Id<PostMarker>) -> service::Result<PostWithAuthor> {
        self.fetch_post(post_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Post {post_id}")))
    }

    async fn get_user_by_username(&self, username: &Username) -> service::Result<Author> {
        self.fetch_user_by_username(username)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("User @{username}")))
    }
}

#[async_trait]
impl PostStore for DbClient {
    async fn insert_post(
        &self,
        author: Id<AuthorMarker>,
        content: PostContent,
    ) -> service::Result<Post> {
        if self.fetch_user(author).await?.is_none() {
            return Err(ServiceError::Unauthenticated);
        }

        Ok(self.create_post(author, &content).await?)
    }
}
