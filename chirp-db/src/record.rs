use chirp_common::model::{
    ModelValidationError,
    author::{Author, Username},
    post::{Post, PostContent, PostWithAuthor},
};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub struct UserRecord {
    pub user_snowflake: i64,
    pub username: String,
    pub profile_image_url: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub struct PostRecord {
    pub post_snowflake: i64,
    pub user_snowflake: i64,
    pub content: String,
    pub created_at: OffsetDateTime,
}

/// A post joined with its author.
#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub struct FullPostRecord {
    pub post_snowflake: i64,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub user_snowflake: i64,
    pub username: String,
    pub profile_image_url: String,
}

impl TryFrom<UserRecord> for Author {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_snowflake.cast_unsigned().into(),
            username: Username::new(value.username)?,
            profile_image_url: value.profile_image_url,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.post_snowflake.cast_unsigned().into(),
            author_id: value.user_snowflake.cast_unsigned().into(),
            content: PostContent::new(value.content)?,
            created_at: value.created_at.to_utc(),
        })
    }
}

impl TryFrom<FullPostRecord> for PostWithAuthor {
    type Error = ModelValidationError;

    fn try_from(value: FullPostRecord) -> Result<Self, Self::Error> {
        let author = Author::try_from(UserRecord {
            user_snowflake: value.user_snowflake,
            username: value.username,
            profile_image_url: value.profile_image_url,
        })?;
        let post = Post::try_from(PostRecord {
            post_snowflake: value.post_snowflake,
            user_snowflake: value.user_snowflake,
            content: value.content,
            created_at: value.created_at,
        })?;

        Ok(Self { post, author })
    }
}
