//! The procedure boundary between the cache and whatever answers queries.

use crate::{
    error::ServiceError,
    model::{
        Id,
        author::{Author, AuthorMarker, Username},
        post::{Post, PostContent, PostMarker, PostWithAuthor},
    },
    query::{QueryData, QueryKey},
};
use async_trait::async_trait;
use std::sync::Arc;

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

/// The read procedures. Feeds come back newest first.
#[async_trait]
pub trait ReadProcedures: Send + Sync {
    async fn get_all_posts(&self) -> Result<Vec<PostWithAuthor>>;

    /// An author without posts yields an empty feed, not an error.
    async fn get_posts_by_user(&self, user_id: Id<AuthorMarker>) -> Result<Vec<PostWithAuthor>>;

    async fn get_post_by_id(&self, post_id: Id<PostMarker>) -> Result<PostWithAuthor>;

    async fn get_user_by_username(&self, username: &Username) -> Result<Author>;

    /// Runs the procedure `key` addresses.
    async fn run(&self, key: &QueryKey) -> Result<QueryData> {
        match key {
            QueryKey::AllPosts => self.get_all_posts().await.map(QueryData::Feed),
            QueryKey::PostsByUser { user_id } => {
                self.get_posts_by_user(*user_id).await.map(QueryData::Feed)
            }
            QueryKey::PostById { post_id } => {
                self.get_post_by_id(*post_id).await.map(QueryData::Post)
            }
            QueryKey::UserByUsername { username } => self
                .get_user_by_username(username)
                .await
                .map(QueryData::Profile),
        }
    }
}

/// The boundary as a signed-in client sees it.
#[async_trait]
pub trait QueryService: ReadProcedures {
    async fn create_post(&self, content: String) -> Result<Post>;
}

/// Server side storage behind the procedures.
#[async_trait]
pub trait PostStore: ReadProcedures {
    async fn insert_post(&self, author: Id<AuthorMarker>, content: PostContent) -> Result<Post>;
}

/// Serves procedures from a [`PostStore`] on behalf of one caller, who may
/// or may not be signed in.
pub struct SessionService<S: ?Sized> {
    store: Arc<S>,
    author: Option<Id<AuthorMarker>>,
}

impl<S: PostStore + ?Sized> SessionService<S> {
    pub fn new(store: Arc<S>, author: Option<Id<AuthorMarker>>) -> Self {
        Self { store, author }
    }
}

#[async_trait]
impl<S: PostStore + ?Sized> ReadProcedures for SessionService<S> {
    async fn get_all_posts(&self) -> Result<Vec<PostWithAuthor>> {
        self.store.get_all_posts().await
    }

    async fn get_posts_by_user(&self, user_id: Id<AuthorMarker>) -> Result<Vec<PostWithAuthor>> {
        self.store.get_posts_by_user(user_id).await
    }

    async fn get_post_by_id(&self, post_id: Id<PostMarker>) -> Result<PostWithAuthor> {
        self.store.get_post_by_id(post_id).await
    }

    async fn get_user_by_username(&self, username: &Username) -> Result<Author> {
        self.store.get_user_by_username(username).await
    }
}

#[async_trait]
impl<S: PostStore + ?Sized> QueryService for SessionService<S> {
    async fn create_post(&self, content: String) -> Result<Post> {
        let author = self.author.ok_or(ServiceError::Unauthenticated)?;
        let content = PostContent::new(content)?;

        self.store.insert_post(author, content).await
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::ServiceError,
        memory::MemoryStore,
        query::QueryKey,
        service::{QueryService, ReadProcedures, SessionService},
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn create_post_requires_author() {
        let store = Arc::new(MemoryStore::default());
        let anonymous = SessionService::new(store, None);

        assert_eq!(
            anonymous.create_post("😀".to_owned()).await,
            Err(ServiceError::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn create_post_revalidates_content() {
        let store = Arc::new(MemoryStore::default());
        let author = store.add_author("dora", "https://img.example/dora.png").unwrap();
        let session = SessionService::new(store.clone(), Some(author.id));

        let err = session.create_post("hello".to_owned()).await.unwrap_err();
        assert_eq!(err.field_message("content"), Some("Only emojis are allowed"));
        assert!(store.get_all_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_dispatches_by_key() {
        let store = Arc::new(MemoryStore::default());
        let author = store.add_author("eve", "").unwrap();
        let session = SessionService::new(store, Some(author.id));
        let post = session.create_post("🎉".to_owned()).await.unwrap();

        let data = session
            .run(&QueryKey::PostById { post_id: post.id })
            .await
            .unwrap();
        assert_eq!(data.as_post().unwrap().post, post);

        let data = session
            .run(&QueryKey::UserByUsername {
                username: author.username.clone(),
            })
            .await
            .unwrap();
        assert_eq!(data.as_profile(), Some(&author));
    }
}
