//! A [`PostStore`] living in process memory, for development servers and
//! tests.

use crate::{
    error::ServiceError,
    model::{
        ChirpSnowflakeGenerator, Id,
        author::{Author, AuthorMarker, InvalidUsernameError, Username},
        post::{Post, PostContent, PostMarker, PostWithAuthor},
    },
    service::{PostStore, ReadProcedures, Result},
    snowflake::{ProcessId, WorkerId},
};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

#[derive(Debug, Default)]
struct Tables {
    authors: BTreeMap<Id<AuthorMarker>, Author>,
    posts: BTreeMap<Id<PostMarker>, Post>,
}

#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    snowflake_generator: Mutex<ChirpSnowflakeGenerator>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            tables: Mutex::default(),
            snowflake_generator: Mutex::new(ChirpSnowflakeGenerator::new(worker_id, process_id)),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id<Marker>(&self) -> Id<Marker> {
        self.snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()
            .into()
    }

    pub fn add_author(
        &self,
        username: &str,
        profile_image_url: &str,
    ) -> Result<Author, InvalidUsernameError> {
        let author = Author {
            id: self.next_id(),
            username: Username::new(username.to_owned())?,
            profile_image_url: profile_image_url.to_owned(),
        };

        self.tables().authors.insert(author.id, author.clone());
        debug!(id = %author.id, username = %author.username, "Added author");

        Ok(author)
    }

    fn feed(&self, filter: impl Fn(&Post) -> bool) -> Vec<PostWithAuthor> {
        let tables = self.tables();

        // Ids are snowflakes, so reverse id order is newest first.
        tables
            .posts
            .values()
            .rev()
            .filter(|post| filter(post))
            .filter_map(|post| {
                let author = tables.authors.get(&post.author_id)?;
                Some(PostWithAuthor {
                    post: post.clone(),
                    author: author.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ReadProcedures for MemoryStore {
    async fn get_all_posts(&self) -> Result<Vec<PostWithAuthor>> {
        Ok(self.feed(|_| true))
    }

    async fn get_posts_by_user(&self, user_id: Id<AuthorMarker>) -> Result<Vec<PostWithAuthor>> {
        Ok(self.feed(|post| post.author_id == user_id))
    }

    async fn get_post_by_id(&self, post_id: Id<PostMarker>) -> Result<PostWithAuthor> {
        let tables = self.tables();
        let post = tables
            .posts
            .get(&post_id)
            .ok_or_else(|| ServiceError::not_found(format!("Post {post_id}")))?;
        let author = tables
            .authors
            .get(&post.author_id)
            .ok_or_else(|| ServiceError::not_found(format!("Author {}", post.author_id)))?;

        Ok(PostWithAuthor {
            post: post.clone(),
            author: author.clone(),
        })
    }

    async fn get_user_by_username(&self, username: &Username) -> Result<Author> {
        self.tables()
            .authors
            .values()
            .find(|author| author.username == *username)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("User @{username}")))
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert_post(&self, author: Id<AuthorMarker>, content: PostContent) -> Result<Post> {
        if !self.tables().authors.contains_key(&author) {
            return Err(ServiceError::Unauthenticated);
        }

        let id = self.next_id::<PostMarker>();
        let post = Post {
            id,
            author_id: author,
            content,
            created_at: id.created_at(),
        };

        self.tables().posts.insert(post.id, post.clone());
        debug!(id = %post.id, author = %author, "Inserted post");

        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::ServiceError,
        memory::MemoryStore,
        model::{Id, author::Username, post::PostContent},
        service::{PostStore, ReadProcedures},
    };

    fn content(raw: &str) -> PostContent {
        PostContent::new(raw.to_owned()).unwrap()
    }

    #[tokio::test]
    async fn feeds_are_newest_first() {
        let store = MemoryStore::default();
        let alice = store.add_author("alice", "").unwrap();
        let bob = store.add_author("bob", "").unwrap();

        let first = store.insert_post(alice.id, content("🌱")).await.unwrap();
        let second = store.insert_post(bob.id, content("🌿")).await.unwrap();
        let third = store.insert_post(alice.id, content("🌳")).await.unwrap();

        let all: Vec<_> = store
            .get_all_posts()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.post.id)
            .collect();
        assert_eq!(all, vec![third.id, second.id, first.id]);

        let alices: Vec<_> = store
            .get_posts_by_user(alice.id)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.post.id)
            .collect();
        assert_eq!(alices, vec![third.id, first.id]);
    }

    #[tokio::test]
    async fn missing_things_are_not_found() {
        let store = MemoryStore::default();

        assert!(matches!(
            store.get_post_by_id(Id::from(5)).await,
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            store
                .get_user_by_username(&Username::new("nobody".to_owned()).unwrap())
                .await,
            Err(ServiceError::NotFound { .. })
        ));
        assert_eq!(store.get_posts_by_user(Id::from(5)).await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn unknown_author_cannot_post() {
        let store = MemoryStore::default();

        assert_eq!(
            store.insert_post(Id::from(9), content("👻")).await,
            Err(ServiceError::Unauthenticated)
        );
    }
}
