//! Server side of hydration: runs the queries a page reads first and packs
//! their results for the client cache.

use chirp_common::{
    error::ServiceError,
    hydration::HydrationPayload,
    route::PageRoute,
    service::ReadProcedures,
};
use thiserror::Error;
use time::UtcDateTime;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Page resource missing: {0}")]
    NotFound(ServiceError),
    #[error("Prefetching page failed: {0}")]
    Service(ServiceError),
}

impl From<ServiceError> for BridgeError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::NotFound { .. } => Self::NotFound(value),
            _ => Self::Service(value),
        }
    }
}

/// Runs every query `route` needs directly against `store`.
///
/// Fails on the first error, so a page is never rendered half prefetched.
pub async fn prefetch<S>(store: &S, route: &PageRoute) -> Result<HydrationPayload, BridgeError>
where
    S: ReadProcedures + ?Sized,
{
    let mut payload = HydrationPayload::new();
    let mut dependent = Vec::new();

    for key in route.required_keys() {
        let data = store.run(&key).await?;
        if let Some(author) = data.as_profile() {
            dependent.extend(route.dependent_keys(author));
        }
        payload.insert(key, data, UtcDateTime::now());
    }

    for key in dependent {
        let data = store.run(&key).await?;
        payload.insert(key, data, UtcDateTime::now());
    }

    debug!(%route, queries = payload.len(), "Prefetched page");

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use crate::server::bridge::{BridgeError, prefetch};
    use chirp_common::{
        memory::MemoryStore,
        model::{Id, author::Username, post::PostContent},
        query::QueryKey,
        route::PageRoute,
        service::PostStore,
    };

    #[tokio::test]
    async fn home_prefetches_the_global_feed() {
        let store = MemoryStore::default();
        let author = store.add_author("ana", "").unwrap();
        let post = store
            .insert_post(author.id, PostContent::new("🐙".to_owned()).unwrap())
            .await
            .unwrap();

        let payload = prefetch(&store, &PageRoute::Home).await.unwrap();

        assert_eq!(payload.len(), 1);
        let feed = payload.get(&QueryKey::AllPosts).unwrap().data.as_feed().unwrap();
        assert_eq!(feed[0].post, post);
    }

    #[tokio::test]
    async fn profile_prefetches_author_and_their_feed() {
        let store = MemoryStore::default();
        let author = store.add_author("ben", "").unwrap();
        let username = Username::new("ben".to_owned()).unwrap();

        let payload = prefetch(
            &store,
            &PageRoute::Profile {
                username: username.clone(),
            },
        )
        .await
        .unwrap();

        assert_eq!(payload.len(), 2);
        assert!(payload.get(&QueryKey::UserByUsername { username }).is_some());
        let feed = payload
            .get(&QueryKey::PostsByUser { user_id: author.id })
            .unwrap();
        assert_eq!(feed.data.as_feed(), Some(&[][..]));
    }

    #[tokio::test]
    async fn missing_post_is_not_found() {
        let store = MemoryStore::default();

        let err = prefetch(&store, &PageRoute::Post { id: Id::from(99) })
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::NotFound(_)));
    }
}
