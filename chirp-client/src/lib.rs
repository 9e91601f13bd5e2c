//! Client session state: the query cache and the post composer.
//!
//! A session starts from the [`PagePayload`] the server rendered:
//!
//! ```no_run
//! # use chirp_common::{hydration::PagePayload, service::QueryService};
//! # use std::sync::Arc;
//! # fn run<S: QueryService + 'static>(service: Arc<S>, page: &PagePayload) {
//! let cache = chirp_client::start_session(service.clone(), page);
//! let composer = chirp_client::mutation::PostComposer::new(cache.clone(), service);
//! # }
//! ```

pub mod cache;
mod lock;
pub mod mutation;

use cache::QueryCache;
use chirp_common::{hydration::PagePayload, service::ReadProcedures};
use std::sync::Arc;
use tracing::debug;

/// Creates the session's cache and seeds it with the page's prefetched
/// queries, before any view gets to read from it.
///
/// Requests run on the current Tokio runtime; use
/// [`QueryCache::with_runtime`] to start a session from elsewhere.
#[track_caller]
pub fn start_session(service: Arc<dyn ReadProcedures>, page: &PagePayload) -> QueryCache {
    let cache = QueryCache::new(service);
    let hydrated = cache.hydrate(&page.hydration);
    debug!(route = %page.route, hydrated, "Started session");
    cache
}
