use crate::server::{Result, ServerError, bridge::prefetch, json::Json};
use axum::{
    extract::State,
    http::{Method, Uri},
};
use chirp_common::{hydration::PagePayload, route::PageRoute, service::PostStore};
use std::sync::Arc;

/// Everything outside `/api` is a page: resolve it and ship its first
/// queries along.
pub async fn page(
    method: Method,
    uri: Uri,
    State(store): State<Arc<dyn PostStore>>,
) -> Result<Json<PagePayload>> {
    if method != Method::GET || uri.path().starts_with("/api/") || uri.path() == "/api" {
        return Err(ServerError::UnknownRoute(uri));
    }

    let route = PageRoute::parse(uri.path()).ok_or_else(|| ServerError::UnknownRoute(uri.clone()))?;
    let hydration = prefetch(&*store, &route).await?;

    Ok(Json(PagePayload { route, hydration }))
}
