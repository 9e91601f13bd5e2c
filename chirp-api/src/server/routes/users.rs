use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use chirp_common::{
    error::ServiceError,
    model::{
        Id,
        author::{Author, AuthorMarker, Username},
        post::PostWithAuthor,
    },
    service::PostStore,
};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_user_posts)
        .typed_get(get_user_by_username)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/{id}/posts", rejection(ServerError))]
struct UserPostsPath {
    id: Id<AuthorMarker>,
}

async fn get_user_posts(
    UserPostsPath { id }: UserPostsPath,
    State(store): State<Arc<dyn PostStore>>,
) -> Result<Json<Vec<PostWithAuthor>>> {
    let posts = store.get_posts_by_user(id).await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/by-username/{username}", rejection(ServerError))]
struct UserByUsernamePath {
    username: String,
}

async fn get_user_by_username(
    UserByUsernamePath { username }: UserByUsernamePath,
    State(store): State<Arc<dyn PostStore>>,
) -> Result<Json<Author>> {
    // No stored author can have an invalid name.
    let username = Username::from_slug(&username)
        .map_err(|_| ServiceError::not_found(format!("User {username}")))?;
    let author = store.get_user_by_username(&username).await?;

    Ok(Json(author))
}
