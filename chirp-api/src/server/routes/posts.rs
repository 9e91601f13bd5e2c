use crate::server::{Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use chirp_common::{
    model::{
        Id,
        post::{CreatePost, Post, PostMarker, PostWithAuthor},
    },
    service::{PostStore, QueryService, SessionService},
};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_all_posts)
        .typed_post(create_post)
        .typed_get(get_post)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts", rejection(ServerError))]
struct PostsPath();

async fn get_all_posts(
    PostsPath(): PostsPath,
    State(store): State<Arc<dyn PostStore>>,
) -> Result<Json<Vec<PostWithAuthor>>> {
    let posts = store.get_all_posts().await?;

    Ok(Json(posts))
}

async fn create_post(
    PostsPath(): PostsPath,
    State(store): State<Arc<dyn PostStore>>,
    user: AuthenticatedUser,
    Json(CreatePost { content }): Json<CreatePost>,
) -> Result<(StatusCode, Json<Post>)> {
    let session = SessionService::new(store, Some(user.author_id()));
    let post = session.create_post(content).await?;

    Ok((StatusCode::CREATED, Json(post)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    PostPath { id }: PostPath,
    State(store): State<Arc<dyn PostStore>>,
) -> Result<Json<PostWithAuthor>> {
    let post = store.get_post_by_id(id).await?;

    Ok(Json(post))
}
