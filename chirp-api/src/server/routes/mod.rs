use crate::server::ServerRouter;

mod pages;
mod posts;
mod users;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(posts::routes())
        .merge(users::routes())
        .fallback(pages::page)
}
