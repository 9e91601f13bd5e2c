use crate::{
    model::{
        Id,
        author::{Author, Username},
        post::PostMarker,
    },
    query::QueryKey,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The pages of the site. Each one knows which queries its first render
/// reads, so they can be prefetched.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(tag = "page", rename_all = "camelCase")]
pub enum PageRoute {
    /// `/`
    Home,
    /// `/@{username}`
    Profile { username: Username },
    /// `/post/{id}`
    Post { id: Id<PostMarker> },
}

impl PageRoute {
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.strip_prefix('/')?;
        let path = path.strip_suffix('/').unwrap_or(path);

        if path.is_empty() {
            return Some(Self::Home);
        }

        if let Some(id) = path.strip_prefix("post/") {
            return id.parse().ok().map(|id| Self::Post { id });
        }

        if path.starts_with('@') && !path.contains('/') {
            return Username::from_slug(path)
                .ok()
                .map(|username| Self::Profile { username });
        }

        None
    }

    /// Keys that follow from the route parameters alone.
    #[must_use]
    pub fn required_keys(&self) -> Vec<QueryKey> {
        match self {
            PageRoute::Home => vec![QueryKey::AllPosts],
            PageRoute::Profile { username } => vec![QueryKey::UserByUsername {
                username: username.clone(),
            }],
            PageRoute::Post { id } => vec![QueryKey::PostById { post_id: *id }],
        }
    }

    /// Keys that become known once `author` has been resolved for this page.
    #[must_use]
    pub fn dependent_keys(&self, author: &Author) -> Vec<QueryKey> {
        match self {
            PageRoute::Profile { .. } => vec![QueryKey::PostsByUser { user_id: author.id }],
            PageRoute::Home | PageRoute::Post { .. } => Vec::new(),
        }
    }
}

impl Display for PageRoute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PageRoute::Home => f.write_str("/"),
            PageRoute::Profile { username } => write!(f, "/@{username}"),
            PageRoute::Post { id } => write!(f, "/post/{id}"),
        }
    }
}
