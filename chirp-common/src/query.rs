//! Cache addresses and the results stored under them.

use crate::model::{
    Id,
    author::{Author, AuthorMarker, Username},
    post::{PostMarker, PostWithAuthor},
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Procedure {
    AllPosts,
    PostsByUser,
    PostById,
    UserByUsername,
}

impl Procedure {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Procedure::AllPosts => "allPosts",
            Procedure::PostsByUser => "postsByUser",
            Procedure::PostById => "postById",
            Procedure::UserByUsername => "userByUsername",
        }
    }
}

/// A read procedure together with its input.
///
/// Structurally equal inputs give equal keys, so this is the only address
/// into the cache.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(tag = "procedure", content = "input", rename_all = "camelCase")]
pub enum QueryKey {
    AllPosts,
    #[serde(rename_all = "camelCase")]
    PostsByUser {
        user_id: Id<AuthorMarker>,
    },
    #[serde(rename_all = "camelCase")]
    PostById {
        post_id: Id<PostMarker>,
    },
    #[serde(rename_all = "camelCase")]
    UserByUsername {
        username: Username,
    },
}

impl QueryKey {
    #[must_use]
    pub fn procedure(&self) -> Procedure {
        match self {
            QueryKey::AllPosts => Procedure::AllPosts,
            QueryKey::PostsByUser { .. } => Procedure::PostsByUser,
            QueryKey::PostById { .. } => Procedure::PostById,
            QueryKey::UserByUsername { .. } => Procedure::UserByUsername,
        }
    }

    /// Whether the result of this key is a feed that a new post by `author`
    /// belongs to.
    #[must_use]
    pub fn includes_posts_by(&self, author: Id<AuthorMarker>) -> bool {
        match self {
            QueryKey::AllPosts => true,
            QueryKey::PostsByUser { user_id } => *user_id == author,
            QueryKey::PostById { .. } | QueryKey::UserByUsername { .. } => false,
        }
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.procedure().name())?;
        match self {
            QueryKey::AllPosts => f.write_str("{}"),
            QueryKey::PostsByUser { user_id } => write!(f, "{{\"userId\":{user_id}}}"),
            QueryKey::PostById { post_id } => write!(f, "{{\"postId\":{post_id}}}"),
            QueryKey::UserByUsername { username } => {
                let username = serde_json::to_string(username).map_err(|_| std::fmt::Error)?;
                write!(f, "{{\"username\":{username}}}")
            }
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(tag = "shape", content = "value", rename_all = "camelCase")]
pub enum QueryData {
    Feed(Vec<PostWithAuthor>),
    Post(PostWithAuthor),
    Profile(Author),
}

impl QueryData {
    #[must_use]
    pub fn as_feed(&self) -> Option<&[PostWithAuthor]> {
        match self {
            QueryData::Feed(feed) => Some(feed),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_post(&self) -> Option<&PostWithAuthor> {
        match self {
            QueryData::Post(post) => Some(post),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_profile(&self) -> Option<&Author> {
        match self {
            QueryData::Profile(author) => Some(author),
            _ => None,
        }
    }
}
