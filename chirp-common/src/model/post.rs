use crate::{
    model::{
        Id,
        author::{Author, AuthorMarker},
    },
    validation::{ContentError, validate},
};
use serde::{Deserialize, Deserializer, Serialize, de::Error};
use std::fmt::{Display, Formatter};
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author_id: Id<AuthorMarker>,
    pub content: PostContent,
    #[serde(with = "crate::util::rfc3339")]
    pub created_at: UtcDateTime,
}

/// A post joined with its author, the shape every feed read returns.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
pub struct PostWithAuthor {
    pub post: Post,
    pub author: Author,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct CreatePost {
    pub content: String,
}

/// Post body that passed [`validate`].
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct PostContent(String);

impl PostContent {
    pub fn new(content: String) -> Result<Self, ContentError> {
        validate(&content)?;
        Ok(Self(content))
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for PostContent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PostContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        validate(&inner).map_err(Error::custom)?;
        Ok(Self(inner))
    }
}
