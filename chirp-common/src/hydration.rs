//! Query results computed while generating a page, shipped inside the page so
//! the client cache starts warm.

use crate::{
    query::{QueryData, QueryKey},
    route::PageRoute,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, btree_map};
use time::UtcDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DehydratedQuery {
    pub data: QueryData,
    #[serde(with = "crate::util::rfc3339")]
    pub fetched_at: UtcDateTime,
}

/// Prefetched results by key.
///
/// Serialized as a list of `{ key, data, fetchedAt }` objects, since keys are
/// structured and JSON object keys are not.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct HydrationPayload {
    queries: BTreeMap<QueryKey, DehydratedQuery>,
}

impl HydrationPayload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: QueryKey, data: QueryData, fetched_at: UtcDateTime) {
        self.queries
            .insert(key, DehydratedQuery { data, fetched_at });
    }

    #[must_use]
    pub fn get(&self, key: &QueryKey) -> Option<&DehydratedQuery> {
        self.queries.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, QueryKey, DehydratedQuery> {
        self.queries.iter()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl<'a> IntoIterator for &'a HydrationPayload {
    type Item = (&'a QueryKey, &'a DehydratedQuery);
    type IntoIter = btree_map::Iter<'a, QueryKey, DehydratedQuery>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryRef<'a> {
    key: &'a QueryKey,
    data: &'a QueryData,
    #[serde(with = "crate::util::rfc3339")]
    fetched_at: UtcDateTime,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    key: QueryKey,
    data: QueryData,
    #[serde(with = "crate::util::rfc3339")]
    fetched_at: UtcDateTime,
}

impl Serialize for HydrationPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.queries.iter().map(|(key, query)| EntryRef {
            key,
            data: &query.data,
            fetched_at: query.fetched_at,
        }))
    }
}

impl<'de> Deserialize<'de> for HydrationPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut payload = HydrationPayload::new();
        for entry in Vec::<Entry>::deserialize(deserializer)? {
            payload
                .queries
                .entry(entry.key)
                .or_insert(DehydratedQuery {
                    data: entry.data,
                    fetched_at: entry.fetched_at,
                });
        }
        Ok(payload)
    }
}

/// What a page request produces: the route it resolved to and the queries
/// its views will read first.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct PagePayload {
    pub route: PageRoute,
    pub hydration: HydrationPayload,
}
