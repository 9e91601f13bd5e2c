//! Identity of the caller.
//!
//! Sign-in happens in front of this server; the proxy forwards the signed-in
//! author's id in the `x-chirp-user` header and strips it from anything it
//! did not authenticate itself.

use crate::server::ServerError;
use axum::{
    extract::FromRequestParts,
    http::{HeaderName, HeaderValue, request::Parts},
};
use axum_extra::TypedHeader;
use chirp_common::model::{Id, author::AuthorMarker};
use headers::Header;

static X_CHIRP_USER: HeaderName = HeaderName::from_static("x-chirp-user");

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct ChirpUser(pub Id<AuthorMarker>);

impl Header for ChirpUser {
    fn name() -> &'static HeaderName {
        &X_CHIRP_USER
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        if values.next().is_some() {
            return Err(headers::Error::invalid());
        }

        value
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .map(Self)
            .ok_or_else(headers::Error::invalid)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(std::iter::once(HeaderValue::from(u64::from(self.0))));
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct AuthenticatedUser {
    id: Id<AuthorMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn author_id(self) -> Id<AuthorMarker> {
        self.id
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(ChirpUser(id)) = TypedHeader::<ChirpUser>::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidUserHeader)?;

        Ok(Self { id })
    }
}

#[cfg(test)]
mod tests {
    use crate::server::auth::ChirpUser;
    use axum::http::HeaderValue;
    use chirp_common::model::Id;
    use headers::Header;

    fn decode(values: &[&'static str]) -> Option<ChirpUser> {
        let values: Vec<_> = values
            .iter()
            .copied()
            .map(HeaderValue::from_static)
            .collect();
        ChirpUser::decode(&mut values.iter()).ok()
    }

    #[test]
    fn decodes_a_single_id() {
        assert_eq!(decode(&["42"]), Some(ChirpUser(Id::from(42))));
        assert_eq!(decode(&[" 7 "]), Some(ChirpUser(Id::from(7))));
    }

    #[test]
    fn rejects_garbage_and_duplicates() {
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&["alice"]), None);
        assert_eq!(decode(&["1", "2"]), None);
    }
}
