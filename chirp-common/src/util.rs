/// Serde helpers writing [`UtcDateTime`](time::UtcDateTime) as RFC 3339 with
/// full sub-second precision, so timestamps survive a JSON round trip exactly.
///
/// Use with `#[serde(with = "crate::util::rfc3339")]`.
pub mod rfc3339 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::Error as _};
    use time::{OffsetDateTime, UtcDateTime, format_description::well_known::Rfc3339};

    pub fn serialize<S>(value: &UtcDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = OffsetDateTime::from(*value)
            .format(&Rfc3339)
            .map_err(S::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<UtcDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        OffsetDateTime::parse(&raw, &Rfc3339)
            .map(OffsetDateTime::to_utc)
            .map_err(D::Error::custom)
    }
}
