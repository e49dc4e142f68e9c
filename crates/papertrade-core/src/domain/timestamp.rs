use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::de::{Error as DeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::ValidationError;

/// An instant pinned to UTC.
///
/// Every timestamp in the system is one of these: quote times, tick times,
/// ledger rows. The wire and storage form is RFC3339 with a `Z` suffix, and
/// anything carrying a non-zero offset is rejected rather than converted, so
/// a timestamp that round-trips through text comes back byte-identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Parse an RFC3339 string, requiring the UTC offset.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let not_utc = || ValidationError::TimestampNotUtc {
            value: input.to_owned(),
        };

        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| not_utc())?;
        if !parsed.offset().is_utc() {
            return Err(not_utc());
        }
        Ok(Self(parsed))
    }

    /// Reconstruct a timestamp from a unix instant in nanoseconds.
    ///
    /// The historical aggregator averages tick instants numerically and
    /// converts the mean back through here.
    pub fn from_unix_nanos(nanos: i128) -> Result<Self, ValidationError> {
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map(Self)
            .map_err(|_| ValidationError::TimestampOutOfRange { nanos })
    }

    /// The unix instant in nanoseconds.
    pub fn unix_nanos(self) -> i128 {
        self.0.unix_timestamp_nanos()
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .expect("UTC instants always format as RFC3339")
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl FromStr for UtcDateTime {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

struct UtcDateTimeVisitor;

impl Visitor<'_> for UtcDateTimeVisitor {
    type Value = UtcDateTime;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("an RFC3339 UTC timestamp")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: DeError,
    {
        UtcDateTime::parse(value).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(UtcDateTimeVisitor)
    }
}
