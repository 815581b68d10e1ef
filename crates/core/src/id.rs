//! Strongly-typed identifiers for execution records.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Storage identifier of an execution record.
///
/// Time-ordered (UUIDv7) so records sort by creation in storage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

/// Correlation code of one async job.
///
/// Generated once per execute call (random UUIDv4) and used as the only key for
/// subsequent ledger updates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationCode(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The nil id marks a record whose storage id has not been assigned yet.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationCode {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(RecordId, "RecordId");
impl_uuid_newtype!(CorrelationCode, "CorrelationCode");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_unique() {
        let a = CorrelationCode::generate();
        let b = CorrelationCode::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn code_round_trips_through_display() {
        let code = CorrelationCode::generate();
        let parsed: CorrelationCode = code.to_string().parse().unwrap();
        assert_eq!(parsed, code);
    }

    #[test]
    fn parse_failure_names_the_type() {
        let err = "not-a-uuid".parse::<RecordId>().unwrap_err();
        match err {
            DomainError::InvalidId(msg) => assert!(msg.starts_with("RecordId")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nil_record_id_is_detected() {
        assert!(RecordId::nil().is_nil());
        assert!(!RecordId::new().is_nil());
    }
}
