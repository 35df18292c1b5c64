//! Record identifiers
//!
//! Every record is keyed by a ULID. ULIDs sort by creation time, which gives
//! the dispatcher a stable tie-break between jobs due at the same instant.

use std::{fmt, str::FromStr};

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            id: ulid::Ulid,
        }

        impl $name {
            #[must_use]
            pub const fn new(id: ulid::Ulid) -> Self {
                Self { id }
            }

            /// Generate a new unique identifier
            #[must_use]
            pub fn generate() -> Self {
                Self {
                    id: ulid::Ulid::new(),
                }
            }

            #[must_use]
            pub const fn ulid(&self) -> ulid::Ulid {
                self.id
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.id)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ulid::Ulid::from_string(s.trim()).map(Self::new)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.id.to_string())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
                Ok(Self { id })
            }
        }
    };
}

ulid_id!(
    /// Identifier of a campaign
    CampaignId
);

ulid_id!(
    /// Identifier of a contact
    ContactId
);

ulid_id!(
    /// Identifier of a single materialized email job
    JobId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse_display() {
        let id = JobId::generate();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);

        assert!("not-a-ulid".parse::<CampaignId>().is_err());
        assert!("  01ARZ3NDEKTSV4RRFFQ69G5FAV ".parse::<ContactId>().is_ok());
    }

    #[test]
    fn test_ids_order_by_creation() {
        let earlier = JobId::new(ulid::Ulid::from_parts(1_000, 0));
        let later = JobId::new(ulid::Ulid::from_parts(2_000, 0));
        assert!(earlier < later);
    }
}
