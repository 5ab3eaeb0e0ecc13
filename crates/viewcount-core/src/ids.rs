//! Positive integer identifiers for content items and users.
//!
//! Ids arrive from the web layer as signed database keys. They are validated
//! once at the edge so the rest of the pipeline never sees a non-positive id.

use crate::error::{Result, ViewCountError};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! positive_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub struct $name(u64);

        impl $name {
            /// Validate a raw id, rejecting zero and negative values.
            pub fn new(raw: i64) -> Result<Self> {
                if raw <= 0 {
                    return Err(ViewCountError::InvalidArgument {
                        field: $field,
                        value: raw,
                    });
                }
                Ok(Self(raw as u64))
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl TryFrom<i64> for $name {
            type Error = ViewCountError;

            fn try_from(raw: i64) -> Result<Self> {
                Self::new(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0 as i64
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

positive_id!(
    /// Content item (manhwa) whose views are counted.
    ItemId,
    "item_id"
);

positive_id!(
    /// Authenticated viewer.
    UserId,
    "user_id"
);
