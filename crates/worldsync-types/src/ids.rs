//! Type-safe identifier wrappers around `u32` form ids.
//!
//! Runtime ids are ephemeral: they are only meaningful for the current
//! session and the current load order. Anything persisted goes through
//! [`FormDesc`](crate::FormDesc) instead.

use serde::{Deserialize, Serialize};

/// First id handed out to forms created at runtime (not backed by a record).
pub const FIRST_RUNTIME_FORM_ID: u32 = 0xFF00_0000;

/// Generates a newtype wrapper around a `u32` form id with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Wrap a raw form id.
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Return the inner `u32` value.
            pub const fn into_inner(self) -> u32 {
                self.0
            }

            /// Whether the id belongs to a form created at runtime rather
            /// than loaded from a game record.
            pub const fn is_runtime_created(self) -> bool {
                self.0 >= FIRST_RUNTIME_FORM_ID
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{:x}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Session-local identifier of an object reference (placed entity).
    RefId
}

define_id! {
    /// Identifier of the template (base) form an object reference is
    /// instantiated from.
    BaseId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_ids_start_at_ff() {
        assert!(!RefId::new(0x0001_2345).is_runtime_created());
        assert!(RefId::new(FIRST_RUNTIME_FORM_ID).is_runtime_created());
        assert!(RefId::new(0xFF00_0ABC).is_runtime_created());
    }

    #[test]
    fn id_display_is_lower_hex() {
        assert_eq!(RefId::new(0xFF00_0ABC).to_string(), "ff000abc");
        assert_eq!(BaseId::new(0x14).to_string(), "14");
    }

    #[test]
    fn id_serializes_as_plain_number() {
        let json = serde_json::to_string(&RefId::new(20)).ok();
        assert_eq!(json.as_deref(), Some("20"));
    }
}
