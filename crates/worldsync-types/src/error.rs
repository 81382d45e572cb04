//! Error types for the `worldsync-types` crate.

/// Errors produced while parsing or resolving a [`FormDesc`](crate::FormDesc).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormDescError {
    /// The descriptor string was empty.
    #[error("empty form descriptor")]
    Empty,

    /// The id part of the descriptor was not valid hexadecimal.
    #[error("invalid form id in descriptor {input:?}")]
    InvalidHex {
        /// The offending descriptor string.
        input: String,
    },

    /// A file-qualified descriptor carried an id wider than 24 bits.
    #[error("local form id {id:#x} does not fit in 24 bits")]
    LocalIdOutOfRange {
        /// The offending id.
        id: u32,
    },

    /// The descriptor names a file that is not part of the load order.
    #[error("file {0:?} is not in the load order")]
    UnknownFile(String),

    /// The load order position cannot be encoded in the top id byte.
    #[error("load order index {index} exceeds the 8-bit file index range")]
    LoadOrderIndexOutOfRange {
        /// The position of the file in the load order.
        index: usize,
    },
}

/// Errors produced by the snapshot document codec.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The document is not valid JSON or a mandatory key is missing or
    /// malformed.
    #[error("malformed snapshot document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced by inventory arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    /// An attempt to remove more items than the inventory holds.
    #[error("cannot remove {requested} of {base_id:x}: only {available} present")]
    NotEnoughItems {
        /// Base form of the item.
        base_id: u32,
        /// How many were requested.
        requested: u32,
        /// How many are present.
        available: u32,
    },
}
