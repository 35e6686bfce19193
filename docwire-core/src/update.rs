//! Update payloads: operator normalization and write flags.

use bitflags::bitflags;
use bson::{Document, doc};

/// Prefix marking a top-level update key as an operator rather than a field.
pub const OPERATOR_SIGIL: char = '$';

bitflags! {
    /// Flags carried by an update write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UpdateFlags: u32 {
        /// Insert a new document when nothing matches the selector.
        const UPSERT = 1;
        /// Apply the update to every matching document instead of the first.
        const MULTI_UPDATE = 1 << 1;
    }
}

/// Returns `true` when any top-level key of `update` is an operator.
pub fn is_operator_document(update: &Document) -> bool {
    update
        .keys()
        .any(|key| key.starts_with(OPERATOR_SIGIL))
}

/// Wraps a plain field document under `$set`; operator documents pass through.
///
/// This lets callers hand over either `{ "$inc": { "n": 1 } }` or a bare partial
/// document such as `{ "status": "done" }`.
pub fn normalize_update(update: Document) -> Document {
    if is_operator_document(&update) {
        update
    } else {
        doc! { "$set": update }
    }
}
