//! Id generation for request log records.

use uuid::Uuid;

/// A globally-unique id for a `Request Log Record` (spec.md §3).
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}
