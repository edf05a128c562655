#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and pure logic for the institute backend: domain records,
//! request payloads, validation, fee summaries and the backup naming/flattening
//! rules used by the daemon's monthly export.

/// Request/response payloads of the HTTP API.
pub mod api;
/// Backup state, naming and schedule.
pub mod backup;
/// Stored domain records.
pub mod model;
/// Loose collection records and their flattening to cells.
pub mod snapshot;
/// Fee aggregations.
pub mod summary;
/// Payload validation.
pub mod validation;

mod util;

pub use util::{iso_millis, new_id, now_utc};
