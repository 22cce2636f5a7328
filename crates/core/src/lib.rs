//! `renderq-core` -- domain types shared by every renderq crate.
//!
//! Has no internal dependencies so the backend client, the queue engine
//! and the HTTP frontend can all build on the same vocabulary: request
//! parameters, identifiers, status texts, the progress ratchet and the
//! retry-hint parser.

pub mod error;
pub mod messages;
pub mod naming;
pub mod params;
pub mod progress;
pub mod retry;
pub mod transcode;
pub mod types;
