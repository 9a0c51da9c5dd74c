//! # API Models
//!
//! This module defines the request and response structures for the REST API.
//! These are separate from the engine's receipts so amounts can be
//! carried as strings and formatted for display.
//!
//! ## Organization
//!
//! - `requests.rs` - Incoming request bodies and query strings
//! - `responses.rs` - Outgoing response bodies
//!
//! ## Serialization
//!
//! All models use Serde for JSON serialization/deserialization.
//! Field names are converted to camelCase for JavaScript clients.

pub mod requests;
pub mod responses;

pub use requests::*;
pub use responses::*;
