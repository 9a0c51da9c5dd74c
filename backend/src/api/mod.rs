//! # REST API Module
//!
//! This module defines all HTTP endpoints for the Briq Vault API.
//!
//! ## Endpoint Overview
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/vault/deposit` | Deposit a supported token |
//! | POST | `/vault/withdraw` | Burn shares for a token |
//! | GET | `/vault/withdrawal-availability` | Dry run of a withdrawal |
//! | GET | `/vault/position/:user` | Shares and USD value |
//! | GET | `/vault/tvl` | Total Value Locked |
//! | GET | `/vault/tokens` | Supported tokens |
//! | GET | `/strategy/:asset` | Strategy state for one token |
//! | GET | `/strategy/analytics` | Per-adapter analytics |
//! | POST | `/admin/*` | Owner operations |
//! | GET | `/monitor/*` | Alerts, TVL history, events |
//! | GET | `/health` | Health check |
//!
//! ## Request/Response Format
//!
//! All requests and responses use JSON:
//!
//! ```json
//! // Success response
//! {
//!     "success": true,
//!     "data": { ... }
//! }
//!
//! // Error response
//! {
//!     "success": false,
//!     "error": {
//!         "code": "ERROR_CODE",
//!         "message": "Human readable message"
//!     }
//! }
//! ```

pub mod routes;
pub mod handlers;

pub use routes::configure_routes;
