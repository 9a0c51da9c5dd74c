//! # State Module
//!
//! Plain data owned by the engine components: identifiers, strategy
//! positions and analytics rows, and the owner/operator authority each
//! component embeds.

pub mod address;
pub mod authority;
pub mod position;

pub use address::*;
pub use authority::*;
pub use position::*;
