//! # Simulated Collaborators
//!
//! In-memory stand-ins for everything outside the engine: the token
//! ledger, lending markets, price oracles and the clock. The development
//! backend runs on these, and every test in the crate uses them.
//!
//! | Type | Stands in for |
//! |------|---------------|
//! | [`InMemoryCustody`] | ERC-20 style token contracts |
//! | [`SimulatedMarket`] | An Aave pool or a Compound market |
//! | [`StaticOracle`] | Aggregator-style price feeds |
//! | [`ManualClock`] | Block time |
//!
//! [`SimDeployment`] wires all of them to a complete engine.

pub mod clock;
pub mod custody;
pub mod deployment;
pub mod market;
pub mod oracle;

pub use clock::ManualClock;
pub use custody::InMemoryCustody;
pub use deployment::{AssetListing, ListedAsset, SimDeployment};
pub use market::SimulatedMarket;
pub use oracle::StaticOracle;
