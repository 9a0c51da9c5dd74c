use std::collections::HashMap;
use std::sync::RwLock;

use crate::price_feed::{OracleRound, PriceOracle};
use crate::state::Address;

/// Oracle whose rounds are set by hand.
///
/// A feed with no round, or one marked offline, fails to answer.
#[derive(Debug, Default)]
pub struct StaticOracle {
    rounds: RwLock<HashMap<Address, OracleRound>>,
    offline: RwLock<Vec<Address>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, feed: Address, answer: i128, decimals: u8, updated_at: i64) {
        self.rounds.write().unwrap_or_else(|e| e.into_inner()).insert(
            feed,
            OracleRound {
                answer,
                decimals,
                updated_at,
            },
        );
    }

    /// Refresh the timestamp of an existing round.
    pub fn touch(&self, feed: &Address, updated_at: i64) {
        if let Some(round) = self
            .rounds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(feed)
        {
            round.updated_at = updated_at;
        }
    }

    pub fn set_offline(&self, feed: Address, offline: bool) {
        let mut list = self.offline.write().unwrap_or_else(|e| e.into_inner());
        list.retain(|f| *f != feed);
        if offline {
            list.push(feed);
        }
    }
}

impl PriceOracle for StaticOracle {
    fn latest_round(&self, feed: &Address) -> Result<OracleRound, String> {
        if self
            .offline
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(feed)
        {
            return Err(format!("oracle {} offline", feed));
        }
        self.rounds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(feed)
            .copied()
            .ok_or_else(|| format!("oracle {} has no round", feed))
    }
}
