//! Chain registry: maps a currency code to the genesis-block hash that
//! identifies it on the wire, and carries the network parameters each
//! chain needs.
//!
//! A genesis hash is forgery-resistant and ecosystem-consistent across
//! every client for a given chain, which is why §4.1 uses it (rather than
//! a bare string code) as the canonical identifier in protocol messages.

use bitcoin::Network;

use crate::error::{Result, SwapError};

/// Network parameters for a registered chain.
#[derive(Debug, Clone, Copy)]
pub struct ChainParams {
    pub code: &'static str,
    pub genesis_hash: &'static str,
    pub network: Network,
    pub default_port: u16,
}

/// The chains this build recognizes, keyed by the same genesis hashes as
/// the original source's `NETWORK_HASHES`/`NETWORK_CODES` maps. `DOGE` is
/// carried over from there even though spec.md's illustrative trades only
/// use BTC/LTC — nothing in the Non-goals excludes a third chain, and the
/// registry is naturally open-ended.
const CHAINS: &[ChainParams] = &[
    ChainParams {
        code: "BTC",
        genesis_hash: "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
        network: Network::Bitcoin,
        default_port: 8333,
    },
    ChainParams {
        code: "LTC",
        genesis_hash: "f5ae71e26c74beacc88382716aced69cddf3dffff24f384e1808905e0188f68f",
        network: Network::Bitcoin,
        default_port: 9333,
    },
    ChainParams {
        code: "DOGE",
        genesis_hash: "bb0a78264637406b6360aad926284d544d7049f45189db5664f3c4d07350559e",
        network: Network::Bitcoin,
        default_port: 22556,
    },
];

/// Read-only registry of the chains this build recognizes. Constructed
/// once at startup; handlers only ever read from it.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<ChainParams>,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self {
            chains: CHAINS.to_vec(),
        }
    }
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the symbolic code for a genesis hash (lowercase hex).
    pub fn code_for(&self, genesis_hash: &str) -> Result<&'static str> {
        self.chains
            .iter()
            .find(|c| c.genesis_hash.eq_ignore_ascii_case(genesis_hash))
            .map(|c| c.code)
            .ok_or_else(|| SwapError::message(format!("unknown currency hash {genesis_hash}")))
    }

    /// Looks up the genesis hash for a symbolic code.
    pub fn genesis_for(&self, code: &str) -> Result<&'static str> {
        self.params_for(code).map(|p| p.genesis_hash)
    }

    /// Looks up the full network parameters for a symbolic code.
    pub fn params_for(&self, code: &str) -> Result<ChainParams> {
        self.chains
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .copied()
            .ok_or_else(|| SwapError::message(format!("unknown currency code {code}")))
    }

    /// True iff the genesis hash is recognized — the protocol boundary
    /// check invariant 2 in spec.md §3 relies on.
    pub fn is_known_hash(&self, genesis_hash: &str) -> bool {
        self.code_for(genesis_hash).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_code_and_hash() {
        let reg = ChainRegistry::new();
        let hash = reg.genesis_for("BTC").unwrap();
        assert_eq!(reg.code_for(hash).unwrap(), "BTC");
    }

    #[test]
    fn rejects_unknown_currency() {
        let reg = ChainRegistry::new();
        assert!(reg.params_for("XYZ").is_err());
        assert!(reg.code_for("deadbeef").is_err());
    }

    #[test]
    fn offer_and_ask_chain_must_differ() {
        let reg = ChainRegistry::new();
        let btc = reg.genesis_for("BTC").unwrap();
        let ltc = reg.genesis_for("LTC").unwrap();
        assert_ne!(btc, ltc);
    }
}
