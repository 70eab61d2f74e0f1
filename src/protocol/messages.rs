//! Wire message envelopes (spec.md §6). Tagged, strictly-typed structs
//! replacing the original's untyped JSON dicts — SPEC_FULL §9 "dynamic
//! message shapes" redesign note.

use bitcoin::secp256k1::PublicKey;
use bitcoin::Transaction;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SwapError};

fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

fn hex_decode(s: &str, expected_len: Option<usize>) -> Result<Vec<u8>> {
    let bytes = hex::decode(s).map_err(|e| SwapError::message(format!("malformed hex: {e}")))?;
    if let Some(len) = expected_len {
        if bytes.len() != len {
            return Err(SwapError::message(format!("expected {len} bytes, got {}", bytes.len())));
        }
    }
    Ok(bytes)
}

fn encode_tx(tx: &Transaction) -> String {
    use bitcoin::consensus::encode::serialize;
    hex::encode(serialize(tx))
}

fn decode_tx(s: &str) -> Result<Transaction> {
    use bitcoin::consensus::encode::deserialize;
    let bytes = hex::decode(s).map_err(|e| SwapError::message(format!("malformed hex: {e}")))?;
    deserialize(&bytes).map_err(|e| SwapError::message(format!("malformed transaction: {e}")))
}

/// Step 1, A → B. `public_key_b` historically carries *A's* own pubkey —
/// from B's point of view, once this message arrives, it's "the other
/// party's" key, and B's own code names its peer's key fields after
/// itself to keep the two sides of the handshake symmetric in source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub trade_id: Uuid,
    pub offer_currency_hash: String,
    pub offer_currency_quantity: u64,
    pub ask_currency_hash: String,
    pub ask_currency_quantity: u64,
    pub public_key_b: String,
}

impl Offer {
    pub fn validate(&self) -> Result<()> {
        if self.offer_currency_hash == self.ask_currency_hash {
            return Err(SwapError::message("offered and asked currency must differ"));
        }
        if self.offer_currency_quantity == 0 || self.ask_currency_quantity == 0 {
            return Err(SwapError::message("quantities must be at least 1 minimum unit"));
        }
        hex_decode(&self.offer_currency_hash, Some(32))?;
        hex_decode(&self.ask_currency_hash, Some(32))?;
        public_key(&self.public_key_b)?;
        Ok(())
    }
}

/// Step 2, B → A. `public_key_a` carries *B's* own pubkey, for the same
/// historical-naming reason as [`Offer::public_key_b`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accept {
    pub trade_id: Uuid,
    pub secret_hash: String,
    pub public_key_a: String,
    pub tx2: String,
}

impl Accept {
    pub fn validate(&self) -> Result<()> {
        hex_decode(&self.secret_hash, Some(32))?;
        public_key(&self.public_key_a)?;
        decode_tx(&self.tx2)?;
        Ok(())
    }

    pub fn tx2(&self) -> Result<Transaction> {
        decode_tx(&self.tx2)
    }

    pub fn public_key_a(&self) -> Result<PublicKey> {
        public_key(&self.public_key_a)
    }

    pub fn secret_hash_bytes(&self) -> Result<[u8; 32]> {
        let bytes = hex_decode(&self.secret_hash, Some(32))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(out)
    }
}

/// Step 3, A → B.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirm {
    pub trade_id: Uuid,
    pub tx2_sig: String,
    pub tx4: String,
}

impl Confirm {
    pub fn validate(&self) -> Result<()> {
        hex_decode(&self.tx2_sig, None)?;
        decode_tx(&self.tx4)?;
        Ok(())
    }

    pub fn tx4(&self) -> Result<Transaction> {
        decode_tx(&self.tx4)
    }

    pub fn tx2_sig_bytes(&self) -> Result<Vec<u8>> {
        hex_decode(&self.tx2_sig, None)
    }
}

/// Step 4, B → A.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Send {
    pub trade_id: Uuid,
    pub tx4_sig: String,
}

impl Send {
    pub fn validate(&self) -> Result<()> {
        hex_decode(&self.tx4_sig, None)?;
        Ok(())
    }

    pub fn tx4_sig_bytes(&self) -> Result<Vec<u8>> {
        hex_decode(&self.tx4_sig, None)
    }
}

fn public_key(s: &str) -> Result<PublicKey> {
    let bytes = hex_decode(s, None)?;
    PublicKey::from_slice(&bytes).map_err(|e| SwapError::message(format!("malformed public key: {e}")))
}

pub fn encode_public_key(pk: &PublicKey) -> String {
    hex_encode(&pk.serialize())
}

pub fn encode_transaction(tx: &Transaction) -> String {
    encode_tx(tx)
}

pub fn encode_hash(hash: &[u8]) -> String {
    hex_encode(hash)
}

pub fn encode_signature(sig: &[u8]) -> String {
    hex_encode(sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_offer_with_matching_currencies() {
        let offer = Offer {
            trade_id: Uuid::new_v4(),
            offer_currency_hash: "a".repeat(64),
            offer_currency_quantity: 1,
            ask_currency_hash: "a".repeat(64),
            ask_currency_quantity: 1,
            public_key_b: "02".to_string() + &"1".repeat(64),
        };
        assert!(offer.validate().is_err());
    }

    #[test]
    fn rejects_zero_quantity() {
        let offer = Offer {
            trade_id: Uuid::new_v4(),
            offer_currency_hash: "a".repeat(64),
            offer_currency_quantity: 0,
            ask_currency_hash: "b".repeat(64),
            ask_currency_quantity: 5,
            public_key_b: "02".to_string() + &"1".repeat(64),
        };
        assert!(offer.validate().is_err());
    }

    #[test]
    fn rejects_wrong_length_secret_hash() {
        let accept = Accept {
            trade_id: Uuid::new_v4(),
            secret_hash: "ab".repeat(31),
            public_key_a: "02".to_string() + &"1".repeat(64),
            tx2: hex::encode(bitcoin::consensus::encode::serialize(&bitcoin::Transaction {
                version: bitcoin::transaction::Version::TWO,
                lock_time: bitcoin::absolute::LockTime::ZERO,
                input: vec![],
                output: vec![],
            })),
        };
        assert!(accept.validate().is_err());
    }
}
