//! Key and secret generation (spec.md §3 `KeyPair`/`Preimage`).
//!
//! Keys are raw secp256k1 keypairs generated independently of any wallet —
//! there is no seed phrase and no derivation path, matching the original
//! source's `generate_keypair` which calls straight into OpenSSL rather
//! than through a BIP32/BIP39 wallet layer.

use bitcoin::secp256k1::rand::rngs::OsRng;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, Signing};

use crate::script;

/// A freshly generated secp256k1 keypair, held only for the lifetime of a
/// single trade.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    pub fn generate(secp: &Secp256k1<impl Signing>) -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        let public_key = PublicKey::from_secret_key(secp, &secret_key);
        KeyPair { secret_key, public_key }
    }
}

/// A 16-byte secret generated by the party who will be first to reveal it
/// on-chain (the accepter, per spec.md §4.7 step 2).
pub fn generate_preimage() -> [u8; 16] {
    let mut preimage = [0u8; 16];
    bitcoin::secp256k1::rand::Rng::fill(&mut OsRng, &mut preimage);
    preimage
}

pub fn hash_preimage(preimage: &[u8; 16]) -> [u8; 32] {
    script::secret_hash(preimage)
}
