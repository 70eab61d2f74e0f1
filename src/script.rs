//! HTLC script builder (spec §4.3).
//!
//! One script shape serves every commitment output on either chain:
//!
//! ```text
//! DUP HASH160 <H160(recipient_pub)> EQUALVERIFY CHECKSIGVERIFY
//! IF
//!   DUP HASH160 <H160(sender_pub)> EQUALVERIFY CHECKSIG
//! ELSE
//!   HASH256 <secret_hash> EQUAL
//! ENDIF
//! ```
//!
//! `recipient` is whoever will eventually claim these coins via the secret;
//! `sender` is whoever funded the output and recovers it via the
//! time-locked refund. The outer `CHECKSIGVERIFY` runs unconditionally, so
//! *both* spending paths require the recipient's signature — this is what
//! stops a third party who merely observes the preimage in the mempool
//! from racing the recipient to the claim, and it's also why the refund
//! path needs both parties to cooperate on a signature.
//!
//! Selector polarity resolves an inconsistency between spec.md's own
//! glossary ("1 = refund, 0 = claim") and its §4.3 table (which swaps
//! them). This module follows the glossary and the original source's
//! tested `cate/script.py` (`build_recv_in_script` pushes selector `0`,
//! `build_recovery_in_script` pushes selector `1`) — see DESIGN.md.

use bitcoin::hashes::{hash160, sha256d, Hash};
use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_CHECKSIGVERIFY, OP_DUP, OP_ELSE, OP_ENDIF, OP_EQUAL, OP_EQUALVERIFY,
    OP_HASH160, OP_HASH256, OP_IF,
};
use bitcoin::script::Builder;
use bitcoin::secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{ScriptBuf, Transaction, Witness};

use crate::error::{Result, SwapError};

/// selector == 1 chooses the IF branch (refund, two signatures).
pub const SELECTOR_REFUND: i64 = 1;
/// selector == 0 chooses the ELSE branch (claim, preimage + recipient sig).
pub const SELECTOR_CLAIM: i64 = 0;

/// The double-SHA256 commitment of a 16-byte preimage — invariant 4 in
/// spec.md §3.
pub fn secret_hash(preimage: &[u8; 16]) -> [u8; 32] {
    sha256d::Hash::hash(preimage).to_byte_array()
}

/// Builds the HTLC redeem/witness script for a commitment output.
pub fn htlc_script(recipient_pub: &PublicKey, sender_pub: &PublicKey, secret_hash: &[u8; 32]) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(hash160::Hash::hash(&recipient_pub.serialize()).to_byte_array())
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIGVERIFY)
        .push_opcode(OP_IF)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(hash160::Hash::hash(&sender_pub.serialize()).to_byte_array())
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ELSE)
        .push_opcode(OP_HASH256)
        .push_slice(secret_hash)
        .push_opcode(OP_EQUAL)
        .push_opcode(OP_ENDIF)
        .into_script()
}

/// Computes the BIP143 segwit sighash for spending a P2WSH HTLC input.
pub fn htlc_sighash(
    tx: &Transaction,
    input_index: usize,
    htlc_script: &ScriptBuf,
    value: u64,
) -> Result<Message> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache
        .p2wsh_signature_hash(input_index, htlc_script, bitcoin::Amount::from_sat(value), EcdsaSighashType::All)
        .map_err(|e| SwapError::trade(format!("failed to compute sighash: {e}")))?;
    Ok(Message::from_digest(sighash.to_byte_array()))
}

/// Signs the HTLC sighash, returning a DER signature with the sighash
/// type byte appended — the 65-ish-byte format spec.md calls out in
/// §4.4's `sign_refund_partial`.
pub fn sign_htlc(secp: &Secp256k1<impl bitcoin::secp256k1::Signing>, message: &Message, secret_key: &SecretKey) -> Vec<u8> {
    let sig = secp.sign_ecdsa(message, secret_key);
    let mut bytes = sig.serialize_der().to_vec();
    bytes.push(EcdsaSighashType::All as u8);
    bytes
}

/// Verifies a DER+sighash-type signature against a message and pubkey.
pub fn verify_htlc_signature(
    secp: &Secp256k1<impl bitcoin::secp256k1::Verification>,
    message: &Message,
    signature_with_hashtype: &[u8],
    pubkey: &PublicKey,
) -> Result<()> {
    let (der, hashtype) = signature_with_hashtype
        .split_last()
        .ok_or_else(|| SwapError::trade("empty signature"))?;
    if *hashtype != EcdsaSighashType::All as u8 {
        return Err(SwapError::trade("unexpected sighash type"));
    }
    let sig = Signature::from_der(der).map_err(|e| SwapError::trade(format!("malformed signature: {e}")))?;
    secp.verify_ecdsa(message, &sig, pubkey)
        .map_err(|e| SwapError::trade(format!("signature verification failed: {e}")))
}

/// Builds the witness stack for the claim branch:
/// `[preimage, 0, recipient_sig, recipient_pub]` (push order, last = top).
pub fn claim_witness(
    recipient_sig: &[u8],
    recipient_pub: &PublicKey,
    preimage: &[u8; 16],
    htlc_script: &ScriptBuf,
) -> Witness {
    let mut witness = Witness::new();
    witness.push(preimage);
    witness.push([SELECTOR_CLAIM as u8]);
    witness.push(recipient_sig);
    witness.push(recipient_pub.serialize());
    witness.push(htlc_script.as_bytes());
    witness
}

/// Builds the witness stack for the refund branch:
/// `[sender_sig, sender_pub, 1, recipient_sig, recipient_pub]`.
pub fn refund_witness(
    sender_sig: &[u8],
    sender_pub: &PublicKey,
    recipient_sig: &[u8],
    recipient_pub: &PublicKey,
    htlc_script: &ScriptBuf,
) -> Witness {
    let mut witness = Witness::new();
    witness.push(sender_sig);
    witness.push(sender_pub.serialize());
    witness.push([SELECTOR_REFUND as u8]);
    witness.push(recipient_sig);
    witness.push(recipient_pub.serialize());
    witness.push(htlc_script.as_bytes());
    witness
}

/// Parses a claim/refund witness stack and extracts the revealed
/// preimage (spec.md §4.5 `extract_preimage`). Returns `Ok(None)` when the
/// witness encodes a refund spend (selector 1) rather than a claim — there
/// is no preimage to extract from it, matching the original's behavior of
/// signalling rather than continuing to search.
pub fn extract_preimage(witness: &Witness) -> Result<Option<[u8; 16]>> {
    let items: Vec<&[u8]> = witness.iter().collect();
    // [preimage, selector, sig, pub, script] or [sig, pub, selector, sig, pub, script]
    if items.len() < 4 {
        return Err(SwapError::trade("witness has too few elements to be an HTLC spend"));
    }
    // Drop the trailing witness script element before inspecting the selector.
    let stack = &items[..items.len() - 1];
    // Claim: [preimage, selector, recipient_sig, recipient_pub]
    if stack.len() == 4 {
        let selector = stack[1];
        if selector == [SELECTOR_CLAIM as u8] || selector.is_empty() {
            let preimage: [u8; 16] = stack[0]
                .try_into()
                .map_err(|_| SwapError::trade("preimage is not 16 bytes"))?;
            return Ok(Some(preimage));
        }
    }
    // Refund: [sender_sig, sender_pub, selector, recipient_sig, recipient_pub]
    if stack.len() == 5 {
        return Ok(None);
    }
    Err(SwapError::trade("unrecognized HTLC witness shape"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{absolute::LockTime, transaction::Version, OutPoint, Sequence, TxIn, TxOut};
    use bitcoin::secp256k1::rand::rngs::OsRng;

    fn keypair(secp: &Secp256k1<bitcoin::secp256k1::All>) -> (SecretKey, PublicKey) {
        let sk = SecretKey::new(&mut OsRng);
        let pk = PublicKey::from_secret_key(secp, &sk);
        (sk, pk)
    }

    fn dummy_spend_tx(prev_txid: bitcoin::Txid) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint { txid: prev_txid, vout: 0 },
                script_sig: ScriptBuf::new(),
                sequence: Sequence(1),
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: bitcoin::Amount::from_sat(900),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    #[test]
    fn claim_witness_round_trips_preimage() {
        let secp = Secp256k1::new();
        let (recipient_sk, recipient_pub) = keypair(&secp);
        let (_sender_sk, sender_pub) = keypair(&secp);
        let preimage = *b"0123456789abcdef";
        let hash = secret_hash(&preimage);
        let script = htlc_script(&recipient_pub, &sender_pub, &hash);

        let tx = dummy_spend_tx(bitcoin::Txid::all_zeros());
        let msg = htlc_sighash(&tx, 0, &script, 1000).unwrap();
        let sig = sign_htlc(&secp, &msg, &recipient_sk);
        verify_htlc_signature(&secp, &msg, &sig, &recipient_pub).unwrap();

        let witness = claim_witness(&sig, &recipient_pub, &preimage, &script);
        let extracted = extract_preimage(&witness).unwrap();
        assert_eq!(extracted, Some(preimage));
    }

    #[test]
    fn refund_witness_has_no_preimage() {
        let secp = Secp256k1::new();
        let (recipient_sk, recipient_pub) = keypair(&secp);
        let (sender_sk, sender_pub) = keypair(&secp);
        let hash = [7u8; 32];
        let script = htlc_script(&recipient_pub, &sender_pub, &hash);

        let tx = dummy_spend_tx(bitcoin::Txid::all_zeros());
        let msg = htlc_sighash(&tx, 0, &script, 1000).unwrap();
        let recipient_sig = sign_htlc(&secp, &msg, &recipient_sk);
        let sender_sig = sign_htlc(&secp, &msg, &sender_sk);

        let witness = refund_witness(&sender_sig, &sender_pub, &recipient_sig, &recipient_pub, &script);
        assert_eq!(extract_preimage(&witness).unwrap(), None);
    }

    #[test]
    fn rejects_empty_witness() {
        let witness = Witness::new();
        assert!(extract_preimage(&witness).is_err());
    }

    #[test]
    fn secret_hash_is_double_sha256() {
        let preimage = *b"88d6e51f777b0b8d";
        let hash = secret_hash(&preimage);
        assert_eq!(hash.len(), 32);
        // applying the hash twice must differ from applying it once
        let single = bitcoin::hashes::sha256::Hash::hash(&preimage).to_byte_array();
        assert_ne!(hash, single);
    }
}
