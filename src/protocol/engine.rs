//! Protocol engine (spec.md §4.7): the six-message state machine plus the
//! two recovery handlers, driving the script/transaction builders and the
//! chain scanner against a trade store.
//!
//! Role mapping used throughout (documented fully in DESIGN.md): TX1 is
//! the ask-chain commitment funded by B with A as recipient; TX3 is the
//! offer-chain commitment funded by A with B as recipient. TX2 refunds
//! TX1 back to B; TX4 refunds TX3 back to A. B generates the secret and
//! is therefore the first party able to claim via the secret branch —
//! B claims TX3 first (revealing the secret), then A extracts it from
//! that spend and claims TX1.

use bitcoin::absolute::LockTime;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::{Address, OutPoint, Txid};
use uuid::Uuid;

use crate::error::{Result, SwapError};
use crate::fees::FeeRate;
use crate::keys::{generate_preimage, KeyPair};
use crate::protocol::messages::{Accept, Confirm, Offer, Send};
use crate::protocol::trade::{slots, Trade};
use crate::rpc::ChainRpc;
use crate::scanner;
use crate::script;
use crate::store::TradeStore;
use crate::txbuilder::{self, CommitmentTx};

/// Safety margin for the refund lock-time-ordering check in spec.md §3
/// invariant 6.
pub const LOCK_TIME_SAFETY_MARGIN_BLOCKS: u32 = 6;
/// 12h-72h window expressed as an illustrative block count (spec.md §3
/// invariant 5); concrete chain parameters pick the real spacing.
pub const MIN_REFUND_BLOCKS: u32 = 72;
pub const MAX_REFUND_BLOCKS: u32 = 432;
const DEFAULT_REFUND_LOCK_BLOCKS: u32 = 288;

/// Everything a handler needs to act on one chain: its RPC seam and fee
/// policy.
pub struct ChainContext<'a> {
    pub rpc: &'a dyn ChainRpc,
    pub fee_rate: FeeRate,
}

/// Drives the protocol handlers. Generic over nothing — it holds trait
/// objects so a single binary can wire a live node or a fake
/// interchangeably.
pub struct ProtocolEngine<'a> {
    pub store: &'a dyn TradeStore,
    pub secp: Secp256k1<bitcoin::secp256k1::All>,
}

impl<'a> ProtocolEngine<'a> {
    pub fn new(store: &'a dyn TradeStore) -> Self {
        Self { store, secp: Secp256k1::new() }
    }

    /// Step 1: A emits OFFER. Generates and persists A's own keypair.
    pub fn create_offer(
        &self,
        trade_id: Uuid,
        offer_currency_hash: String,
        offer_currency_quantity: u64,
        ask_currency_hash: String,
        ask_currency_quantity: u64,
    ) -> Result<(Offer, KeyPair)> {
        if self.store.has(trade_id, slots::OFFER)? {
            return Err(SwapError::audit("offer already created for this trade"));
        }
        let keypair = KeyPair::generate(&self.secp);
        let trade = Trade {
            trade_id,
            offer_currency_hash: offer_currency_hash.clone(),
            offer_currency_quantity,
            ask_currency_hash: ask_currency_hash.clone(),
            ask_currency_quantity,
        };
        self.store.write(trade_id, slots::OFFER, &serde_json::to_vec(&trade)?)?;
        self.store.write(trade_id, slots::PRIVATE_KEY_A, &keypair.secret_key.secret_bytes())?;

        let offer = Offer {
            trade_id,
            offer_currency_hash,
            offer_currency_quantity,
            ask_currency_hash,
            ask_currency_quantity,
            public_key_b: crate::protocol::messages::encode_public_key(&keypair.public_key),
        };
        Ok((offer, keypair))
    }

    /// Step 1 receipt (B's side): validates an inbound OFFER, generates
    /// B's preimage and keypair, builds TX1 and the unsigned TX2, and
    /// produces the ACCEPT message. `ask_chain` funds/broadcasts TX1.
    pub fn receive_offer(&self, offer: &Offer, ask_chain: &ChainContext, refund_address: &Address) -> Result<Accept> {
        offer.validate()?;
        if self.store.has(offer.trade_id, slots::OFFER_RECEIVED)? {
            return Err(SwapError::audit("offer already received for this trade"));
        }

        let recipient_pub = bitcoin::secp256k1::PublicKey::from_slice(&hex::decode(&offer.public_key_b)?)?;
        let preimage = generate_preimage();
        let secret_hash = script::secret_hash(&preimage);
        let keypair = KeyPair::generate(&self.secp);

        let commitment = txbuilder::build_commitment(
            ask_chain.rpc,
            &recipient_pub,
            &keypair.public_key,
            &secret_hash,
            offer.ask_currency_quantity,
            ask_chain.fee_rate,
        )?;
        let commitment_txid = commitment.transaction.compute_txid();

        let lock_time = LockTime::from_consensus(DEFAULT_REFUND_LOCK_BLOCKS);
        let unsigned_tx2 = txbuilder::build_unsigned_refund(
            commitment_txid,
            &commitment,
            ask_chain.fee_rate,
            refund_address,
            lock_time,
            1,
        );

        self.store.write(offer.trade_id, slots::OFFER_RECEIVED, &serde_json::to_vec(offer)?)?;
        self.store.write(offer.trade_id, slots::SECRET, &preimage)?;
        self.store.write(offer.trade_id, slots::PRIVATE_KEY_B, &keypair.secret_key.secret_bytes())?;
        self.store.write(offer.trade_id, slots::TX1, &bincode_tx(&commitment.transaction))?;

        let accept = Accept {
            trade_id: offer.trade_id,
            secret_hash: crate::protocol::messages::encode_hash(&secret_hash),
            public_key_a: crate::protocol::messages::encode_public_key(&keypair.public_key),
            tx2: crate::protocol::messages::encode_transaction(&unsigned_tx2),
        };
        self.store.write(offer.trade_id, slots::ACCEPTANCE, &serde_json::to_vec(&accept)?)?;
        Ok(accept)
    }

    /// Step 2 receipt (A's side): validates TX2, partial-signs it, builds
    /// TX3 and unsigned TX4. `offer_chain` funds/broadcasts TX3.
    /// `ask_currency_quantity` is the value A itself put in the original
    /// OFFER (spec.md §4.4 `validate_refund`'s `max_value`) — TX1's HTLC
    /// output must pay exactly that amount, since `build_commitment` never
    /// pays its funder's chosen value plus anything extra.
    pub fn receive_accept(
        &self,
        accept: &Accept,
        a_keypair: &KeyPair,
        offer_currency_quantity: u64,
        ask_currency_quantity: u64,
        offer_chain: &ChainContext,
        refund_address: &Address,
    ) -> Result<Confirm> {
        accept.validate()?;
        if self.store.has(accept.trade_id, slots::ACCEPTANCE_RECEIVED)? {
            return Err(SwapError::audit("acceptance already received for this trade"));
        }

        let secret_hash = accept.secret_hash_bytes()?;
        let b_pub = accept.public_key_a()?;
        let tx2 = accept.tx2()?;

        // TX2 refunds TX1 back to B (sender); A (recipient) must countersign.
        let tx1_script = script::htlc_script(&a_keypair.public_key, &b_pub, &secret_hash);
        txbuilder::validate_refund(
            &tx2,
            tx2.input[0].previous_output.txid,
            tx2.input[0].previous_output.vout,
            ask_currency_quantity,
            MIN_REFUND_BLOCKS,
            MAX_REFUND_BLOCKS,
        )?;
        let tx2_sig = txbuilder::sign_refund_partial(&self.secp, &tx2, &tx1_script, ask_currency_quantity, &a_keypair.secret_key)?;

        let commitment = txbuilder::build_commitment(
            offer_chain.rpc,
            &b_pub,
            &a_keypair.public_key,
            &secret_hash,
            offer_currency_quantity,
            offer_chain.fee_rate,
        )?;
        let commitment_txid = commitment.transaction.compute_txid();

        let lock_time = LockTime::from_consensus(DEFAULT_REFUND_LOCK_BLOCKS + LOCK_TIME_SAFETY_MARGIN_BLOCKS);
        let unsigned_tx4 = txbuilder::build_unsigned_refund(
            commitment_txid,
            &commitment,
            offer_chain.fee_rate,
            refund_address,
            lock_time,
            1,
        );

        self.store.write(accept.trade_id, slots::ACCEPTANCE_RECEIVED, &serde_json::to_vec(accept)?)?;
        self.store.write(accept.trade_id, slots::TX3, &bincode_tx(&commitment.transaction))?;

        let confirm = Confirm {
            trade_id: accept.trade_id,
            tx2_sig: crate::protocol::messages::encode_signature(&tx2_sig),
            tx4: crate::protocol::messages::encode_transaction(&unsigned_tx4),
        };
        self.store.write(accept.trade_id, slots::CONFIRMATION, &serde_json::to_vec(&confirm)?)?;
        Ok(confirm)
    }

    /// Step 3 receipt (B's side): assembles fully-signed TX2, broadcasts
    /// TX1 (now safe since B's own refund is complete), and partial-signs
    /// TX4 to return in SEND. `offer_currency_quantity` is the value from
    /// the original OFFER B received — TX3's HTLC output must pay exactly
    /// that amount, the same reasoning as `receive_accept`'s
    /// `ask_currency_quantity`.
    pub fn receive_confirm(
        &self,
        confirm: &Confirm,
        b_keypair: &KeyPair,
        a_pub: &PublicKey,
        secret_hash: &[u8; 32],
        unsigned_tx2: &bitcoin::Transaction,
        offer_currency_quantity: u64,
        ask_chain: &ChainContext,
    ) -> Result<Send> {
        confirm.validate()?;
        if self.store.has(confirm.trade_id, slots::CONFIRMATION_RECEIVED)? {
            return Err(SwapError::audit("confirmation already received for this trade"));
        }

        // TX1 was built locally in `receive_offer`; its own persisted output
        // value is the ground truth for TX2's sighash, not a fee guess.
        let tx1 = self.read_tx(confirm.trade_id, slots::TX1)?;
        let tx1_value = tx1.output[0].value.to_sat();
        let tx1_script = script::htlc_script(a_pub, &b_keypair.public_key, secret_hash);
        let msg = script::htlc_sighash(unsigned_tx2, 0, &tx1_script, tx1_value)?;
        let a_sig = confirm.tx2_sig_bytes()?;
        script::verify_htlc_signature(&self.secp, &msg, &a_sig, a_pub)?;
        let b_sig = script::sign_htlc(&self.secp, &msg, &b_keypair.secret_key);

        let signed_tx2 = txbuilder::assemble_refund(unsigned_tx2.clone(), &b_sig, &b_keypair.public_key, &a_sig, a_pub, &tx1_script);

        self.store.write(confirm.trade_id, slots::CONFIRMATION_RECEIVED, &serde_json::to_vec(confirm)?)?;
        self.store.write(confirm.trade_id, slots::TX2, &bincode_tx(&signed_tx2))?;

        let tx1_id = ask_chain.rpc.send_raw_transaction(&tx1)?;
        self.store.write(confirm.trade_id, slots::COINS_SENT, tx1_id.to_string().as_bytes())?;

        let tx4 = confirm.tx4()?;
        let tx3_script = script::htlc_script(&b_keypair.public_key, a_pub, secret_hash);
        let tx4_msg = script::htlc_sighash(&tx4, 0, &tx3_script, offer_currency_quantity)?;
        let tx4_sig = script::sign_htlc(&self.secp, &tx4_msg, &b_keypair.secret_key);

        let send = Send {
            trade_id: confirm.trade_id,
            tx4_sig: crate::protocol::messages::encode_signature(&tx4_sig),
        };
        self.store.write(confirm.trade_id, slots::SEND_NOTIFICATION, &serde_json::to_vec(&send)?)?;
        Ok(send)
    }

    /// Step 4 receipt (A's side): assembles fully-signed TX4, waits for
    /// TX1's confirmation, then broadcasts TX3.
    pub fn receive_send(
        &self,
        send: &Send,
        a_keypair: &KeyPair,
        b_pub: &PublicKey,
        secret_hash: &[u8; 32],
        unsigned_tx4: &bitcoin::Transaction,
        ask_chain: &ChainContext,
        offer_chain: &ChainContext,
        tx1_txid: Txid,
    ) -> Result<()> {
        send.validate()?;
        if self.store.has(send.trade_id, slots::TX4)? {
            return Err(SwapError::audit("tx4 already assembled for this trade"));
        }

        // TX3 was built locally in `receive_accept`; its own persisted
        // output value is the ground truth for TX4's sighash.
        let tx3 = self.read_tx(send.trade_id, slots::TX3)?;
        let tx3_value = tx3.output[0].value.to_sat();
        let tx3_script = script::htlc_script(b_pub, &a_keypair.public_key, secret_hash);
        let msg = script::htlc_sighash(unsigned_tx4, 0, &tx3_script, tx3_value)?;
        let a_sig = script::sign_htlc(&self.secp, &msg, &a_keypair.secret_key);
        let b_sig = send.tx4_sig_bytes()?;
        script::verify_htlc_signature(&self.secp, &msg, &b_sig, b_pub)?;

        let signed_tx4 = txbuilder::assemble_refund(unsigned_tx4.clone(), &a_sig, &a_keypair.public_key, &b_sig, b_pub, &tx3_script);
        self.store.write(send.trade_id, slots::TX4, &bincode_tx(&signed_tx4))?;

        scanner::wait_for_confirmation(ask_chain.rpc, tx1_txid, 1)?;

        offer_chain.rpc.send_raw_transaction(&tx3)?;
        Ok(())
    }

    /// "(B claims)": broadcasts a ClaimTx spending TX3 via the secret
    /// branch, revealing the preimage publicly.
    pub fn claim_as_b(
        &self,
        trade_id: Uuid,
        b_keypair: &KeyPair,
        preimage: &[u8; 16],
        commitment: &CommitmentTx,
        offer_chain: &ChainContext,
        claim_address: &Address,
    ) -> Result<Txid> {
        if self.store.has(trade_id, slots::CLAIM_COMPLETE_B)? {
            return Err(SwapError::audit("already claimed as B for this trade"));
        }
        let tx3 = self.read_tx(trade_id, slots::TX3)?;
        let claim = txbuilder::build_claim(
            &self.secp,
            tx3.compute_txid(),
            commitment,
            offer_chain.fee_rate,
            claim_address,
            &b_keypair.secret_key,
            &b_keypair.public_key,
            preimage,
        )?;
        let txid = offer_chain.rpc.send_raw_transaction(&claim)?;
        self.store.write(trade_id, slots::CLAIM_COMPLETE_B, txid.to_string().as_bytes())?;
        Ok(txid)
    }

    /// "(A receives)": watches for the spend of TX3, extracts the
    /// preimage, and claims TX1 on the ask-chain with it. `tx3_commitment`
    /// locates TX3's HTLC output; TX1's own script is rebuilt from `b_pub`
    /// and `secret_hash` since TX1 and TX3 carry different scripts (their
    /// recipient/sender roles are swapped).
    pub fn claim_as_a(
        &self,
        trade_id: Uuid,
        a_keypair: &KeyPair,
        b_pub: &PublicKey,
        secret_hash: &[u8; 32],
        tx3_commitment: &CommitmentTx,
        offer_chain: &ChainContext,
        ask_chain: &ChainContext,
        claim_address: &Address,
        not_before_time: u32,
    ) -> Result<Option<Txid>> {
        if self.store.has(trade_id, slots::CLAIM_COMPLETE_A)? {
            return Err(SwapError::audit("already claimed as A for this trade"));
        }
        let tx3 = self.read_tx(trade_id, slots::TX3)?;
        let outpoint = OutPoint { txid: tx3.compute_txid(), vout: tx3_commitment.htlc_vout };
        let spend = match scanner::find_spender(offer_chain.rpc, outpoint, not_before_time)? {
            Some(tx) => tx,
            None => return Ok(None),
        };
        let preimage = match scanner::extract_preimage_from_spend(&spend, outpoint)? {
            Some(p) => p,
            None => return Ok(None),
        };

        let tx1 = self.read_tx(trade_id, slots::TX1)?;
        let tx1_script = script::htlc_script(&a_keypair.public_key, b_pub, secret_hash);
        let tx1_commitment = CommitmentTx {
            transaction: tx1.clone(),
            htlc_vout: 0,
            htlc_script: tx1_script,
            value_sat: tx1.output[0].value.to_sat(),
        };
        let claim = txbuilder::build_claim(
            &self.secp,
            tx1.compute_txid(),
            &tx1_commitment,
            ask_chain.fee_rate,
            claim_address,
            &a_keypair.secret_key,
            &a_keypair.public_key,
            &preimage,
        )?;
        let txid = ask_chain.rpc.send_raw_transaction(&claim)?;
        self.store.write(trade_id, slots::CLAIM_COMPLETE_A, txid.to_string().as_bytes())?;
        Ok(Some(txid))
    }

    /// Recovery: broadcasts the pre-signed refund once the lock time has
    /// elapsed. Shared by both A's (TX4) and B's (TX2) recovery paths.
    pub fn broadcast_refund(&self, chain: &ChainContext, refund_tx: &bitcoin::Transaction) -> Result<Txid> {
        Ok(chain.rpc.send_raw_transaction(refund_tx)?)
    }

    fn read_tx(&self, trade_id: Uuid, slot: &str) -> Result<bitcoin::Transaction> {
        let bytes = self.store.read(trade_id, slot)?;
        decode_tx(&bytes)
    }
}

fn bincode_tx(tx: &bitcoin::Transaction) -> Vec<u8> {
    bitcoin::consensus::encode::serialize(tx)
}

fn decode_tx(bytes: &[u8]) -> Result<bitcoin::Transaction> {
    bitcoin::consensus::encode::deserialize(bytes).map_err(|e| SwapError::audit(format!("corrupt persisted transaction: {e}")))
}
