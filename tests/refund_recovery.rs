//! Exercises the recovery path: once a commitment's refund lock time has
//! elapsed, the sender's pre-signed refund transaction can be broadcast
//! to recover funds without the counterparty's further cooperation.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::{Address, CompressedPublicKey, Network, Txid};

use atomic_swap_engine::fees::FeeRate;
use atomic_swap_engine::keys::KeyPair;
use atomic_swap_engine::protocol::engine::{ChainContext, ProtocolEngine, MIN_REFUND_BLOCKS};
use atomic_swap_engine::rpc::{ChainRpc, FakeChainRpc, Utxo};
use atomic_swap_engine::script;
use atomic_swap_engine::store::InMemoryTradeStore;
use atomic_swap_engine::txbuilder;

fn fund(rpc: &FakeChainRpc, value_sat: u64) {
    let secp = Secp256k1::new();
    let sk = SecretKey::new(&mut bitcoin::secp256k1::rand::rngs::OsRng);
    let pk = PublicKey::from_secret_key(&secp, &sk);
    let address = Address::p2wpkh(&CompressedPublicKey(pk), Network::Bitcoin);
    rpc.fund(Utxo {
        txid: Txid::all_zeros(),
        vout: 0,
        value_sat,
        script_pubkey: address.script_pubkey(),
    });
}

/// B's refund path: TX1 never gets confirmed/claimed, so B broadcasts the
/// fully-signed TX2 (the two-signature refund branch) back to itself once
/// the lock time has passed.
#[test]
fn broadcasts_fully_assembled_refund_once_signed() {
    let store = InMemoryTradeStore::new();
    let engine = ProtocolEngine::new(&store);
    let ask_rpc = FakeChainRpc::new();
    let ask_ctx = ChainContext { rpc: &ask_rpc, fee_rate: FeeRate::new(1000) };

    let secp = Secp256k1::new();
    let a_keypair = KeyPair::generate(&secp);
    let b_keypair = KeyPair::generate(&secp);
    let preimage = *b"fedcba9876543210";
    let secret_hash = script::secret_hash(&preimage);

    fund(&ask_rpc, 1_000_000);
    let commitment = txbuilder::build_commitment(
        &ask_rpc,
        &a_keypair.public_key,
        &b_keypair.public_key,
        &secret_hash,
        500_000,
        FeeRate::new(1000),
    )
    .unwrap();
    let commitment_txid = commitment.transaction.compute_txid();

    let refund_address = ask_rpc.get_new_address().unwrap();
    let lock_time = LockTime::from_consensus(MIN_REFUND_BLOCKS + 1);
    let unsigned_tx2 = txbuilder::build_unsigned_refund(commitment_txid, &commitment, FeeRate::new(1000), &refund_address, lock_time, 1);

    // Both parties' halves get collected during the cooperative SEND step.
    let msg = script::htlc_sighash(&unsigned_tx2, 0, &commitment.htlc_script, commitment.value_sat).unwrap();
    let a_sig = script::sign_htlc(&secp, &msg, &a_keypair.secret_key);
    let b_sig = script::sign_htlc(&secp, &msg, &b_keypair.secret_key);
    let signed_tx2 = txbuilder::assemble_refund(unsigned_tx2, &b_sig, &b_keypair.public_key, &a_sig, &a_keypair.public_key, &commitment.htlc_script);

    let txid = engine.broadcast_refund(&ask_ctx, &signed_tx2).unwrap();
    assert_eq!(ask_rpc.get_raw_mempool().unwrap(), vec![txid]);
}

#[test]
fn validate_refund_rejects_a_lock_time_below_the_minimum_window() {
    let secp = Secp256k1::new();
    let a_keypair = KeyPair::generate(&secp);
    let b_keypair = KeyPair::generate(&secp);
    let preimage = *b"0011223344556677";
    let secret_hash = script::secret_hash(&preimage);
    let htlc_script = script::htlc_script(&a_keypair.public_key, &b_keypair.public_key, &secret_hash);

    let ask_rpc = FakeChainRpc::new();
    fund(&ask_rpc, 1_000_000);
    let commitment = txbuilder::build_commitment(&ask_rpc, &a_keypair.public_key, &b_keypair.public_key, &secret_hash, 500_000, FeeRate::new(1000)).unwrap();
    assert_eq!(commitment.htlc_script, htlc_script);
    let commitment_txid = commitment.transaction.compute_txid();

    let refund_address = ask_rpc.get_new_address().unwrap();
    // A lock time of one block is well below the protocol's 72-block minimum.
    let too_short = LockTime::from_consensus(1);
    let premature_refund = txbuilder::build_unsigned_refund(commitment_txid, &commitment, FeeRate::new(1000), &refund_address, too_short, 1);

    let result = txbuilder::validate_refund(
        &premature_refund,
        commitment_txid,
        commitment.htlc_vout,
        commitment.value_sat,
        MIN_REFUND_BLOCKS,
        atomic_swap_engine::protocol::engine::MAX_REFUND_BLOCKS,
    );
    assert!(result.is_err());
}
