//! Transaction builder (spec.md §4.4): constructs the commitment,
//! refund, and claim transactions around the HTLC script in [`crate::script`].

use bitcoin::absolute::LockTime;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, Signing, Verification};
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use crate::error::{Result, SwapError};
use crate::fees::FeeRate;
use crate::rpc::{ChainRpc, Utxo};
use crate::script;

/// Minimum relative lock time before a refund becomes valid — 12 hours of
/// blocks at the chain's target spacing is approximated here in block
/// count the same way the original bounds its lock window (spec.md §3
/// invariant 5: 12h-72h).
pub const MIN_REFUND_SEQUENCE: u32 = 1;

/// A built, but not yet broadcast, commitment transaction plus the data
/// needed to later claim or refund it.
#[derive(Debug, Clone)]
pub struct CommitmentTx {
    pub transaction: Transaction,
    pub htlc_vout: u32,
    pub htlc_script: ScriptBuf,
    pub value_sat: u64,
}

/// Builds the funder's commitment transaction: one output paying
/// `value_sat` to the P2WSH of the HTLC script, change back to the
/// funder, fee computed via `FeeRate::fee_for_size` with an assumed
/// 2-output/selected-input size of 2000 bytes (spec.md §4.4).
pub fn build_commitment(
    rpc: &dyn ChainRpc,
    recipient_pub: &PublicKey,
    sender_pub: &PublicKey,
    secret_hash: &[u8; 32],
    value_sat: u64,
    fee_rate: FeeRate,
) -> Result<CommitmentTx> {
    let htlc_script = script::htlc_script(recipient_pub, sender_pub, secret_hash);
    let htlc_address = Address::p2wsh(&htlc_script, bitcoin::Network::Bitcoin);

    let fee = fee_rate.fee_for_size(2000);
    let target = value_sat + fee;

    let utxos = rpc.list_unspent(1)?;
    let selected = select_inputs(&utxos, target)?;
    let selected_total: u64 = selected.iter().map(|u| u.value_sat).sum();
    let change = selected_total - target;

    let mut inputs: Vec<TxIn> = selected
        .iter()
        .map(|u| TxIn {
            previous_output: OutPoint { txid: u.txid, vout: u.vout },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        })
        .collect();
    inputs.sort_by_key(|i| i.previous_output);

    let mut outputs = vec![TxOut {
        value: Amount::from_sat(value_sat),
        script_pubkey: htlc_address.script_pubkey(),
    }];
    if change > 0 {
        let change_address = rpc.get_raw_change_address()?;
        outputs.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: change_address.script_pubkey(),
        });
    }

    let transaction = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    };
    let signed = rpc.sign_raw_transaction_with_wallet(&transaction)?;

    Ok(CommitmentTx {
        transaction: signed,
        htlc_vout: 0,
        htlc_script,
        value_sat,
    })
}

/// Greedy accumulation in RPC-returned order — matches `find_inputs` in
/// the original source, which performs no UTXO-selection heuristic beyond
/// walking `listunspent`'s list until the target is covered.
fn select_inputs(utxos: &[Utxo], target: u64) -> Result<Vec<Utxo>> {
    let mut selected = Vec::new();
    let mut total = 0u64;
    for utxo in utxos {
        if total >= target {
            break;
        }
        total += utxo.value_sat;
        selected.push(utxo.clone());
    }
    if total < target {
        return Err(SwapError::funds(format!(
            "insufficient funds: need {target} sats, have {total} sats available"
        )));
    }
    Ok(selected)
}

/// Builds the unsigned refund transaction spending a commitment's HTLC
/// output back to the sender, locked by `nSequence`/`nLockTime` rather
/// than any opcode inside the HTLC script itself (spec.md §3 invariant 5).
pub fn build_unsigned_refund(
    commitment_txid: Txid,
    commitment: &CommitmentTx,
    fee_rate: FeeRate,
    refund_address: &Address,
    lock_time: LockTime,
    sequence: u32,
) -> Transaction {
    let fee = fee_rate.fee_for_size(1000);
    let value = commitment.value_sat.saturating_sub(fee);

    Transaction {
        version: Version::TWO,
        lock_time,
        input: vec![TxIn {
            previous_output: OutPoint { txid: commitment_txid, vout: commitment.htlc_vout },
            script_sig: ScriptBuf::new(),
            sequence: Sequence(sequence),
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: refund_address.script_pubkey(),
        }],
    }
}

/// The recipient's half of the two-signature refund path — produced
/// during the cooperative SEND step and held by the sender until the
/// timelock expires (spec.md §4.4 `sign_refund_partial`).
pub fn sign_refund_partial(
    secp: &Secp256k1<impl Signing>,
    unsigned_refund: &Transaction,
    htlc_script: &ScriptBuf,
    value_sat: u64,
    secret_key: &SecretKey,
) -> Result<Vec<u8>> {
    let msg = script::htlc_sighash(unsigned_refund, 0, htlc_script, value_sat)?;
    Ok(script::sign_htlc(secp, &msg, secret_key))
}

/// Assembles the final, broadcastable refund transaction from the two
/// partial signatures (spec.md §4.4 `assemble_refund`).
pub fn assemble_refund(
    mut unsigned_refund: Transaction,
    sender_sig: &[u8],
    sender_pub: &PublicKey,
    recipient_sig: &[u8],
    recipient_pub: &PublicKey,
    htlc_script: &ScriptBuf,
) -> Transaction {
    unsigned_refund.input[0].witness =
        script::refund_witness(sender_sig, sender_pub, recipient_sig, recipient_pub, htlc_script);
    unsigned_refund
}

/// Validates a refund transaction against the invariants spec.md §3 and
/// §4.4 require before the sender signs its half: single input spending
/// the expected commitment output, single output paying no more than
/// `max_value` (the commitment output being refunded), non-final
/// `nSequence`, `nLockTime` inside the 12h-72h window expressed in blocks
/// via `min_blocks`/`max_blocks`.
pub fn validate_refund(
    refund: &Transaction,
    expected_commitment_txid: Txid,
    expected_vout: u32,
    max_value: u64,
    min_blocks: u32,
    max_blocks: u32,
) -> Result<()> {
    if refund.input.len() != 1 {
        return Err(SwapError::trade("refund transaction must have exactly one input"));
    }
    let input = &refund.input[0];
    if input.previous_output.txid != expected_commitment_txid || input.previous_output.vout != expected_vout {
        return Err(SwapError::trade("refund transaction spends the wrong commitment output"));
    }
    if input.sequence == Sequence::MAX {
        return Err(SwapError::trade("refund transaction must not use a final nSequence"));
    }
    if refund.output.len() != 1 {
        return Err(SwapError::trade("refund transaction must have exactly one output"));
    }
    if refund.output[0].value.to_sat() > max_value {
        return Err(SwapError::trade(format!(
            "refund output pays {} sats, more than the commitment output's {max_value} sats",
            refund.output[0].value.to_sat()
        )));
    }
    match refund.lock_time {
        LockTime::Blocks(h) if h.to_consensus_u32() >= min_blocks && h.to_consensus_u32() <= max_blocks => Ok(()),
        LockTime::Blocks(h) => Err(SwapError::trade(format!(
            "refund lock time {} outside the allowed window [{min_blocks}, {max_blocks}]",
            h.to_consensus_u32()
        ))),
        LockTime::Seconds(_) => Err(SwapError::trade("refund lock time must be block-height based")),
    }
}

/// Validates that a commitment transaction actually pays the agreed
/// amount into the agreed HTLC script, as §4.4 requires before either
/// party signs a dependent refund transaction.
pub fn validate_commitment(commitment_tx: &Transaction, expected_script: &ScriptBuf, expected_value_sat: u64, vout: u32) -> Result<()> {
    let output = commitment_tx
        .output
        .get(vout as usize)
        .ok_or_else(|| SwapError::trade("commitment transaction has no such output"))?;
    let expected_address = Address::p2wsh(expected_script, bitcoin::Network::Bitcoin);
    if output.script_pubkey != expected_address.script_pubkey() {
        return Err(SwapError::trade("commitment output does not pay the agreed HTLC script"));
    }
    if output.value.to_sat() != expected_value_sat {
        return Err(SwapError::trade(format!(
            "commitment output pays {} sats, expected {expected_value_sat}",
            output.value.to_sat()
        )));
    }
    Ok(())
}

/// Builds the recipient's claim transaction spending a commitment's HTLC
/// output via the secret-reveal branch (spec.md §4.4 `build_claim`).
pub fn build_claim(
    secp: &Secp256k1<impl Signing + Verification>,
    commitment_txid: Txid,
    commitment: &CommitmentTx,
    fee_rate: FeeRate,
    claim_address: &Address,
    recipient_secret: &SecretKey,
    recipient_pub: &PublicKey,
    preimage: &[u8; 16],
) -> Result<Transaction> {
    let fee = fee_rate.fee_for_size(1000);
    let value = commitment.value_sat.saturating_sub(fee);

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint { txid: commitment_txid, vout: commitment.htlc_vout },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: claim_address.script_pubkey(),
        }],
    };

    let msg = script::htlc_sighash(&tx, 0, &commitment.htlc_script, commitment.value_sat)?;
    let sig = script::sign_htlc(secp, &msg, recipient_secret);
    tx.input[0].witness = script::claim_witness(&sig, recipient_pub, preimage, &commitment.htlc_script);
    Ok(tx)
}
