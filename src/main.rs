//! CLI driver exercising the swap engine one protocol step at a time.
//!
//! The reddit messaging transport and interactive prompt UX are out of
//! scope (spec.md §1); this binary stands in for both by reading/writing
//! the JSON message envelopes of §6 as files, one subcommand per step.

mod args;

use std::path::Path;

use atomic_swap_engine::config::Config;
use atomic_swap_engine::error::{Result, SwapError};
use atomic_swap_engine::keys::KeyPair;
use atomic_swap_engine::protocol::engine::{ChainContext, ProtocolEngine};
use atomic_swap_engine::protocol::messages::{Accept, Confirm, Offer, Send};
use atomic_swap_engine::protocol::trade::slots;
use atomic_swap_engine::rpc::{ChainRpc, NodeRpc};
use atomic_swap_engine::script;
use atomic_swap_engine::store::{FileTradeStore, TradeStore};
use atomic_swap_engine::fees::FeeRate;

use args::{Args, Commands};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use clap::Parser;
use uuid::Uuid;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            tracing::error!(%err, "step failed");
            std::process::exit(err.exit_code());
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    let store = FileTradeStore::new(&args.store);

    match &args.command {
        Commands::Offer { trade_id, offer_currency, offer_quantity, ask_currency, ask_quantity, out } => {
            cmd_offer(&store, &config, *trade_id, offer_currency, *offer_quantity, ask_currency, *ask_quantity, out)
        }
        Commands::ReceiveOffer { offer_file, out } => cmd_receive_offer(&store, &config, offer_file, out),
        Commands::ReceiveAccept { accept_file, out } => cmd_receive_accept(&store, &config, accept_file, out),
        Commands::ReceiveConfirm { confirm_file, out } => cmd_receive_confirm(&store, &config, confirm_file, out),
        Commands::ReceiveSend { send_file } => cmd_receive_send(&store, &config, send_file),
        Commands::ClaimAsB { trade_id } => cmd_claim_as_b(&store, &config, *trade_id),
        Commands::ClaimAsA { trade_id } => cmd_claim_as_a(&store, &config, *trade_id),
        Commands::Refund { trade_id, which } => cmd_refund(&store, &config, *trade_id, which),
    }
}

fn secp() -> Secp256k1<bitcoin::secp256k1::All> {
    Secp256k1::new()
}

fn load_keypair(store: &FileTradeStore, trade_id: Uuid, slot: &str) -> Result<KeyPair> {
    let secp = secp();
    let bytes = store.read(trade_id, slot)?;
    let secret_key = SecretKey::from_slice(&bytes)?;
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);
    Ok(KeyPair { secret_key, public_key })
}

fn connect_chain(config: &Config, currency_code: &str) -> Result<(NodeRpc, FeeRate)> {
    let currency = config.currency(currency_code)?;
    let rpc = NodeRpc::connect(&currency.rpc_url, &currency.rpc_user, &currency.rpc_pass)?;
    Ok((rpc, FeeRate::new(currency.fee_per_kb)))
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn cmd_offer(
    store: &FileTradeStore,
    config: &Config,
    trade_id: Uuid,
    offer_currency: &str,
    offer_quantity: u64,
    ask_currency: &str,
    ask_quantity: u64,
    out: &Path,
) -> Result<()> {
    let registry = atomic_swap_engine::chain::ChainRegistry::new();
    let offer_hash = registry.genesis_for(offer_currency)?.to_string();
    let ask_hash = registry.genesis_for(ask_currency)?.to_string();
    let _ = config;

    let engine = ProtocolEngine::new(store);
    let (offer, _keypair) = engine.create_offer(trade_id, offer_hash, offer_quantity, ask_hash, ask_quantity)?;
    write_json(out, &offer)?;
    tracing::info!(%trade_id, "offer created");
    Ok(())
}

fn cmd_receive_offer(store: &FileTradeStore, config: &Config, offer_file: &Path, out: &Path) -> Result<()> {
    let offer: Offer = read_json(offer_file)?;
    let registry = atomic_swap_engine::chain::ChainRegistry::new();
    let ask_code = registry.code_for(&offer.ask_currency_hash)?;
    let (ask_rpc, ask_fee) = connect_chain(config, ask_code)?;
    let ask_ctx = ChainContext { rpc: &ask_rpc, fee_rate: ask_fee };
    let refund_address = ask_rpc.get_new_address()?;

    let engine = ProtocolEngine::new(store);
    let accept = engine.receive_offer(&offer, &ask_ctx, &refund_address)?;
    write_json(out, &accept)?;
    tracing::info!(trade_id = %offer.trade_id, "offer accepted");
    Ok(())
}

fn cmd_receive_accept(store: &FileTradeStore, config: &Config, accept_file: &Path, out: &Path) -> Result<()> {
    let accept: Accept = read_json(accept_file)?;
    let offer_bytes = store.read(accept.trade_id, slots::OFFER)?;
    let trade: atomic_swap_engine::protocol::trade::Trade = serde_json::from_slice(&offer_bytes)?;
    let registry = atomic_swap_engine::chain::ChainRegistry::new();
    let offer_code = registry.code_for(&trade.offer_currency_hash)?;
    let (offer_rpc, offer_fee) = connect_chain(config, offer_code)?;
    let offer_ctx = ChainContext { rpc: &offer_rpc, fee_rate: offer_fee };
    let refund_address = offer_rpc.get_new_address()?;

    let a_keypair = load_keypair(store, accept.trade_id, slots::PRIVATE_KEY_A)?;
    let engine = ProtocolEngine::new(store);
    let confirm = engine.receive_accept(&accept, &a_keypair, trade.offer_currency_quantity, trade.ask_currency_quantity, &offer_ctx, &refund_address)?;
    write_json(out, &confirm)?;
    tracing::info!(trade_id = %accept.trade_id, "accept processed");
    Ok(())
}

fn cmd_receive_confirm(store: &FileTradeStore, config: &Config, confirm_file: &Path, out: &Path) -> Result<()> {
    let confirm: Confirm = read_json(confirm_file)?;
    let offer_bytes = store.read(confirm.trade_id, slots::OFFER_RECEIVED)?;
    let offer: Offer = serde_json::from_slice(&offer_bytes)?;
    let registry = atomic_swap_engine::chain::ChainRegistry::new();
    let ask_code = registry.code_for(&offer.ask_currency_hash)?;
    let (ask_rpc, ask_fee) = connect_chain(config, ask_code)?;
    let ask_ctx = ChainContext { rpc: &ask_rpc, fee_rate: ask_fee };

    let b_keypair = load_keypair(store, confirm.trade_id, slots::PRIVATE_KEY_B)?;
    let secret_bytes = store.read(confirm.trade_id, slots::SECRET)?;
    let preimage: [u8; 16] = secret_bytes.try_into().map_err(|_| SwapError::audit("corrupt secret slot"))?;
    let secret_hash = script::secret_hash(&preimage);
    let a_pub = PublicKey::from_slice(&hex::decode(&offer.public_key_b)?)?;

    let acceptance_bytes = store.read(confirm.trade_id, slots::ACCEPTANCE)?;
    let acceptance: Accept = serde_json::from_slice(&acceptance_bytes)?;
    let unsigned_tx2 = acceptance.tx2()?;

    let engine = ProtocolEngine::new(store);
    let send = engine.receive_confirm(&confirm, &b_keypair, &a_pub, &secret_hash, &unsigned_tx2, offer.offer_currency_quantity, &ask_ctx)?;
    write_json(out, &send)?;
    tracing::info!(trade_id = %confirm.trade_id, "confirm processed, TX1 broadcast");
    Ok(())
}

fn cmd_receive_send(store: &FileTradeStore, config: &Config, send_file: &Path) -> Result<()> {
    let send: Send = read_json(send_file)?;
    let offer_bytes = store.read(send.trade_id, slots::OFFER)?;
    let trade: atomic_swap_engine::protocol::trade::Trade = serde_json::from_slice(&offer_bytes)?;
    let registry = atomic_swap_engine::chain::ChainRegistry::new();
    let offer_code = registry.code_for(&trade.offer_currency_hash)?;
    let ask_code = registry.code_for(&trade.ask_currency_hash)?;
    let (offer_rpc, offer_fee) = connect_chain(config, offer_code)?;
    let (ask_rpc, ask_fee) = connect_chain(config, ask_code)?;
    let offer_ctx = ChainContext { rpc: &offer_rpc, fee_rate: offer_fee };
    let ask_ctx = ChainContext { rpc: &ask_rpc, fee_rate: ask_fee };

    let a_keypair = load_keypair(store, send.trade_id, slots::PRIVATE_KEY_A)?;
    let acceptance_bytes = store.read(send.trade_id, slots::ACCEPTANCE_RECEIVED)?;
    let acceptance: Accept = serde_json::from_slice(&acceptance_bytes)?;
    let b_pub = acceptance.public_key_a()?;
    let secret_hash = acceptance.secret_hash_bytes()?;

    let confirmation_bytes = store.read(send.trade_id, slots::CONFIRMATION)?;
    let confirmation: Confirm = serde_json::from_slice(&confirmation_bytes)?;
    let unsigned_tx4 = confirmation.tx4()?;

    let coins_sent = store.read(send.trade_id, slots::COINS_SENT)?;
    let tx1_txid: bitcoin::Txid = String::from_utf8_lossy(&coins_sent).parse().map_err(|_| SwapError::audit("corrupt coins_sent slot"))?;

    let engine = ProtocolEngine::new(store);
    engine.receive_send(&send, &a_keypair, &b_pub, &secret_hash, &unsigned_tx4, &ask_ctx, &offer_ctx, tx1_txid)?;
    tracing::info!(trade_id = %send.trade_id, "send processed, TX3 broadcast");
    Ok(())
}

fn cmd_claim_as_b(store: &FileTradeStore, config: &Config, trade_id: Uuid) -> Result<()> {
    let offer_bytes = store.read(trade_id, slots::OFFER_RECEIVED)?;
    let offer: Offer = serde_json::from_slice(&offer_bytes)?;
    let registry = atomic_swap_engine::chain::ChainRegistry::new();
    let offer_code = registry.code_for(&offer.offer_currency_hash)?;
    let (offer_rpc, offer_fee) = connect_chain(config, offer_code)?;
    let offer_ctx = ChainContext { rpc: &offer_rpc, fee_rate: offer_fee };

    let b_keypair = load_keypair(store, trade_id, slots::PRIVATE_KEY_B)?;
    let secret_bytes = store.read(trade_id, slots::SECRET)?;
    let preimage: [u8; 16] = secret_bytes.try_into().map_err(|_| SwapError::audit("corrupt secret slot"))?;
    let a_pub = PublicKey::from_slice(&hex::decode(&offer.public_key_b)?)?;
    let secret_hash = script::secret_hash(&preimage);

    let tx3_bytes = store.read(trade_id, slots::TX3)?;
    let tx3: bitcoin::Transaction = bitcoin::consensus::encode::deserialize(&tx3_bytes).map_err(|e| SwapError::audit(format!("corrupt tx3: {e}")))?;
    let htlc_script = script::htlc_script(&b_keypair.public_key, &a_pub, &secret_hash);
    let commitment = atomic_swap_engine::txbuilder::CommitmentTx {
        transaction: tx3.clone(),
        htlc_vout: 0,
        htlc_script,
        value_sat: tx3.output[0].value.to_sat(),
    };

    let claim_address = offer_rpc.get_new_address()?;
    let engine = ProtocolEngine::new(store);
    let txid = engine.claim_as_b(trade_id, &b_keypair, &preimage, &commitment, &offer_ctx, &claim_address)?;
    tracing::info!(%trade_id, %txid, "claimed TX3 as B");
    Ok(())
}

fn cmd_claim_as_a(store: &FileTradeStore, config: &Config, trade_id: Uuid) -> Result<()> {
    let offer_bytes = store.read(trade_id, slots::OFFER)?;
    let trade: atomic_swap_engine::protocol::trade::Trade = serde_json::from_slice(&offer_bytes)?;
    let registry = atomic_swap_engine::chain::ChainRegistry::new();
    let offer_code = registry.code_for(&trade.offer_currency_hash)?;
    let ask_code = registry.code_for(&trade.ask_currency_hash)?;
    let (offer_rpc, offer_fee) = connect_chain(config, offer_code)?;
    let (ask_rpc, ask_fee) = connect_chain(config, ask_code)?;
    let offer_ctx = ChainContext { rpc: &offer_rpc, fee_rate: offer_fee };
    let ask_ctx = ChainContext { rpc: &ask_rpc, fee_rate: ask_fee };

    let a_keypair = load_keypair(store, trade_id, slots::PRIVATE_KEY_A)?;
    let acceptance_bytes = store.read(trade_id, slots::ACCEPTANCE_RECEIVED)?;
    let acceptance: Accept = serde_json::from_slice(&acceptance_bytes)?;
    let b_pub = acceptance.public_key_a()?;
    let secret_hash = acceptance.secret_hash_bytes()?;

    let tx3_bytes = store.read(trade_id, slots::TX3)?;
    let tx3: bitcoin::Transaction = bitcoin::consensus::encode::deserialize(&tx3_bytes).map_err(|e| SwapError::audit(format!("corrupt tx3: {e}")))?;
    let htlc_script = script::htlc_script(&b_pub, &a_keypair.public_key, &secret_hash);
    let tx3_commitment = atomic_swap_engine::txbuilder::CommitmentTx {
        transaction: tx3.clone(),
        htlc_vout: 0,
        htlc_script,
        value_sat: tx3.output[0].value.to_sat(),
    };

    let claim_address = ask_rpc.get_new_address()?;
    let not_before_time = 0;
    let engine = ProtocolEngine::new(store);
    match engine.claim_as_a(trade_id, &a_keypair, &b_pub, &secret_hash, &tx3_commitment, &offer_ctx, &ask_ctx, &claim_address, not_before_time)? {
        Some(txid) => tracing::info!(%trade_id, %txid, "claimed TX1 as A"),
        None => tracing::info!(%trade_id, "no spend of TX3 observed yet"),
    }
    Ok(())
}

fn cmd_refund(store: &FileTradeStore, config: &Config, trade_id: Uuid, which: &str) -> Result<()> {
    let offer_bytes = store.read(trade_id, slots::OFFER)?;
    let trade: atomic_swap_engine::protocol::trade::Trade = serde_json::from_slice(&offer_bytes)?;
    let registry = atomic_swap_engine::chain::ChainRegistry::new();

    let engine = ProtocolEngine::new(store);
    match which {
        "tx2" => {
            let ask_code = registry.code_for(&trade.ask_currency_hash)?;
            let (ask_rpc, ask_fee) = connect_chain(config, ask_code)?;
            let ask_ctx = ChainContext { rpc: &ask_rpc, fee_rate: ask_fee };
            let tx2_bytes = store.read(trade_id, slots::TX2)?;
            let tx2: bitcoin::Transaction = bitcoin::consensus::encode::deserialize(&tx2_bytes).map_err(|e| SwapError::audit(format!("corrupt tx2: {e}")))?;
            let txid = engine.broadcast_refund(&ask_ctx, &tx2)?;
            tracing::info!(%trade_id, %txid, "refunded via TX2");
        }
        "tx4" => {
            let offer_code = registry.code_for(&trade.offer_currency_hash)?;
            let (offer_rpc, offer_fee) = connect_chain(config, offer_code)?;
            let offer_ctx = ChainContext { rpc: &offer_rpc, fee_rate: offer_fee };
            let tx4_bytes = store.read(trade_id, slots::TX4)?;
            let tx4: bitcoin::Transaction = bitcoin::consensus::encode::deserialize(&tx4_bytes).map_err(|e| SwapError::audit(format!("corrupt tx4: {e}")))?;
            let txid = engine.broadcast_refund(&offer_ctx, &tx4)?;
            tracing::info!(%trade_id, %txid, "refunded via TX4");
        }
        other => return Err(SwapError::message(format!("unknown refund target {other:?}, expected \"tx2\" or \"tx4\""))),
    }
    Ok(())
}
