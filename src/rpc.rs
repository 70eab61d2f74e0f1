//! Chain RPC seam (spec.md §6): coin selection, transaction relay, and
//! block walking all go through this trait rather than talking to
//! `bitcoincore_rpc` directly, so the protocol engine can run against an
//! in-memory fake in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use bitcoin::{Block, BlockHash, Transaction, Txid};
use bitcoincore_rpc::json::ListUnspentResultEntry;
use bitcoincore_rpc::{Auth, Client, RpcApi};

use crate::error::{Result, SwapError};

/// A single spendable output as reported by `listunspent`.
#[derive(Debug, Clone)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub value_sat: u64,
    pub script_pubkey: bitcoin::ScriptBuf,
}

/// The RPC capability list spec.md §6 names: enough to select coins, sign
/// and relay a raw transaction, and walk the chain looking for
/// confirmations or spends. Modeled on `bitcoincore_rpc::RpcApi`, which
/// Litecoin Core and Dogecoin Core both implement unmodified.
pub trait ChainRpc {
    fn list_unspent(&self, min_conf: usize) -> Result<Vec<Utxo>>;
    fn get_new_address(&self) -> Result<bitcoin::Address>;
    fn get_raw_change_address(&self) -> Result<bitcoin::Address>;
    fn sign_raw_transaction_with_wallet(&self, tx: &Transaction) -> Result<Transaction>;
    fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid>;
    fn get_raw_transaction(&self, txid: &Txid) -> Result<Transaction>;
    fn get_raw_mempool(&self) -> Result<Vec<Txid>>;
    fn get_block_hash(&self, height: u64) -> Result<BlockHash>;
    fn get_block(&self, hash: &BlockHash) -> Result<Block>;
    fn get_block_count(&self) -> Result<u64>;
}

/// `bitcoincore_rpc::Client`-backed implementation. Works unmodified
/// against any Bitcoin Core RPC-compatible daemon.
pub struct NodeRpc {
    client: Client,
}

impl NodeRpc {
    pub fn connect(url: &str, user: &str, pass: &str) -> Result<Self> {
        let client = Client::new(url, Auth::UserPass(user.to_string(), pass.to_string()))
            .map_err(|e| SwapError::configuration(format!("cannot connect to {url}: {e}")))?;
        Ok(Self { client })
    }
}

impl ChainRpc for NodeRpc {
    fn list_unspent(&self, min_conf: usize) -> Result<Vec<Utxo>> {
        let entries: Vec<ListUnspentResultEntry> =
            self.client.list_unspent(Some(min_conf), None, None, None, None)?;
        Ok(entries
            .into_iter()
            .map(|e| Utxo {
                txid: e.txid,
                vout: e.vout,
                value_sat: e.amount.to_sat(),
                script_pubkey: e.script_pub_key,
            })
            .collect())
    }

    fn get_new_address(&self) -> Result<bitcoin::Address> {
        Ok(self
            .client
            .get_new_address(None, None)?
            .assume_checked())
    }

    fn get_raw_change_address(&self) -> Result<bitcoin::Address> {
        Ok(self.client.get_raw_change_address(None)?.assume_checked())
    }

    fn sign_raw_transaction_with_wallet(&self, tx: &Transaction) -> Result<Transaction> {
        let signed = self.client.sign_raw_transaction_with_wallet(tx, None, None)?;
        if !signed.complete {
            return Err(SwapError::trade("wallet could not fully sign transaction"));
        }
        signed.transaction().map_err(|e| SwapError::trade(format!("malformed signed transaction: {e}")))
    }

    fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid> {
        Ok(self.client.send_raw_transaction(tx)?)
    }

    fn get_raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
        Ok(self.client.get_raw_transaction(txid, None)?)
    }

    fn get_raw_mempool(&self) -> Result<Vec<Txid>> {
        Ok(self.client.get_raw_mempool()?)
    }

    fn get_block_hash(&self, height: u64) -> Result<BlockHash> {
        Ok(self.client.get_block_hash(height)?)
    }

    fn get_block(&self, hash: &BlockHash) -> Result<Block> {
        Ok(self.client.get_block(hash)?)
    }

    fn get_block_count(&self) -> Result<u64> {
        Ok(self.client.get_block_count()?)
    }
}

/// In-memory fake driving the tests that replace the teacher's
/// regtest-dependent integration suite.
#[derive(Default)]
pub struct FakeChainRpc {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    utxos: Vec<Utxo>,
    mempool: Vec<Transaction>,
    blocks: Vec<Block>,
    transactions: HashMap<Txid, Transaction>,
    next_address_index: u64,
}

impl FakeChainRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund(&self, utxo: Utxo) {
        self.state.lock().unwrap().utxos.push(utxo);
    }

    /// Appends a broadcast transaction to the mempool, simulating relay.
    pub fn broadcast_to_mempool(&self, tx: Transaction) {
        let mut state = self.state.lock().unwrap();
        state.transactions.insert(tx.compute_txid(), tx.clone());
        state.mempool.push(tx);
    }

    /// Moves every mempool transaction into a freshly mined block.
    pub fn mine_block(&self) -> BlockHash {
        use bitcoin::blockdata::block::{Header, Version};
        use bitcoin::{CompactTarget, TxMerkleNode};

        let mut state = self.state.lock().unwrap();
        let txdata = std::mem::take(&mut state.mempool);
        let header = Header {
            version: Version::ONE,
            prev_blockhash: state
                .blocks
                .last()
                .map(|b| b.block_hash())
                .unwrap_or_else(BlockHash::all_zeros),
            merkle_root: TxMerkleNode::all_zeros(),
            time: 0,
            bits: CompactTarget::from_consensus(0),
            nonce: state.blocks.len() as u32,
        };
        let block = Block { header, txdata };
        let hash = block.block_hash();
        state.blocks.push(block);
        hash
    }
}

impl ChainRpc for FakeChainRpc {
    fn list_unspent(&self, _min_conf: usize) -> Result<Vec<Utxo>> {
        Ok(self.state.lock().unwrap().utxos.clone())
    }

    fn get_new_address(&self) -> Result<bitcoin::Address> {
        let mut state = self.state.lock().unwrap();
        state.next_address_index += 1;
        Ok(fake_address(state.next_address_index))
    }

    fn get_raw_change_address(&self) -> Result<bitcoin::Address> {
        self.get_new_address()
    }

    fn sign_raw_transaction_with_wallet(&self, tx: &Transaction) -> Result<Transaction> {
        Ok(tx.clone())
    }

    fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid> {
        let txid = tx.compute_txid();
        self.broadcast_to_mempool(tx.clone());
        Ok(txid)
    }

    fn get_raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| SwapError::funds(format!("unknown transaction {txid}")))
    }

    fn get_raw_mempool(&self) -> Result<Vec<Txid>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .mempool
            .iter()
            .map(|t| t.compute_txid())
            .collect())
    }

    fn get_block_hash(&self, height: u64) -> Result<BlockHash> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .get(height as usize)
            .map(|b| b.block_hash())
            .ok_or_else(|| SwapError::funds(format!("no block at height {height}")))
    }

    fn get_block(&self, hash: &BlockHash) -> Result<Block> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .iter()
            .find(|b| b.block_hash() == *hash)
            .cloned()
            .ok_or_else(|| SwapError::funds(format!("unknown block {hash}")))
    }

    fn get_block_count(&self) -> Result<u64> {
        // Matches bitcoind semantics: the height of the tip, not the block
        // count — `get_block_hash(get_block_count())` must resolve.
        Ok(self.state.lock().unwrap().blocks.len().saturating_sub(1) as u64)
    }
}

fn fake_address(index: u64) -> bitcoin::Address {
    use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

    let secp = Secp256k1::new();
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&index.to_be_bytes());
    bytes[31] = 1;
    let sk = SecretKey::from_slice(&bytes).expect("valid scalar");
    let pk = PublicKey::from_secret_key(&secp, &sk);
    bitcoin::Address::p2wpkh(
        &bitcoin::CompressedPublicKey(pk),
        bitcoin::Network::Regtest,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    #[test]
    fn fake_rpc_tracks_broadcast_transactions() {
        let rpc = FakeChainRpc::new();
        let tx = Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        let txid = rpc.send_raw_transaction(&tx).unwrap();
        assert_eq!(rpc.get_raw_transaction(&txid).unwrap().compute_txid(), txid);
        assert_eq!(rpc.get_raw_mempool().unwrap(), vec![txid]);
    }

    #[test]
    fn mining_clears_the_mempool() {
        let rpc = FakeChainRpc::new();
        let tx = Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        rpc.broadcast_to_mempool(tx);
        assert_eq!(rpc.get_raw_mempool().unwrap().len(), 1);
        let hash = rpc.mine_block();
        assert_eq!(rpc.get_raw_mempool().unwrap().len(), 0);
        assert_eq!(rpc.get_block(&hash).unwrap().txdata.len(), 1);
        assert_ne!(hash, BlockHash::all_zeros());
    }
}
