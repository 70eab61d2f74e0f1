//! Trade store (spec.md §4.6): write-once, per-trade persistence.
//!
//! Slots are written exactly once and never overwritten — the protocol
//! engine's replay/idempotency guarantees depend on `has(slot)` being a
//! reliable signal that a step already ran (spec.md §8 crash-resume
//! property). The filesystem layout is `<root>/<trade_id>/<slot>`, one
//! file per slot, mirroring the original's per-trade `audits/<trade_id>/`
//! directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use uuid::Uuid;

use std::collections::HashMap;

use crate::error::{Result, SwapError};

/// Write-once key -> bytes persistence, scoped to a single trade.
pub trait TradeStore {
    fn has(&self, trade_id: Uuid, slot: &str) -> Result<bool>;
    fn read(&self, trade_id: Uuid, slot: &str) -> Result<Vec<u8>>;
    fn write(&self, trade_id: Uuid, slot: &str, data: &[u8]) -> Result<()>;
    fn list_trades(&self) -> Result<Vec<Uuid>>;
}

fn validate_slot(slot: &str) -> Result<()> {
    if slot.is_empty() || slot.contains('/') || slot.contains('\\') || slot.contains("..") {
        return Err(SwapError::audit(format!("invalid slot name {slot:?}")));
    }
    Ok(())
}

/// Filesystem-backed trade store rooted at a directory, one subdirectory
/// per trade (named by its canonical UUID).
pub struct FileTradeStore {
    root: PathBuf,
}

impl FileTradeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn trade_dir(&self, trade_id: Uuid) -> PathBuf {
        self.root.join(trade_id.to_string())
    }

    fn slot_path(&self, trade_id: Uuid, slot: &str) -> Result<PathBuf> {
        validate_slot(slot)?;
        Ok(self.trade_dir(trade_id).join(slot))
    }
}

impl TradeStore for FileTradeStore {
    fn has(&self, trade_id: Uuid, slot: &str) -> Result<bool> {
        Ok(self.slot_path(trade_id, slot)?.is_file())
    }

    fn read(&self, trade_id: Uuid, slot: &str) -> Result<Vec<u8>> {
        let path = self.slot_path(trade_id, slot)?;
        fs::read(&path).map_err(|e| SwapError::audit(format!("missing slot {slot} for trade {trade_id}: {e}")))
    }

    fn write(&self, trade_id: Uuid, slot: &str, data: &[u8]) -> Result<()> {
        let path = self.slot_path(trade_id, slot)?;
        if path.is_file() {
            return Err(SwapError::audit(format!("slot {slot} for trade {trade_id} already written")));
        }
        fs::create_dir_all(self.trade_dir(trade_id))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn list_trades(&self) -> Result<Vec<Uuid>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut trades = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(id) = Uuid::parse_str(name) {
                    trades.push(id);
                }
            }
        }
        Ok(trades)
    }
}

/// In-memory fake used by tests.
#[derive(Default)]
pub struct InMemoryTradeStore {
    slots: Mutex<HashMap<(Uuid, String), Vec<u8>>>,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradeStore for InMemoryTradeStore {
    fn has(&self, trade_id: Uuid, slot: &str) -> Result<bool> {
        validate_slot(slot)?;
        Ok(self.slots.lock().unwrap().contains_key(&(trade_id, slot.to_string())))
    }

    fn read(&self, trade_id: Uuid, slot: &str) -> Result<Vec<u8>> {
        validate_slot(slot)?;
        self.slots
            .lock()
            .unwrap()
            .get(&(trade_id, slot.to_string()))
            .cloned()
            .ok_or_else(|| SwapError::audit(format!("missing slot {slot} for trade {trade_id}")))
    }

    fn write(&self, trade_id: Uuid, slot: &str, data: &[u8]) -> Result<()> {
        validate_slot(slot)?;
        let mut slots = self.slots.lock().unwrap();
        let key = (trade_id, slot.to_string());
        if slots.contains_key(&key) {
            return Err(SwapError::audit(format!("slot {slot} for trade {trade_id} already written")));
        }
        slots.insert(key, data.to_vec());
        Ok(())
    }

    fn list_trades(&self) -> Result<Vec<Uuid>> {
        Ok(self
            .slots
            .lock()
            .unwrap()
            .keys()
            .map(|(id, _)| *id)
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect())
    }
}

/// Confirms a trade directory can only ever be addressed by a canonical
/// UUID path component, blocking path traversal through a malicious
/// trade_id (spec.md §7 MessageError: bad UUID).
pub fn validate_trade_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| SwapError::message(format!("invalid trade id {raw:?}: {e}")))
}

#[allow(dead_code)]
fn _assert_path_is_scoped(root: &Path, trade_id: Uuid) -> PathBuf {
    root.join(trade_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_once_rejects_second_write() {
        let store = InMemoryTradeStore::new();
        let trade_id = Uuid::new_v4();
        store.write(trade_id, "1_offer", b"hello").unwrap();
        assert!(store.write(trade_id, "1_offer", b"again").is_err());
    }

    #[test]
    fn has_reflects_written_slots() {
        let store = InMemoryTradeStore::new();
        let trade_id = Uuid::new_v4();
        assert!(!store.has(trade_id, "1_offer").unwrap());
        store.write(trade_id, "1_offer", b"hello").unwrap();
        assert!(store.has(trade_id, "1_offer").unwrap());
    }

    #[test]
    fn rejects_path_traversal_slot_names() {
        let store = InMemoryTradeStore::new();
        let trade_id = Uuid::new_v4();
        assert!(store.write(trade_id, "../etc/passwd", b"x").is_err());
        assert!(store.write(trade_id, "a/b", b"x").is_err());
    }

    #[test]
    fn filesystem_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let trade_id = Uuid::new_v4();
        {
            let store = FileTradeStore::new(dir.path());
            store.write(trade_id, "1_offer", b"hello").unwrap();
        }
        let store = FileTradeStore::new(dir.path());
        assert!(store.has(trade_id, "1_offer").unwrap());
        assert_eq!(store.read(trade_id, "1_offer").unwrap(), b"hello");
    }

    #[test]
    fn filesystem_store_rejects_duplicate_write() {
        let dir = tempfile::tempdir().unwrap();
        let trade_id = Uuid::new_v4();
        let store = FileTradeStore::new(dir.path());
        store.write(trade_id, "1_offer", b"hello").unwrap();
        assert!(store.write(trade_id, "1_offer", b"again").is_err());
    }
}
