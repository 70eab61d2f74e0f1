//! Message transport seam (SPEC_FULL §6). The genuinely out-of-scope
//! collaborator is the reddit messaging bot; only a file-drop
//! implementation ships here, standing in for it the way the trade store
//! stands in for a real database.

use std::fs;
use std::path::PathBuf;

use uuid::Uuid;

use crate::error::Result;

pub trait MessageTransport {
    fn send(&self, trade_id: Uuid, envelope: &[u8]) -> Result<()>;
    fn try_recv(&self, trade_id: Uuid) -> Result<Vec<Vec<u8>>>;
}

/// Writes outgoing envelopes to `<root>/<trade_id>/outbox/<n>.json` and
/// reads incoming ones from `<root>/<trade_id>/inbox/`.
pub struct FileDropTransport {
    root: PathBuf,
}

impl FileDropTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn outbox(&self, trade_id: Uuid) -> PathBuf {
        self.root.join(trade_id.to_string()).join("outbox")
    }

    fn inbox(&self, trade_id: Uuid) -> PathBuf {
        self.root.join(trade_id.to_string()).join("inbox")
    }
}

impl MessageTransport for FileDropTransport {
    fn send(&self, trade_id: Uuid, envelope: &[u8]) -> Result<()> {
        let dir = self.outbox(trade_id);
        fs::create_dir_all(&dir)?;
        let n = fs::read_dir(&dir)?.count();
        fs::write(dir.join(format!("{n}.json")), envelope)?;
        Ok(())
    }

    fn try_recv(&self, trade_id: Uuid) -> Result<Vec<Vec<u8>>> {
        let dir = self.inbox(trade_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries: Vec<PathBuf> = fs::read_dir(&dir)?.filter_map(|e| e.ok().map(|e| e.path())).collect();
        entries.sort();
        entries.into_iter().map(fs::read).map(|r| r.map_err(Into::into)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_try_recv_round_trips_through_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileDropTransport::new(dir.path());
        let trade_id = Uuid::new_v4();

        transport.send(trade_id, b"{\"step\":1}").unwrap();
        assert!(transport.try_recv(trade_id).unwrap().is_empty());

        let inbox = dir.path().join(trade_id.to_string()).join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();
        std::fs::write(inbox.join("0.json"), b"{\"step\":2}").unwrap();

        let received = transport.try_recv(trade_id).unwrap();
        assert_eq!(received, vec![b"{\"step\":2}".to_vec()]);
    }
}
