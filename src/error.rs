//! Error taxonomy for the swap engine.
//!
//! Every fallible operation in this crate returns [`Result<T>`], aliasing
//! [`std::result::Result<T, SwapError>`]. The five kinds mirror the
//! taxonomy the protocol's audit trail depends on: a `MessageError` or
//! `TradeError` must never advance a trade's persisted state, while a
//! `ConfigurationError` is fatal to the process.

use std::fmt;

/// The five error kinds a handler can surface, plus their payloads.
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    /// Missing/malformed configuration, or a node unreachable at startup.
    /// Fatal to the process.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Schema violation, bad UUID, unknown currency, wrong-length hash,
    /// value below minimum. The message is skipped; trade state does not
    /// advance.
    #[error("message error: {0}")]
    Message(String),

    /// Coin selection could not cover quantity + fee.
    #[error("insufficient funds: {0}")]
    Funds(String),

    /// Signature verification failure, invalid refund lock time, a
    /// commitment that doesn't pay the expected amount/script, a claim
    /// input with no preimage. The step aborts; the refund path recovers.
    #[error("trade error: {0}")]
    Trade(String),

    /// A slot that should exist is missing, or a slot that should be
    /// empty is present. Halts the step.
    #[error("audit error: {0}")]
    Audit(String),
}

pub type Result<T> = std::result::Result<T, SwapError>;

impl SwapError {
    pub fn configuration(msg: impl fmt::Display) -> Self {
        SwapError::Configuration(msg.to_string())
    }
    pub fn message(msg: impl fmt::Display) -> Self {
        SwapError::Message(msg.to_string())
    }
    pub fn funds(msg: impl fmt::Display) -> Self {
        SwapError::Funds(msg.to_string())
    }
    pub fn trade(msg: impl fmt::Display) -> Self {
        SwapError::Trade(msg.to_string())
    }
    pub fn audit(msg: impl fmt::Display) -> Self {
        SwapError::Audit(msg.to_string())
    }

    /// The exit code a fatal error at the process boundary should produce,
    /// per §6: 0 on success, 1 on configuration/RPC-reachability failure.
    /// Per-trade validation failures (`Message`/`Funds`/`Trade`/`Audit`) do
    /// not terminate the process and are not routed through this.
    pub fn exit_code(&self) -> i32 {
        match self {
            SwapError::Configuration(_) => 1,
            _ => 0,
        }
    }
}

impl From<std::io::Error> for SwapError {
    fn from(err: std::io::Error) -> Self {
        SwapError::Configuration(format!("I/O error: {err}"))
    }
}

impl From<serde_json::Error> for SwapError {
    fn from(err: serde_json::Error) -> Self {
        SwapError::Message(format!("malformed JSON: {err}"))
    }
}

impl From<toml::de::Error> for SwapError {
    fn from(err: toml::de::Error) -> Self {
        SwapError::Configuration(format!("malformed configuration: {err}"))
    }
}

impl From<bitcoincore_rpc::Error> for SwapError {
    fn from(err: bitcoincore_rpc::Error) -> Self {
        SwapError::Funds(format!("chain RPC error: {err}"))
    }
}

impl From<bitcoin::secp256k1::Error> for SwapError {
    fn from(err: bitcoin::secp256k1::Error) -> Self {
        SwapError::Trade(format!("signature error: {err}"))
    }
}

impl From<uuid::Error> for SwapError {
    fn from(err: uuid::Error) -> Self {
        SwapError::Message(format!("invalid trade id: {err}"))
    }
}

impl From<hex::FromHexError> for SwapError {
    fn from(err: hex::FromHexError) -> Self {
        SwapError::Message(format!("malformed hex: {err}"))
    }
}
