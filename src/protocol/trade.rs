//! Trade entity and per-party state machines (spec.md §3, §4.7).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A trade's static terms, persisted in slot `1_offer` and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub offer_currency_hash: String,
    pub offer_currency_quantity: u64,
    pub ask_currency_hash: String,
    pub ask_currency_quantity: u64,
}

/// Party A's view, OFFERED → ACCEPTED → CONFIRMED → A_SENT → A_CLAIMED,
/// with a recovery branch from A_SENT to A_REFUNDED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateA {
    Offered,
    Accepted,
    Confirmed,
    Sent,
    Claimed,
    Refunded,
}

/// Party B's view, NEW → OFFER_RECEIVED → ACCEPTED → CONFIRMED → B_SENT →
/// B_CLAIMED, with a recovery branch from B_SENT to B_REFUNDED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateB {
    New,
    OfferReceived,
    Accepted,
    Confirmed,
    Sent,
    Claimed,
    Refunded,
}

/// The write-once slot names from spec.md §4.6, in persisted order.
pub mod slots {
    pub const OFFER: &str = "1_offer";
    pub const PRIVATE_KEY_A: &str = "1_private_key";
    pub const OFFER_RECEIVED: &str = "2_offer";
    pub const ACCEPTANCE: &str = "2_acceptance";
    pub const SECRET: &str = "2_secret";
    pub const PRIVATE_KEY_B: &str = "2_private_key";
    pub const TX1: &str = "2_tx1";
    pub const ACCEPTANCE_RECEIVED: &str = "3_acceptance";
    pub const TX3: &str = "3_tx3";
    pub const CONFIRMATION: &str = "3_confirmation";
    pub const CONFIRMATION_RECEIVED: &str = "4_confirmation";
    pub const TX2: &str = "4_tx2";
    pub const COINS_SENT: &str = "4_coins_sent";
    pub const SEND_NOTIFICATION: &str = "5_send_notification";
    pub const TX4: &str = "5_tx4";
    pub const CLAIM_COMPLETE_B: &str = "6_complete";
    pub const CLAIM_COMPLETE_A: &str = "7_complete";
}
