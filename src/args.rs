use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Trustless atomic swap engine", long_about = None)]
pub struct Args {
    /// Path to the swap-engine TOML configuration file.
    #[arg(short, long, default_value = "swap.toml")]
    pub config: PathBuf,

    /// Root directory of the trade store.
    #[arg(long, default_value = "./trades")]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Step 1 (A): create an offer and write the OFFER envelope to a file.
    Offer {
        #[arg(long)]
        trade_id: Uuid,
        #[arg(long)]
        offer_currency: String,
        #[arg(long)]
        offer_quantity: u64,
        #[arg(long)]
        ask_currency: String,
        #[arg(long)]
        ask_quantity: u64,
        /// Where to write the OFFER JSON envelope.
        #[arg(long)]
        out: PathBuf,
    },

    /// Step 1 receipt (B): process an inbound OFFER file, emit ACCEPT.
    ReceiveOffer {
        #[arg(long)]
        offer_file: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Step 2 receipt (A): process an inbound ACCEPT file, emit CONFIRM.
    ReceiveAccept {
        #[arg(long)]
        accept_file: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Step 3 receipt (B): process an inbound CONFIRM file, emit SEND.
    ReceiveConfirm {
        #[arg(long)]
        confirm_file: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Step 4 receipt (A): process an inbound SEND file, broadcast TX3.
    ReceiveSend {
        #[arg(long)]
        send_file: PathBuf,
    },

    /// "(B claims)": broadcast a ClaimTx spending TX3, revealing the secret.
    ClaimAsB {
        #[arg(long)]
        trade_id: Uuid,
    },

    /// "(A receives)": watch TX3's spend, extract the secret, claim TX1.
    ClaimAsA {
        #[arg(long)]
        trade_id: Uuid,
    },

    /// Recovery: broadcast a pre-signed refund once its lock time elapses.
    Refund {
        #[arg(long)]
        trade_id: Uuid,
        /// Which refund to broadcast: "tx2" (B's recovery) or "tx4" (A's).
        #[arg(long)]
        which: String,
    },
}
