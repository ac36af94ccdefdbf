use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch one series and write it as CSV
    Fetch {
        /// Provider symbol (e.g. "AAPL", "^GSPC", "EURUSD=X")
        #[arg(long)]
        symbol: String,

        /// Bar interval: 1m, 5m, 15m, 30m, 90m, 1h, 1d, 1wk, 1mo
        #[arg(long, default_value = "1d")]
        interval: String,

        /// Lookback window, "<days>d" or "max"
        #[arg(long, default_value = "max")]
        lookback: String,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write cleaned bars instead of the raw provider table
        #[arg(long)]
        clean: bool,

        /// Keep unadjusted prices
        #[arg(long)]
        no_adjust: bool,
    },
}
