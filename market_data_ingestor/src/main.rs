use std::{
    error::Error,
    fs::File,
    io::{self, Write},
};

use clap::Parser;
use market_data_ingestor::{
    clean::{clean, default_timestamp_column},
    cli::commands::{Cli, Commands},
    models::{
        request_params::{FetchRequest, Lookback},
        timeframe::TimeFrame,
    },
    providers::{DataProvider, FetchResult, yahoo_chart::YahooChartProvider},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            symbol,
            interval,
            lookback,
            out,
            clean: want_clean,
            no_adjust,
        } => {
            let timeframe: TimeFrame = interval.parse()?;
            let lookback: Lookback = lookback.parse()?;
            let provider = YahooChartProvider::new()?.auto_adjust(!no_adjust);
            let request = FetchRequest::new(symbol.trim().to_uppercase(), timeframe, lookback);

            let table = match provider.fetch(&request).await? {
                FetchResult::Data(table) => table,
                FetchResult::NoData => {
                    tracing::warn!(symbol = %request.symbol, interval = %timeframe, "no data returned");
                    return Ok(());
                }
            };

            let writer: Box<dyn Write> = match &out {
                Some(path) => Box::new(File::create(path)?),
                None => Box::new(io::stdout().lock()),
            };

            if want_clean {
                let cleaned = clean(table, &request.symbol, default_timestamp_column(&timeframe));
                if !cleaned.report.is_clean() {
                    tracing::warn!(report = ?cleaned.report, "table needed cleaning");
                }
                let mut wtr = csv::Writer::from_writer(writer);
                for bar in &cleaned.bars {
                    wtr.serialize(bar)?;
                }
                wtr.flush()?;
                eprintln!("SUMMARY: {} bars", cleaned.bars.len());
            } else {
                let rows = table.len();
                table.to_csv_writer(writer)?;
                eprintln!("SUMMARY: {rows} rows");
            }

            if let Some(path) = out {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}
