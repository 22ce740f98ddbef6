use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use currency_trader::config::{ReplayConfig, StrategyConfig};
use currency_trader::replay;

#[derive(Parser, Debug)]
#[command(name = "currency-trader")]
#[command(about = "Swing-driven trend follower for currency pairs")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded quote/trade feed through the strategy
    Replay {
        /// Feed CSV (timestamp,kind,bid,ask,volume), optionally .zst
        #[arg(short, long, env = "CURRENCY_TRADER_FEED")]
        feed: PathBuf,

        /// Strategy configuration JSON
        #[arg(short, long, env = "CURRENCY_TRADER_CONFIG")]
        config: Option<PathBuf>,

        /// Write a JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Include indicator series in the JSON report
        #[arg(long)]
        series: bool,

        /// Instrument name, overrides the config file
        #[arg(short, long, env = "CURRENCY_TRADER_INSTRUMENT")]
        instrument: Option<String>,

        /// Price interval reported by the simulated tracker
        #[arg(long, env = "CURRENCY_TRADER_TICK_SIZE", default_value = "0.00001")]
        tick_size: f64,
    },

    /// Print the default strategy configuration as JSON
    DefaultConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let directive = if args.verbose { "currency_trader=debug" } else { "currency_trader=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    match args.command {
        Commands::Replay { feed, config, output, series, instrument, tick_size } => {
            let mut strategy_config = match &config {
                Some(path) => StrategyConfig::from_json_file(path)?,
                None => StrategyConfig::default(),
            };
            if let Some(instrument) = instrument {
                strategy_config.instrument = instrument;
            }
            let replay_config = ReplayConfig { tick_size, ..Default::default() };

            info!("Instrument: {}", strategy_config.instrument);
            info!("Feed: {:?}", feed);

            let outcome = replay::run_replay(feed, strategy_config, replay_config, series)
                .await
                .context("Replay failed")?;

            replay::print_summary(&outcome);
            if let Some(path) = output {
                replay::write_report(&outcome, &path)?;
            }
        }
        Commands::DefaultConfig => {
            let json = serde_json::to_string_pretty(&StrategyConfig::default())?;
            println!("{}", json);
        }
    }

    Ok(())
}
