//! Scenario runner CLI
//!
//! Loads a TOML scenario describing a market plus its controllers and
//! generators, runs it for a fixed number of periods, and prints each
//! cleared frame as it becomes current.
//!
//! ```bash
//! cargo run --bin market-core-demo -- --scenario scenario.toml
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;

use market_core::bid::{BidState, NEW_BID};
use market_core::clock::{unix_epoch, wall_clock};
use market_core::config::{ControllerConfig, GeneratorConfig, MarketConfig};
use market_core::controller::{DeviceReading, RampController};
use market_core::generator::GeneratorBidder;
use market_core::log::{CurveLog, TransactionLog};
use market_core::AuctionEngine;

#[derive(Parser, Debug)]
#[command(name = "market-core-demo")]
#[command(about = "Run a double-auction market scenario to completion")]
struct Cli {
    /// Path to the scenario TOML file
    #[arg(short, long)]
    scenario: PathBuf,

    /// Number of clearing periods to run, overriding the scenario file
    #[arg(long)]
    steps: Option<u32>,

    /// Directory to write transaction/curve logs into, if set
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Random seed driving the demo thermostat walk
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn default_steps() -> u32 {
    12
}

#[derive(Debug, Deserialize)]
struct Scenario {
    market: MarketConfig,
    #[serde(default)]
    controllers: Vec<ControllerConfig>,
    #[serde(default)]
    generators: Vec<GeneratorConfig>,
    #[serde(default = "default_steps")]
    steps: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let text = fs::read_to_string(&cli.scenario).with_context(|| format!("reading scenario file {}", cli.scenario.display()))?;
    let scenario: Scenario = toml::from_str(&text).with_context(|| format!("parsing scenario file {}", cli.scenario.display()))?;
    let steps = cli.steps.unwrap_or(scenario.steps);

    let property_names: Vec<String> = Vec::new();
    let mut market = AuctionEngine::new(scenario.market.clone(), 0, &property_names);

    if let Some(dir) = &cli.log_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;
        market.attach_transaction_log(TransactionLog::new(dir.join("transactions.csv"), 100_000));
        market.attach_curve_log(CurveLog::new(dir.join("curves.csv"), 100_000, true));
    }

    let mut controllers: Vec<RampController> = scenario.controllers.into_iter().map(RampController::new).collect();
    let mut generators: Vec<GeneratorBidder> = scenario
        .generators
        .into_iter()
        .map(|cfg| GeneratorBidder::new(cfg, scenario.market.period, scenario.market.latency, 0))
        .collect::<market_core::MarketResult<Vec<_>>>()?;

    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);
    let mut temperature = 72.0_f64;

    for step in 0..steps {
        let now = (step as i64) * scenario.market.period;

        temperature += rng.gen_range(-0.5..0.5);
        for ctrl in controllers.iter_mut() {
            let reading = DeviceReading { temperature, demand_kw: 3.0, state: BidState::Unknown };
            if let Some(bid) = ctrl.compute_bid(reading, 0.0, scenario.market.init_stdev, scenario.market.price_cap, scenario.market.bid_offset, 1.0) {
                let key = ctrl.bid_key(market.market_id());
                let outcome = market.submit(now, "controller", bid.quantity, bid.price, key, bid.state);
                ctrl.record_submission(market.market_id(), outcome.as_key());
            }
        }

        for gen in generators.iter_mut() {
            let last_price = market.current_frame().map(|f| f.clearing_price).unwrap_or(0.0);
            for bid in gen.advance(now, market.market_id(), last_price) {
                market.submit(now, &bid.bidder_id, bid.quantity, bid.price, NEW_BID, bid.state);
            }
        }

        market.clear(now)?;
        market.pop_ready(now);

        if let Some(frame) = market.current_frame() {
            let wall = wall_clock(unix_epoch(), now);
            println!(
                "{} (t={:>6}) market_id={:>4} price={:>8.3} quantity={:>8.3} type={:?}",
                wall.to_rfc3339(),
                now,
                frame.market_id,
                frame.clearing_price,
                frame.clearing_quantity,
                frame.clearing_type
            );
        }

        for ctrl in controllers.iter_mut() {
            if let Some(frame) = market.current_frame() {
                ctrl.on_market_advance(frame.market_id, frame.clearing_price, 0.0, scenario.market.init_stdev, scenario.market.bid_offset);
            }
        }
        for gen in generators.iter_mut() {
            if let Some(frame) = market.current_frame() {
                let (output, mismatch) = gen.realize_output(frame.clearing_price);
                if mismatch {
                    tracing::warn!(output, "generator state disagreed with expectation at clearing");
                }
            }
        }
    }

    Ok(())
}
