//! Market-coupled distributed control core.
//!
//! A double-auction clearing engine (`auction`) plus the device-side
//! bidders that submit into it: a transactive thermostat controller
//! (`controller`), a piecewise-linear generator bidder (`generator`), and
//! a supervisory collector for primary frequency control (`collector`).

pub mod auction;
pub mod bid;
pub mod clock;
pub mod collector;
pub mod config;
pub mod controller;
pub mod curve;
pub mod error;
pub mod frame;
pub mod generator;
pub mod latency;
pub mod log;
pub mod statistic;

pub use auction::{AuctionEngine, CappedBidder, ReferenceLoadEstimate, SharedAuctionEngine};
pub use bid::{Bid, BidKey, BidState, Side, SubmitOutcome};
pub use clock::{Phase, SimClock, TimeStep};
pub use collector::SupervisoryCollector;
pub use config::{ControllerConfig, GeneratorConfig, MarketConfig, SupervisoryConfig};
pub use controller::{DoubleRampController, RampController};
pub use error::{MarketError, MarketResult};
pub use frame::MarketFrame;
pub use generator::GeneratorBidder;
