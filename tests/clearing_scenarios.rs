//! End-to-end scenarios driving the public `market_core` API as an
//! external consumer would, one per concrete example worked through
//! during design.

use market_core::bid::{BidState, NEW_BID};
use market_core::config::{GeneratorConfig, MarketConfig};
use market_core::frame::ClearingType;
use market_core::generator::GeneratorBidder;
use market_core::AuctionEngine;

fn market(overrides: MarketConfig) -> AuctionEngine {
    AuctionEngine::new(overrides, 0, &[])
}

#[test]
fn exact_match_clears_at_common_price() {
    let mut mkt = market(MarketConfig { warmup_seconds: 0, ..Default::default() });
    mkt.submit(0, "seller", 100.0, 30.0, NEW_BID, BidState::Unknown);
    mkt.submit(0, "buyer", -100.0, 30.0, NEW_BID, BidState::Unknown);
    mkt.clear(0).unwrap();
    mkt.pop_ready(0);
    let frame = mkt.current_frame().unwrap();
    assert_eq!(frame.clearing_price, 30.0);
    assert_eq!(frame.clearing_quantity, 100.0);
    assert_eq!(frame.clearing_type, ClearingType::Exact);
}

#[test]
fn price_split_stalemate_applies_default_clearing_scalar() {
    let mut mkt = market(MarketConfig { warmup_seconds: 0, ..Default::default() });
    mkt.submit(0, "seller", 100.0, 25.0, NEW_BID, BidState::Unknown);
    mkt.submit(0, "buyer", -100.0, 35.0, NEW_BID, BidState::Unknown);
    mkt.clear(0).unwrap();
    mkt.pop_ready(0);
    let frame = mkt.current_frame().unwrap();
    assert_eq!(frame.clearing_quantity, 100.0);
    assert!((frame.clearing_price - 30.0).abs() < 1e-9);
    assert_eq!(frame.clearing_type, ClearingType::Price);
}

#[test]
fn demand_exceeds_supply_reports_marginal_buyer() {
    let mut mkt = market(MarketConfig { warmup_seconds: 0, ..Default::default() });
    mkt.submit(0, "seller", 50.0, 20.0, NEW_BID, BidState::Unknown);
    mkt.submit(0, "buyer", -100.0, 40.0, NEW_BID, BidState::Unknown);
    mkt.clear(0).unwrap();
    mkt.pop_ready(0);
    let frame = mkt.current_frame().unwrap();
    assert_eq!(frame.clearing_quantity, 50.0);
    assert_eq!(frame.clearing_price, 40.0);
    assert_eq!(frame.clearing_type, ClearingType::MarginalBuyer);
    assert_eq!(frame.marginal_quantity, 50.0);
    assert_eq!(frame.buyer_total_quantity, 100.0);
}

#[test]
fn latency_of_two_periods_delays_current_frame_by_two_clears() {
    let mut mkt = market(MarketConfig { period: 300, latency: 600, warmup_seconds: 0, ..Default::default() });

    mkt.submit(0, "seller", 10.0, 10.0, NEW_BID, BidState::Unknown);
    mkt.submit(0, "buyer", -10.0, 10.0, NEW_BID, BidState::Unknown);
    mkt.clear(0).unwrap();
    mkt.pop_ready(0);
    assert!(mkt.current_frame().is_none());

    mkt.submit(300, "seller", 10.0, 10.0, NEW_BID, BidState::Unknown);
    mkt.submit(300, "buyer", -10.0, 10.0, NEW_BID, BidState::Unknown);
    mkt.clear(300).unwrap();
    mkt.pop_ready(300);
    assert!(mkt.current_frame().is_none());

    mkt.pop_ready(600);
    let frame = mkt.current_frame().unwrap();
    assert_eq!(frame.market_id, 0);
    assert_eq!(frame.start_time, 600);
    assert_eq!(frame.end_time, 900);
}

#[test]
fn warmup_window_drops_demand_and_returns_rejected_key() {
    let mut mkt = market(MarketConfig { period: 300, ..Default::default() });
    let outcome = mkt.submit(600, "buyer", -50.0, 10.0, NEW_BID, BidState::Unknown);
    assert_eq!(outcome.as_key(), -1);

    mkt.clear(600).unwrap();
    mkt.pop_ready(600);
    let frame = mkt.current_frame().unwrap();
    assert_eq!(frame.clearing_quantity, 0.0);
}

#[test]
fn generator_startup_bid_layers_both_cost_overlays() {
    let config = GeneratorConfig {
        name: "gen1".into(),
        rated_capacity: 10.0,
        bid_curve: "5 20 10 40".into(),
        startup_cost: 100.0,
        shutdown_cost: 50.0,
        amortisation_rate: 0.0001,
        min_runtime_periods: 3,
        min_downtime_seconds: 0,
        phases: 3.0,
        runtime_limit_seconds: None,
        runtime_rollover_seconds: 365 * 24 * 3600,
    };
    let mut gen = GeneratorBidder::new(config, 300, 0, 0).unwrap();

    let bids = gen.advance(0, 0, 0.0);
    assert_eq!(bids.len(), 2);
    assert_eq!(bids[0].quantity, 5.0);
    assert_eq!(bids[0].price, 20.0 + 150.0);
    assert_eq!(bids[1].quantity, 5.0);
    assert_eq!(bids[1].price, 40.0 + 150.0);

    let mut mkt = market(MarketConfig { period: 300, warmup_seconds: 0, ..Default::default() });
    for bid in &bids {
        mkt.submit(0, &bid.bidder_id, bid.quantity, bid.price, NEW_BID, bid.state);
    }
    mkt.submit(0, "load", -10.0, 9999.0, NEW_BID, BidState::Unknown);
    mkt.clear(0).unwrap();
    mkt.pop_ready(0);
    let frame = mkt.current_frame().unwrap();
    assert!(frame.clearing_price >= 20.0 + 150.0);

    let (output, _mismatch) = gen.realize_output(frame.clearing_price);
    assert!(output > 0.0);
}
