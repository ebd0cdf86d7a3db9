//! Generator bidder (§4.4): piecewise-linear supply curve with
//! startup/shutdown amortisation, minimum runtime/downtime, and an annual
//! runtime budget.

use crate::bid::{Bid, BidState};
use crate::clock::TimeStep;
use crate::config::GeneratorConfig;
use crate::error::{MarketError, MarketResult};
use crate::latency::ring_length;

/// One segment of a parsed generator supply curve (§3 "Generator Curve").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub power_start: f64,
    pub power_stop: f64,
    pub price: f64,
}

impl Segment {
    pub fn delta(&self) -> f64 {
        self.power_stop - self.power_start
    }
}

/// A parsed piecewise-linear supply curve, in strictly increasing power
/// order (§3, §8 "Generator monotone curve").
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorCurve {
    pub segments: Vec<Segment>,
}

impl GeneratorCurve {
    /// Parse `"q1 p1 q2 p2 ..."` (§6 "Generator bid-curve text"): monotone-
    /// increasing power breakpoints paired with their prices. If the last
    /// breakpoint is below `rated_capacity`, an implicit final segment to
    /// rated capacity is appended at the last price; if a breakpoint
    /// exceeds rated capacity the parse fails.
    pub fn parse(text: &str, rated_capacity: f64) -> MarketResult<Self> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() || tokens.len() % 2 != 0 {
            return Err(MarketError::parse("generator bid curve", "expected an even number of 'quantity price' tokens"));
        }
        let mut segments = Vec::with_capacity(tokens.len() / 2);
        let mut prev_power = 0.0;
        for pair in tokens.chunks(2) {
            let power: f64 = pair[0]
                .parse()
                .map_err(|_| MarketError::parse("generator bid curve", format!("'{}' is not a valid quantity", pair[0])))?;
            let price: f64 = pair[1]
                .parse()
                .map_err(|_| MarketError::parse("generator bid curve", format!("'{}' is not a valid price", pair[1])))?;
            if power < prev_power {
                return Err(MarketError::parse("generator bid curve", "power breakpoints must be monotone increasing"));
            }
            if power > rated_capacity {
                return Err(MarketError::parse("generator bid curve", "power breakpoint exceeds rated capacity"));
            }
            segments.push(Segment { power_start: prev_power, power_stop: power, price });
            prev_power = power;
        }
        if prev_power < rated_capacity {
            let last_price = segments.last().map(|s| s.price).unwrap_or(0.0);
            segments.push(Segment { power_start: prev_power, power_stop: rated_capacity, price: last_price });
        }
        Ok(Self { segments })
    }

    pub fn is_monotone(&self) -> bool {
        self.segments.windows(2).all(|w| w[0].power_stop == w[1].power_start && w[0].price < w[1].price)
    }
}

/// What the generator expects to be doing once this bid's market clears
/// (§4.4 steps 1-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedState {
    Off,
    Startup,
    Active,
}

/// Realized running state, derived from what actually cleared (§4.4 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Off,
    Active,
}

#[derive(Debug, Clone)]
struct CurveSlot {
    curve: GeneratorCurve,
    expected_state: ExpectedState,
    valid: bool,
}

/// Cumulative-runtime budget against a configured annual limit, reset on
/// a rollover period (§2, §10.5 "Generator annual runtime budget").
#[derive(Debug, Clone)]
pub struct RuntimeBudget {
    limit_seconds: Option<i64>,
    rollover_seconds: i64,
    accumulated_seconds: i64,
    window_start: TimeStep,
}

impl RuntimeBudget {
    pub fn new(limit_seconds: Option<i64>, rollover_seconds: i64, start: TimeStep) -> Self {
        Self {
            limit_seconds,
            rollover_seconds,
            accumulated_seconds: 0,
            window_start: start,
        }
    }

    pub fn record_running(&mut self, now: TimeStep, period: i64) {
        if now - self.window_start >= self.rollover_seconds {
            self.accumulated_seconds = 0;
            self.window_start = now;
        }
        self.accumulated_seconds += period;
    }

    pub fn exhausted(&self) -> bool {
        matches!(self.limit_seconds, Some(limit) if self.accumulated_seconds >= limit)
    }
}

/// Piecewise-linear supply-curve generator bidder (§4.4).
pub struct GeneratorBidder {
    config: GeneratorConfig,
    market_period: i64,
    base_curve: GeneratorCurve,
    slots: Vec<CurveSlot>,
    write_head: usize,
    read_head: usize,
    last_market_id: Option<u64>,
    amortisation_scalar: f64,
    shutdown_cost_remaining: f64,
    runs_completed: u32,
    min_runtime_periods: u32,
    downtime_until: Option<TimeStep>,
    gen_state: RunState,
    current_power_output: f64,
    previous_power_output: f64,
    runtime_budget: RuntimeBudget,
}

impl GeneratorBidder {
    pub fn new(config: GeneratorConfig, market_period: i64, latency: i64, start: TimeStep) -> MarketResult<Self> {
        let base_curve = GeneratorCurve::parse(&config.bid_curve, config.rated_capacity)?;
        let len = ring_length(latency, market_period);
        let slots = vec![
            CurveSlot {
                curve: base_curve.clone(),
                expected_state: ExpectedState::Off,
                valid: true,
            };
            len
        ];
        let lag = if market_period > 0 { ((latency + market_period - 1) / market_period).max(0) as usize } else { 0 };
        let write_head = 0usize;
        let read_head = (write_head + len - (lag % len.max(1))) % len.max(1);
        let min_runtime_periods = if market_period > 0 { (config.min_runtime_periods).max(0) } else { 0 };
        let runtime_budget = RuntimeBudget::new(config.runtime_limit_seconds, config.runtime_rollover_seconds, start);

        Ok(Self {
            market_period,
            base_curve,
            slots,
            write_head,
            read_head,
            last_market_id: None,
            amortisation_scalar: (-config.amortisation_rate * market_period as f64).exp(),
            shutdown_cost_remaining: 0.0,
            runs_completed: 1,
            min_runtime_periods,
            downtime_until: None,
            gen_state: RunState::Off,
            current_power_output: 0.0,
            previous_power_output: 0.0,
            runtime_budget,
            config,
        })
    }

    pub fn set_bid_curve(&mut self, text: &str) -> MarketResult<()> {
        self.base_curve = GeneratorCurve::parse(text, self.config.rated_capacity)?;
        Ok(())
    }

    /// §4.4 steps 1-4: reconcile the previous write-slot outcome, advance
    /// the ring, overlay startup/shutdown costs on a fresh copy of the
    /// base curve, and return the per-segment bids to submit.
    pub fn advance(&mut self, now: TimeStep, market_id: u64, clearing_price: f64) -> Vec<Bid> {
        if self.last_market_id == Some(market_id) {
            return Vec::new();
        }
        self.last_market_id = Some(market_id);

        let prior_expected = self.slots[self.write_head].expected_state;
        let cleared = self.slots[self.write_head]
            .curve
            .segments
            .first()
            .map(|s| clearing_price >= s.price)
            .unwrap_or(false);

        let prev_bid_state = if cleared {
            if prior_expected == ExpectedState::Startup {
                self.amortisation_scalar = (-self.config.amortisation_rate * self.market_period as f64).exp();
            }
            self.runs_completed = self.runs_completed.saturating_add(1);
            if self.config.runtime_limit_seconds.is_some() {
                self.runtime_budget.record_running(now, self.market_period);
            }
            ExpectedState::Active
        } else if prior_expected == ExpectedState::Active {
            self.downtime_until = Some(now + self.config.min_downtime_seconds);
            ExpectedState::Off
        } else {
            ExpectedState::Off
        };

        let len = self.slots.len();
        self.write_head = (self.write_head + 1) % len;
        self.read_head = (self.read_head + 1) % len;

        let mut next_curve = self.base_curve.clone();
        let valid;
        let next_expected;

        match prev_bid_state {
            ExpectedState::Off => {
                let downtime_met = self.downtime_until.map(|t| now >= t).unwrap_or(true);
                let budget_ok = !self.runtime_budget.exhausted();
                if downtime_met && budget_ok {
                    self.min_runtime_periods = self.config.min_runtime_periods;
                    if self.min_runtime_periods == 0 {
                        self.shutdown_cost_remaining = 0.0;
                        for seg in next_curve.segments.iter_mut() {
                            seg.price += self.config.startup_cost;
                        }
                    } else {
                        self.shutdown_cost_remaining = self.config.shutdown_cost;
                        for seg in next_curve.segments.iter_mut() {
                            seg.price += self.config.startup_cost + self.config.shutdown_cost;
                        }
                    }
                    next_expected = ExpectedState::Startup;
                    self.runs_completed = 1;
                    valid = true;
                } else {
                    let cap = 9999.0_f64.max(seg_max_price(&next_curve));
                    for seg in next_curve.segments.iter_mut() {
                        seg.price = cap + 4.0;
                    }
                    next_expected = ExpectedState::Off;
                    valid = false;
                }
            }
            ExpectedState::Active => {
                let shutdown_temp = if self.runs_completed < self.min_runtime_periods {
                    self.shutdown_cost_remaining *= self.amortisation_scalar;
                    if self.shutdown_cost_remaining > self.config.shutdown_cost {
                        self.config.shutdown_cost
                    } else {
                        self.shutdown_cost_remaining
                    }
                } else if self.runs_completed == self.min_runtime_periods {
                    let remaining = self.shutdown_cost_remaining;
                    self.shutdown_cost_remaining = 0.0;
                    remaining
                } else {
                    0.0
                };
                for seg in next_curve.segments.iter_mut() {
                    seg.price -= shutdown_temp;
                }
                next_expected = ExpectedState::Active;
                valid = true;
            }
            ExpectedState::Startup => unreachable!("prev_bid_state is only ever Off or Active"),
        }

        self.slots[self.write_head] = CurveSlot { curve: next_curve.clone(), expected_state: next_expected, valid };

        if !valid {
            return Vec::new();
        }
        next_curve
            .segments
            .iter()
            .map(|seg| Bid::new(self.config.name.clone(), seg.delta(), seg.price, BidState::Unknown))
            .collect()
    }

    /// §4.4 step 5: realize output power from the slot one latency behind
    /// `write_head`, and detect whether the realized state disagrees with
    /// what was expected when that bid was placed (logged, not fatal).
    pub fn realize_output(&mut self, clearing_price: f64) -> (f64, bool) {
        let slot = &self.slots[self.read_head];
        let output = if slot.valid {
            slot.curve.segments.iter().filter(|s| s.price <= clearing_price).map(|s| s.delta()).sum()
        } else {
            0.0
        };
        self.gen_state = if output > 0.0 { RunState::Active } else { RunState::Off };

        let expected_active = matches!(slot.expected_state, ExpectedState::Active | ExpectedState::Startup);
        let realized_active = self.gen_state == RunState::Active;
        let disagreement = expected_active != realized_active;

        self.previous_power_output = self.current_power_output;
        self.current_power_output = output;
        (output, disagreement)
    }

    /// §4.4 step 6: incremental power to add to the parent node's
    /// accumulator (`-output/phases`, net of the previous cycle's
    /// contribution so repeated calls don't accumulate).
    pub fn load_delta(&self) -> f64 {
        let phases = if self.config.phases == 0.0 { 1.0 } else { self.config.phases };
        -(self.current_power_output - self.previous_power_output) / phases
    }

    pub fn capacity_factor(&self) -> f64 {
        if self.config.rated_capacity == 0.0 {
            0.0
        } else {
            self.current_power_output / self.config.rated_capacity
        }
    }

    pub fn run_state(&self) -> RunState {
        self.gen_state
    }
}

fn seg_max_price(curve: &GeneratorCurve) -> f64 {
    curve.segments.iter().map(|s| s.price).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_appends_implicit_final_segment() {
        let curve = GeneratorCurve::parse("5 20 10 40", 20.0).unwrap();
        assert_eq!(curve.segments.len(), 3);
        assert_eq!(curve.segments[0].power_start, 0.0);
        assert_eq!(curve.segments[0].power_stop, 5.0);
        assert_eq!(curve.segments[0].price, 20.0);
        assert_eq!(curve.segments[1].power_start, 5.0);
        assert_eq!(curve.segments[1].power_stop, 10.0);
        assert_eq!(curve.segments[1].price, 40.0);
        assert_eq!(curve.segments[2].power_start, 10.0);
        assert_eq!(curve.segments[2].power_stop, 20.0);
        assert_eq!(curve.segments[2].price, 40.0);
        assert!(curve.is_monotone());
    }

    #[test]
    fn parse_rejects_breakpoint_above_rated_capacity() {
        assert!(GeneratorCurve::parse("5 20 15 40", 10.0).is_err());
    }

    #[test]
    fn parse_rejects_odd_token_count() {
        assert!(GeneratorCurve::parse("5 20 40", 10.0).is_err());
    }

    fn gen_config() -> GeneratorConfig {
        GeneratorConfig {
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
        }
    }

    #[test]
    fn startup_bid_applies_both_cost_overlays() {
        let mut gen = GeneratorBidder::new(gen_config(), 300, 0, 0).unwrap();
        let bids = gen.advance(0, 0, 0.0);
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].price, 20.0 + 150.0);
        assert_eq!(bids[1].price, 40.0 + 150.0);
    }

    #[test]
    fn downtime_not_met_invalidates_bid_period() {
        let mut config = gen_config();
        config.min_downtime_seconds = 600;
        let mut gen = GeneratorBidder::new(config, 300, 0, 0).unwrap();
        gen.downtime_until = Some(9999);
        let bids = gen.advance(0, 0, 0.0);
        assert!(bids.is_empty());
    }

    #[test]
    fn realize_output_sums_cleared_segments() {
        let mut gen = GeneratorBidder::new(gen_config(), 300, 0, 0).unwrap();
        gen.advance(0, 0, 0.0);
        let (output, _) = gen.realize_output(25.0);
        assert_eq!(output, 5.0);
        assert!(gen.capacity_factor() > 0.0);
    }

    #[test]
    fn load_delta_nets_against_previous_cycle() {
        let mut gen = GeneratorBidder::new(gen_config(), 300, 0, 0).unwrap();
        gen.advance(0, 0, 0.0);
        gen.realize_output(25.0);
        let first_delta = gen.load_delta();
        assert_eq!(first_delta, -5.0 / 3.0);
        // same output again: no further delta
        gen.previous_power_output = gen.current_power_output;
        assert_eq!(gen.load_delta(), 0.0);
    }
}
