//! Transactive controller (§4.3): translates a thermostat's monitored
//! state into a price-quantity bid, and a cleared price back into a local
//! setpoint. Two modes share the shift-direction/predictive-bidding math:
//! [`RampController`] (§4.3.1, single setpoint) and [`DoubleRampController`]
//! (§4.3.2, separate heating/cooling setpoints).

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::bid::{BidKey, BidState, NEW_BID};
use crate::clock::TimeStep;
use crate::config::{ControllerConfig, MarginMode, ResolveMode};
use crate::error::{MarketError, MarketResult};

/// Thermostat mode deduced from the collaborator's heat/cool/aux booleans
/// (§4.3.2 "state detection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatMode {
    Off,
    Heat,
    Cool,
}

/// Monitored quantities the controller reads from its (out-of-scope)
/// thermal collaborator each bottom-up pass (§3 "Controller reads
/// monitored quantities... writes setpoints").
#[derive(Debug, Clone, Copy)]
pub struct DeviceReading {
    pub temperature: f64,
    /// kW demand if the device were to run; zero suppresses bidding.
    pub demand_kw: f64,
    pub state: BidState,
}

/// What the controller wants to bid this pass, in the market's native
/// quantity unit (already converted from kW by the caller per §4.3.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BidRequest {
    /// Negative: this is always a demand-side bid.
    pub quantity: f64,
    pub price: f64,
    pub state: BidState,
}

/// Override signal communicated back to the device collaborator (§4.3.1
/// step 3, §4.3.2 override block). `Normal` means "no override opinion".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    Run,
    DoNotRun,
    Normal,
}

fn shift_direction(dir: f64, clearing_price: f64, last_price: f64) -> f64 {
    if (dir > 0.0 && clearing_price < last_price) || (dir < 0.0 && clearing_price > last_price) {
        -1.0
    } else if (dir > 0.0 && clearing_price >= last_price) || (dir < 0.0 && clearing_price <= last_price) {
        1.0
    } else {
        0.0
    }
}

/// Single-setpoint transactive controller (§4.3.1).
pub struct RampController {
    config: ControllerConfig,
    /// Sign of `ramp_high*range_high - ramp_low*range_low`; selects which
    /// way "outside the operational band" maps to "must run" vs "must not".
    dir: f64,
    last_market_id: Option<u64>,
    last_bid_key: BidKey,
    last_price: f64,
    last_quantity: f64,
    setpoint: f64,
}

impl RampController {
    pub fn new(config: ControllerConfig) -> Self {
        let high = config.ramp_high * config.range_high;
        let low = config.ramp_low * config.range_low;
        let dir = if high > low {
            1.0
        } else if high < low {
            -1.0
        } else {
            0.0
        };
        let setpoint = config.base_setpoint;
        Self {
            dir,
            last_market_id: None,
            last_bid_key: NEW_BID,
            last_price: 0.0,
            last_quantity: 0.0,
            setpoint,
            config,
        }
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    fn min_set(&self) -> f64 {
        self.config.base_setpoint + self.config.range_low * self.config.slider
    }

    fn max_set(&self) -> f64 {
        self.config.base_setpoint + self.config.range_high * self.config.slider
    }

    /// §4.3.1 steps 1-3. Returns `None` if the market hasn't advanced past
    /// what this controller last observed (nothing to recompute).
    pub fn on_market_advance(&mut self, market_id: u64, clearing_price: f64, mean: f64, stdev: f64, bid_offset: f64) -> Option<Override> {
        if self.last_market_id == Some(market_id) {
            return None;
        }
        self.last_market_id = Some(market_id);
        self.last_bid_key = NEW_BID;

        let shift = if self.config.use_predictive_bidding {
            shift_direction(self.dir, clearing_price, self.last_price)
        } else {
            0.0
        };
        let deadband_shift = if self.config.use_predictive_bidding { self.config.deadband * 0.5 } else { 0.0 };

        let new_setpoint = if stdev.abs() < bid_offset {
            self.config.base_setpoint + deadband_shift * shift
        } else if clearing_price < mean && self.config.range_low != 0.0 {
            self.config.base_setpoint + (clearing_price - mean) * self.config.range_low.abs() / (self.config.ramp_low * stdev) + deadband_shift * shift
        } else if clearing_price > mean && self.config.range_high != 0.0 {
            self.config.base_setpoint + (clearing_price - mean) * self.config.range_high.abs() / (self.config.ramp_high * stdev) + deadband_shift * shift
        } else {
            self.config.base_setpoint + deadband_shift * shift
        };
        self.setpoint = new_setpoint.clamp(self.min_set(), self.max_set());

        if self.config.use_override {
            Some(if clearing_price <= self.last_price { Override::Run } else { Override::DoNotRun })
        } else {
            Some(Override::Normal)
        }
    }

    /// §4.3.1 bottom-up bid computation. `unit_scale` converts kW into the
    /// market's configured quantity unit (1.0 if the market is in kW).
    pub fn compute_bid(&mut self, reading: DeviceReading, mean: f64, stdev: f64, price_cap: f64, bid_offset: f64, unit_scale: f64) -> Option<BidRequest> {
        if reading.demand_kw == 0.0 {
            self.last_price = 0.0;
            self.last_quantity = 0.0;
            return None;
        }

        let deadband_shift = if self.config.use_predictive_bidding { self.config.deadband * 0.5 } else { 0.0 };
        let running = reading.state == BidState::On;
        let (mut lo, mut hi) = (self.min_set(), self.max_set());
        if running {
            lo -= deadband_shift;
            hi += deadband_shift;
        }

        let price = if reading.temperature > hi {
            if self.dir >= 0.0 { price_cap } else { -price_cap }
        } else if reading.temperature < lo {
            if self.dir >= 0.0 { -price_cap } else { price_cap }
        } else if (reading.temperature - self.config.base_setpoint).abs() < f64::EPSILON {
            mean
        } else {
            let (k_t, t_lim) = if reading.temperature > self.config.base_setpoint {
                (self.config.ramp_high, self.config.range_high)
            } else {
                (self.config.ramp_low, self.config.range_low)
            };
            if stdev.abs() < bid_offset || t_lim == 0.0 {
                mean
            } else {
                mean + (reading.temperature - self.config.base_setpoint) * (k_t * stdev) / t_lim.abs()
            }
        };
        let price = price.clamp(-price_cap, price_cap);
        let quantity = reading.demand_kw * unit_scale;

        self.last_price = price;
        self.last_quantity = quantity;
        Some(BidRequest { quantity: -quantity, price, state: reading.state })
    }

    /// The key the next `submit` call should use: a resubmission key if
    /// this controller already has an open bid in `current_market_id`,
    /// otherwise [`crate::bid::NEW_BID`] (§6 submission contract).
    pub fn bid_key(&self, current_market_id: u64) -> BidKey {
        if self.last_market_id == Some(current_market_id) {
            self.last_bid_key
        } else {
            NEW_BID
        }
    }

    pub fn record_submission(&mut self, market_id: u64, key: BidKey) {
        self.last_market_id = Some(market_id);
        self.last_bid_key = key;
    }
}

/// Which bound a resolve policy pulls back when `cool_min - heat_max` is
/// narrower than `deadband` (§4.3.2, §9 "one state machine parameterised
/// by a tie-break policy").
fn resolve_bounds(mode: ResolveMode, heating_base: f64, cooling_base: f64, deadband: f64, last_mode: ThermostatMode, heat_max: &mut f64, cool_min: &mut f64) -> MarketResult<()> {
    if *cool_min - *heat_max >= deadband {
        return Ok(());
    }
    match mode {
        ResolveMode::Deadband => {
            let midpoint = (*heat_max + *cool_min) / 2.0;
            if midpoint - deadband / 2.0 < heating_base || midpoint + deadband / 2.0 > cooling_base {
                return Err(MarketError::configuration(
                    "double_ramp_controller",
                    "midpoint between max heating setpoint and min cooling setpoint must be half a deadband away from each base setpoint",
                ));
            }
            *heat_max = midpoint - deadband / 2.0;
            *cool_min = midpoint + deadband / 2.0;
        }
        ResolveMode::Sliding => {
            if *heat_max > cooling_base - deadband {
                return Err(MarketError::configuration("double_ramp_controller", "max heating setpoint must be a full deadband less than the cooling base setpoint"));
            }
            if *cool_min < heating_base + deadband {
                return Err(MarketError::configuration("double_ramp_controller", "min cooling setpoint must be a full deadband greater than the heating base setpoint"));
            }
            match last_mode {
                ThermostatMode::Off | ThermostatMode::Cool => *heat_max = *cool_min - deadband,
                ThermostatMode::Heat => *cool_min = *heat_max + deadband,
            }
        }
    }
    Ok(())
}

/// Heating+cooling transactive controller (§4.3.2).
pub struct DoubleRampController {
    config: ControllerConfig,
    last_market_id: Option<u64>,
    last_bid_key: BidKey,
    last_price: f64,
    last_quantity: f64,
    heating_setpoint: f64,
    cooling_setpoint: f64,
    last_mode: ThermostatMode,
    time_off: Option<TimeStep>,
    rng: ChaCha8Rng,
}

impl DoubleRampController {
    pub fn new(config: ControllerConfig, rng_seed: u64) -> Self {
        let heating_setpoint = config.heating_base_setpoint;
        let cooling_setpoint = config.cooling_base_setpoint;
        Self {
            heating_setpoint,
            cooling_setpoint,
            last_market_id: None,
            last_bid_key: NEW_BID,
            last_price: 0.0,
            last_quantity: 0.0,
            last_mode: ThermostatMode::Off,
            time_off: None,
            rng: ChaCha8Rng::seed_from_u64(rng_seed),
            config,
        }
    }

    /// Heating/cooling operating bounds after slider scaling but before
    /// overlap resolution (§3 Controller State, §4.3.2).
    fn raw_bounds(&self) -> (f64, f64, f64, f64) {
        let heat_min = self.config.heating_base_setpoint + self.config.heat_range_low * self.config.slider_heat;
        let heat_max = self.config.heating_base_setpoint + self.config.heat_range_high * self.config.slider_heat;
        let cool_min = self.config.cooling_base_setpoint + self.config.cool_range_low * self.config.slider_cool;
        let cool_max = self.config.cooling_base_setpoint + self.config.cool_range_high * self.config.slider_cool;
        (heat_min, heat_max, cool_min, cool_max)
    }

    /// §4.3.2's overlap-resolution pass. Must be called before bidding if
    /// slider settings or base setpoints changed.
    pub fn resolved_bounds(&self) -> MarketResult<(f64, f64, f64, f64)> {
        let (heat_min, mut heat_max, mut cool_min, cool_max) = self.raw_bounds();
        resolve_bounds(
            self.config.resolve_mode,
            self.config.heating_base_setpoint,
            self.config.cooling_base_setpoint,
            self.config.deadband,
            self.last_mode,
            &mut heat_max,
            &mut cool_min,
        )?;
        Ok((heat_min, heat_max, cool_min, cool_max))
    }

    /// State detection after-sync (§4.3.2): deduce thermostat mode from
    /// the collaborator's heat/cool/aux booleans, with an off-timer that
    /// preserves `last_mode` for [`ResolveMode::Sliding`] resolution.
    pub fn detect_mode(&mut self, now: TimeStep, heat_on: bool, cool_on: bool, aux_on: bool) -> ThermostatMode {
        let mode = if cool_on {
            ThermostatMode::Cool
        } else if heat_on || aux_on {
            ThermostatMode::Heat
        } else {
            ThermostatMode::Off
        };
        match mode {
            ThermostatMode::Off => {
                if self.time_off.is_none() {
                    self.time_off = Some(now);
                }
                let expired = self.time_off.map(|t0| now - t0 >= self.config.sliding_time_delay).unwrap_or(true);
                if expired {
                    self.last_mode = ThermostatMode::Off;
                }
            }
            other => {
                self.time_off = None;
                self.last_mode = other;
            }
        }
        mode
    }

    /// §4.3.2 setpoint recompute on market advance.
    pub fn on_market_advance(&mut self, market_id: u64, clearing_price: f64, mean: f64, stdev: f64, bid_offset: f64) -> MarketResult<Option<Override>> {
        if self.last_market_id == Some(market_id) {
            return Ok(None);
        }
        self.last_market_id = Some(market_id);
        self.last_bid_key = NEW_BID;

        let (heat_min, heat_max, cool_min, cool_max) = self.resolved_bounds()?;

        let dir = match self.last_mode {
            ThermostatMode::Cool => 1.0,
            ThermostatMode::Heat => -1.0,
            ThermostatMode::Off => 0.0,
        };
        let shift = if self.config.use_predictive_bidding { shift_direction(dir, clearing_price, self.last_price) } else { 0.0 };
        let deadband_shift = if self.config.use_predictive_bidding { self.config.deadband * 0.5 } else { 0.0 };

        if stdev.abs() < bid_offset {
            self.cooling_setpoint = self.config.cooling_base_setpoint + deadband_shift * shift;
            self.heating_setpoint = self.config.heating_base_setpoint + deadband_shift * shift;
        } else if clearing_price > mean {
            self.cooling_setpoint = self.config.cooling_base_setpoint
                + (clearing_price - mean) * self.config.cool_range_high.abs() / (self.config.cool_ramp_high * stdev)
                + deadband_shift * shift;
            self.heating_setpoint = self.config.heating_base_setpoint
                + (clearing_price - mean) * self.config.heat_range_low.abs() / (self.config.heat_ramp_low * stdev)
                + deadband_shift * shift;
        } else if clearing_price < mean {
            self.cooling_setpoint = self.config.cooling_base_setpoint
                + (clearing_price - mean) * self.config.cool_range_low.abs() / (self.config.cool_ramp_low * stdev)
                + deadband_shift * shift;
            self.heating_setpoint = self.config.heating_base_setpoint
                + (clearing_price - mean) * self.config.heat_range_high.abs() / (self.config.heat_ramp_high * stdev)
                + deadband_shift * shift;
        } else {
            self.cooling_setpoint = self.config.cooling_base_setpoint + deadband_shift * shift;
            self.heating_setpoint = self.config.heating_base_setpoint + deadband_shift * shift;
        }
        self.cooling_setpoint = self.cooling_setpoint.clamp(cool_min, cool_max);
        self.heating_setpoint = self.heating_setpoint.clamp(heat_min, heat_max);

        // Run/don't-run resolution needs `price_cap` and (in PROB mode) the
        // cleared frame's `marginal_frac`, neither of which this method's
        // signature carries; callers invoke `override_with_marginal_frac`
        // once the frame is in hand, matching §4.3.2's override block.
        Ok(Some(Override::Normal))
    }

    /// PROB margin-mode override (§4.3.2, §10.5): draws `U(0,1)` against
    /// the cleared frame's `marginal_frac` when price lands exactly on the
    /// bid but isn't at the price cap.
    pub fn override_with_marginal_frac(&mut self, clearing_price: f64, price_cap: f64, marginal_frac: f64, bid_offset: f64) -> Override {
        if self.last_quantity == 0.0 {
            return Override::Normal;
        }
        let at_cap = clearing_price.abs() >= price_cap - bid_offset;
        if (clearing_price - self.last_price).abs() < bid_offset && !at_cap {
            match self.config.margin_mode {
                MarginMode::Deny => Override::DoNotRun,
                MarginMode::Prob => {
                    let draw: f64 = self.rng.gen_range(0.0..1.0);
                    if draw < marginal_frac { Override::Run } else { Override::DoNotRun }
                }
                MarginMode::Normal => Override::Normal,
            }
        } else if clearing_price <= self.last_price {
            Override::Run
        } else {
            Override::DoNotRun
        }
    }

    /// §4.3.2 bid-cycle region logic.
    pub fn compute_bid(&mut self, temperature: f64, cooling_demand_kw: f64, heating_demand_kw: f64, mean: f64, stdev: f64, price_cap: f64, bid_offset: f64, unit_scale: f64) -> MarketResult<Option<BidRequest>> {
        let (heat_min, heat_max, cool_min, cool_max) = self.resolved_bounds()?;

        let (price, quantity_kw) = if temperature > cool_max {
            (price_cap, cooling_demand_kw)
        } else if temperature < heat_min {
            (price_cap, heating_demand_kw)
        } else if temperature > heat_max && temperature < cool_min {
            (0.0, 0.0)
        } else if temperature <= heat_max && temperature >= heat_min {
            let ramp = if temperature > self.config.heating_base_setpoint { self.config.heat_ramp_high } else { self.config.heat_ramp_low };
            let range = if temperature > self.config.heating_base_setpoint { self.config.heat_range_high } else { self.config.heat_range_low };
            let p = if (temperature - self.config.heating_base_setpoint).abs() < f64::EPSILON {
                mean
            } else if stdev.abs() < bid_offset || range == 0.0 {
                mean
            } else {
                mean + (temperature - self.config.heating_base_setpoint) * ramp * stdev / range.abs()
            };
            (p, heating_demand_kw)
        } else {
            let ramp = if temperature > self.config.cooling_base_setpoint { self.config.cool_ramp_high } else { self.config.cool_ramp_low };
            let range = if temperature > self.config.cooling_base_setpoint { self.config.cool_range_high } else { self.config.cool_range_low };
            let p = if (temperature - self.config.cooling_base_setpoint).abs() < f64::EPSILON {
                mean
            } else if stdev.abs() < bid_offset || range == 0.0 {
                mean
            } else {
                mean + (temperature - self.config.cooling_base_setpoint) * ramp * stdev / range.abs()
            };
            (p, cooling_demand_kw)
        };

        if quantity_kw <= 0.001 {
            self.last_price = 0.0;
            self.last_quantity = 0.0;
            return Ok(None);
        }
        let price = price.clamp(-price_cap, price_cap);
        let quantity = quantity_kw * unit_scale;
        self.last_price = price;
        self.last_quantity = quantity;
        Ok(Some(BidRequest { quantity: -quantity, price, state: BidState::Unknown }))
    }

    pub fn bid_key(&self, current_market_id: u64) -> BidKey {
        if self.last_market_id == Some(current_market_id) {
            self.last_bid_key
        } else {
            NEW_BID
        }
    }

    pub fn record_submission(&mut self, market_id: u64, key: BidKey) {
        self.last_market_id = Some(market_id);
        self.last_bid_key = key;
    }

    pub fn heating_setpoint(&self) -> f64 {
        self.heating_setpoint
    }

    pub fn cooling_setpoint(&self) -> f64 {
        self.cooling_setpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;

    fn cooling_config() -> ControllerConfig {
        ControllerConfig {
            base_setpoint: 75.0,
            deadband: 2.0,
            ramp_low: 2.0,
            ramp_high: 2.0,
            range_low: -3.0,
            range_high: 5.0,
            slider: 1.0,
            use_predictive_bidding: true,
            use_override: false,
            ..Default::default()
        }
    }

    #[test]
    fn ramp_setpoint_follows_price_above_mean() {
        let mut ctrl = RampController::new(cooling_config());
        let over = ctrl.on_market_advance(0, 40.0, 30.0, 5.0, 0.001);
        assert!(over.is_some());
        assert!(ctrl.setpoint() > 75.0);
        assert!(ctrl.setpoint() <= 75.0 + 5.0);
    }

    #[test]
    fn ramp_bid_at_cap_when_above_band() {
        let mut ctrl = RampController::new(cooling_config());
        let reading = DeviceReading { temperature: 120.0, demand_kw: 3.0, state: BidState::Off };
        let bid = ctrl.compute_bid(reading, 30.0, 5.0, 9999.0, 0.001, 1.0).unwrap();
        assert_eq!(bid.price, 9999.0);
        assert_eq!(bid.quantity, -3.0);
    }

    #[test]
    fn ramp_no_bid_when_demand_zero() {
        let mut ctrl = RampController::new(cooling_config());
        let reading = DeviceReading { temperature: 75.0, demand_kw: 0.0, state: BidState::Off };
        assert!(ctrl.compute_bid(reading, 30.0, 5.0, 9999.0, 0.001, 1.0).is_none());
    }

    #[test]
    fn double_ramp_resolves_deadband_overlap() {
        let config = ControllerConfig {
            heating_base_setpoint: 70.0,
            cooling_base_setpoint: 71.0,
            heat_range_low: -2.0,
            heat_range_high: 1.0,
            cool_range_low: -1.0,
            cool_range_high: 2.0,
            deadband: 2.0,
            resolve_mode: ResolveMode::Deadband,
            ..Default::default()
        };
        let ctrl = DoubleRampController::new(config, 1);
        let (heat_min, heat_max, cool_min, cool_max) = ctrl.resolved_bounds().unwrap();
        assert!(cool_min - heat_max >= 2.0 - 1e-9);
        assert!(heat_min < heat_max);
        assert!(cool_min < cool_max);
    }

    #[test]
    fn double_ramp_dead_zone_produces_no_bid() {
        let config = ControllerConfig {
            heating_base_setpoint: 68.0,
            cooling_base_setpoint: 76.0,
            heat_range_low: -3.0,
            heat_range_high: 0.0,
            cool_range_low: 0.0,
            cool_range_high: 3.0,
            deadband: 2.0,
            ..Default::default()
        };
        let mut ctrl = DoubleRampController::new(config, 1);
        let bid = ctrl.compute_bid(72.0, 2.0, 2.0, 30.0, 5.0, 9999.0, 0.001, 1.0).unwrap();
        assert!(bid.is_none());
    }

    #[test]
    fn double_ramp_must_cool_bids_at_cap() {
        let config = ControllerConfig {
            heating_base_setpoint: 68.0,
            cooling_base_setpoint: 76.0,
            heat_range_low: -3.0,
            heat_range_high: 0.0,
            cool_range_low: 0.0,
            cool_range_high: 3.0,
            deadband: 2.0,
            ..Default::default()
        };
        let mut ctrl = DoubleRampController::new(config, 1);
        let bid = ctrl.compute_bid(90.0, 4.0, 2.0, 30.0, 5.0, 9999.0, 0.001, 1.0).unwrap().unwrap();
        assert_eq!(bid.price, 9999.0);
        assert_eq!(bid.quantity, -4.0);
    }

    #[test]
    fn prob_override_draws_against_marginal_frac() {
        let config = ControllerConfig { margin_mode: MarginMode::Prob, ..Default::default() };
        let mut ctrl = DoubleRampController::new(config, 42);
        ctrl.last_price = 30.0;
        ctrl.last_quantity = 5.0;
        // marginal_frac = 1.0 always runs
        let decision = ctrl.override_with_marginal_frac(30.0, 9999.0, 1.0, 0.001);
        assert_eq!(decision, Override::Run);
        // marginal_frac = 0.0 never runs
        let decision = ctrl.override_with_marginal_frac(30.0, 9999.0, 0.0, 0.001);
        assert_eq!(decision, Override::DoNotRun);
    }
}
