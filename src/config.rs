//! Configuration enumerations and scenario structs (§6, §10.3).
//!
//! Deserialized with `serde`/`toml`, matching the teacher crate's layered
//! config pattern. Every field defaults to the value `create` assigns in
//! the original source (§4.2), so a scenario file only needs to name what
//! it overrides.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialMode {
    None,
    SellersOnly,
    BuyersOnly,
    FixedSeller,
    FixedBuyer,
}

impl Default for SpecialMode {
    fn default() -> Self {
        SpecialMode::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    Normal,
    Deny,
    Prob,
}

impl Default for MarginMode {
    fn default() -> Self {
        MarginMode::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticMode {
    On,
    Off,
}

impl Default for StatisticMode {
    fn default() -> Self {
        StatisticMode::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveLogInfo {
    Normal,
    Extra,
}

impl Default for CurveLogInfo {
    fn default() -> Self {
        CurveLogInfo::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Ramp,
    DoubleRamp,
}

impl Default for ControlMode {
    fn default() -> Self {
        ControlMode::Ramp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    Deadband,
    Sliding,
}

impl Default for ResolveMode {
    fn default() -> Self {
        ResolveMode::Deadband
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimpleMode {
    None,
    HouseHeat,
    HouseCool,
    HousePreheat,
    HousePrecool,
    Waterheater,
    DoubleRamp,
}

impl Default for SimpleMode {
    fn default() -> Self {
        SimpleMode::None
    }
}

fn default_price_cap() -> f64 {
    9999.0
}

fn default_period() -> i64 {
    300
}

fn default_clearing_scalar() -> f64 {
    0.5
}

fn default_init_price() -> f64 {
    0.0
}

fn default_init_stdev() -> f64 {
    1.0
}

fn default_bid_offset() -> f64 {
    0.001
}

fn default_warmup_seconds() -> i64 {
    24 * 3600
}

/// Auction-level configuration (§4.2 `create`/`init` defaults).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub name: String,
    #[serde(default = "default_price_cap")]
    pub price_cap: f64,
    #[serde(default = "default_period")]
    pub period: i64,
    #[serde(default = "default_clearing_scalar")]
    pub clearing_scalar: f64,
    #[serde(default = "default_init_price")]
    pub init_price: f64,
    #[serde(default = "default_init_stdev")]
    pub init_stdev: f64,
    #[serde(default = "default_bid_offset")]
    pub bid_offset: f64,
    #[serde(default = "default_warmup_seconds")]
    pub warmup_seconds: i64,
    pub special_mode: SpecialMode,
    pub margin_mode: MarginMode,
    pub statistic_mode: StatisticMode,
    pub curve_log_info: CurveLogInfo,
    pub ignore_pricecap: bool,
    pub latency: i64,
    pub fixed_quantity: Option<f64>,
    pub fixed_price: Option<f64>,
    pub capacity_reference_enabled: bool,
    /// Unit-conversion factor applied to the reference load before it is
    /// compared against bid totals (§4.2 step 1 "convert units if necessary").
    #[serde(default = "default_capacity_reference_scale")]
    pub capacity_reference_scale: f64,
}

fn default_capacity_reference_scale() -> f64 {
    1.0
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            name: "market".to_string(),
            price_cap: default_price_cap(),
            period: default_period(),
            clearing_scalar: default_clearing_scalar(),
            init_price: default_init_price(),
            init_stdev: default_init_stdev(),
            bid_offset: default_bid_offset(),
            warmup_seconds: default_warmup_seconds(),
            special_mode: SpecialMode::default(),
            margin_mode: MarginMode::default(),
            statistic_mode: StatisticMode::default(),
            curve_log_info: CurveLogInfo::default(),
            ignore_pricecap: false,
            latency: 0,
            fixed_quantity: None,
            fixed_price: None,
            capacity_reference_enabled: false,
            capacity_reference_scale: default_capacity_reference_scale(),
        }
    }
}

/// Per-device transactive controller configuration (§4.3).
///
/// The `heat_*`/`cool_*`/`slider_heat`/`slider_cool` fields are only
/// consulted by [`crate::controller::DoubleRampController`]; `RAMP` mode
/// uses `base_setpoint`/`ramp_*`/`range_*`/`slider` instead (§3 Controller
/// State, §4.3.1 vs §4.3.2).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub name: String,
    pub control_mode: ControlMode,
    pub resolve_mode: ResolveMode,
    pub simple_mode: SimpleMode,
    pub margin_mode: MarginMode,
    pub base_setpoint: f64,
    pub deadband: f64,
    pub ramp_low: f64,
    pub ramp_high: f64,
    pub range_low: f64,
    pub range_high: f64,
    pub slider: f64,
    pub bid_delay: i64,
    pub use_predictive_bidding: bool,
    pub use_override: bool,
    pub sliding_time_delay: i64,

    pub heating_base_setpoint: f64,
    pub cooling_base_setpoint: f64,
    pub heat_ramp_low: f64,
    pub heat_ramp_high: f64,
    pub heat_range_low: f64,
    pub heat_range_high: f64,
    pub cool_ramp_low: f64,
    pub cool_ramp_high: f64,
    pub cool_range_low: f64,
    pub cool_range_high: f64,
    pub slider_heat: f64,
    pub slider_cool: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "controller".to_string(),
            control_mode: ControlMode::default(),
            resolve_mode: ResolveMode::default(),
            simple_mode: SimpleMode::default(),
            margin_mode: MarginMode::default(),
            base_setpoint: 70.0,
            deadband: 2.0,
            ramp_low: 2.0,
            ramp_high: 2.0,
            range_low: -3.0,
            range_high: 3.0,
            slider: 1.0,
            bid_delay: 0,
            use_predictive_bidding: true,
            use_override: false,
            sliding_time_delay: 0,

            heating_base_setpoint: 68.0,
            cooling_base_setpoint: 75.0,
            heat_ramp_low: -2.0,
            heat_ramp_high: -2.0,
            heat_range_low: -5.0,
            heat_range_high: 0.0,
            cool_ramp_low: 2.0,
            cool_ramp_high: 2.0,
            cool_range_low: 0.0,
            cool_range_high: 5.0,
            slider_heat: 1.0,
            slider_cool: 1.0,
        }
    }
}

fn default_nominal_frequency() -> f64 {
    60.0
}

fn default_droop() -> f64 {
    0.05
}

fn default_frequency_deadband() -> f64 {
    0.015
}

/// PFC direction a [`crate::collector::SupervisoryCollector`] assigns
/// trigger thresholds for (§4.5, `supervisory_control.cpp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PfcMode {
    OverFrequency,
    UnderFrequency,
    OverUnderFrequency,
}

impl Default for PfcMode {
    fn default() -> Self {
        PfcMode::OverUnderFrequency
    }
}

/// Bid-array sort key for primary frequency control (§4.5 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    None,
    PowerIncreasing,
    PowerDecreasing,
    VoltageFromNominal,
    VoltageExtremes,
}

impl Default for SortMode {
    fn default() -> Self {
        SortMode::None
    }
}

/// Supervisory collector configuration (§4.5).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisoryConfig {
    pub name: String,
    pub period: i64,
    #[serde(default = "default_nominal_frequency")]
    pub nominal_frequency: f64,
    #[serde(default = "default_droop")]
    pub droop: f64,
    #[serde(default = "default_frequency_deadband")]
    pub frequency_deadband: f64,
    pub pfc_mode: PfcMode,
    pub sort_mode: SortMode,
}

impl Default for SupervisoryConfig {
    fn default() -> Self {
        Self {
            name: "supervisory_control".to_string(),
            period: default_period(),
            nominal_frequency: default_nominal_frequency(),
            droop: default_droop(),
            frequency_deadband: default_frequency_deadband(),
            pfc_mode: PfcMode::default(),
            sort_mode: SortMode::default(),
        }
    }
}

/// Generator bidder configuration (§4.4).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub name: String,
    pub rated_capacity: f64,
    pub bid_curve: String,
    pub startup_cost: f64,
    pub shutdown_cost: f64,
    pub amortisation_rate: f64,
    pub min_runtime_periods: u32,
    pub min_downtime_seconds: i64,
    pub phases: f64,
    pub runtime_limit_seconds: Option<i64>,
    pub runtime_rollover_seconds: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            name: "generator".to_string(),
            rated_capacity: 0.0,
            bid_curve: String::new(),
            startup_cost: 0.0,
            shutdown_cost: 0.0,
            amortisation_rate: 0.0,
            min_runtime_periods: 1,
            min_downtime_seconds: 0,
            phases: 3.0,
            runtime_limit_seconds: None,
            runtime_rollover_seconds: 365 * 24 * 3600,
        }
    }
}
