//! Supervisory collector (§4.5): gathers primary-frequency-control bids
//! from on/off devices each period, sorts them, and assigns each a
//! trigger frequency based on its position in the cumulative-power walk.

use crate::config::{PfcMode, SortMode};

/// One frequency-responsive device's bid into the PFC pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PfcBid {
    pub bidder_index: usize,
    pub power: f64,
    pub voltage_deviation: f64,
}

/// Trigger frequency assigned back to a bidder after `resolve` (§4.5 step 2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerAssignment {
    pub bidder_index: usize,
    pub trigger_frequency: f64,
    pub pfc_mode: PfcMode,
}

/// Collects on/off bids for one supervisory period and resolves them into
/// trigger-frequency assignments (§4.5, `collect.cpp`).
#[derive(Debug, Default)]
pub struct SupervisoryCollector {
    bidders: Vec<String>,
    on: Vec<PfcBid>,
    off: Vec<PfcBid>,
}

impl SupervisoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn bidder_index(&mut self, bidder_id: &str) -> usize {
        if let Some(idx) = self.bidders.iter().position(|b| b == bidder_id) {
            idx
        } else {
            self.bidders.push(bidder_id.to_string());
            self.bidders.len() - 1
        }
    }

    /// Adjust `voltage_deviation` per the configured sort mode before
    /// storing the bid, matching `supervisory_control::submit_nolock`'s
    /// pre-sort transform for `VoltageFromNominal`/`VoltageExtremes`.
    fn adjust_deviation(sort_mode: SortMode, running: bool, voltage_deviation: f64) -> f64 {
        match sort_mode {
            SortMode::VoltageFromNominal => voltage_deviation.abs(),
            SortMode::VoltageExtremes => {
                if running {
                    voltage_deviation - 1.0
                } else {
                    1.0 - voltage_deviation
                }
            }
            _ => voltage_deviation,
        }
    }

    /// Submit a bid from a device that is currently running (§4.5 `state == 1`).
    pub fn submit_on(&mut self, bidder_id: &str, power: f64, voltage_deviation: f64, sort_mode: SortMode) -> usize {
        let idx = self.bidder_index(bidder_id);
        let voltage_deviation = Self::adjust_deviation(sort_mode, true, voltage_deviation);
        self.on.push(PfcBid { bidder_index: idx, power, voltage_deviation });
        self.on.len()
    }

    /// Submit a bid from a device that is currently off (§4.5 `state == 0`).
    pub fn submit_off(&mut self, bidder_id: &str, power: f64, voltage_deviation: f64, sort_mode: SortMode) -> usize {
        let idx = self.bidder_index(bidder_id);
        let voltage_deviation = Self::adjust_deviation(sort_mode, false, voltage_deviation);
        self.off.push(PfcBid { bidder_index: idx, power, voltage_deviation });
        self.off.len()
    }

    pub fn bidder_name(&self, index: usize) -> &str {
        &self.bidders[index]
    }

    /// §4.5 step 1: sort both bid arrays per the configured key.
    pub fn sort(&mut self, sort_mode: SortMode) {
        match sort_mode {
            SortMode::None => {}
            SortMode::PowerIncreasing => {
                self.on.sort_by(|a, b| a.power.partial_cmp(&b.power).unwrap());
                self.off.sort_by(|a, b| a.power.partial_cmp(&b.power).unwrap());
            }
            SortMode::PowerDecreasing => {
                self.on.sort_by(|a, b| b.power.partial_cmp(&a.power).unwrap());
                self.off.sort_by(|a, b| b.power.partial_cmp(&a.power).unwrap());
            }
            SortMode::VoltageFromNominal | SortMode::VoltageExtremes => {
                self.on.sort_by(|a, b| a.voltage_deviation.partial_cmp(&b.voltage_deviation).unwrap());
                self.off.sort_by(|a, b| a.voltage_deviation.partial_cmp(&b.voltage_deviation).unwrap());
            }
        }
    }

    /// §4.5 step 2: walk each sorted array accumulating power, assigning
    /// each device a trigger frequency `nominal ∓ cumulative_power * droop`,
    /// clamped so it never crosses into the deadband around nominal.
    pub fn resolve(
        &self,
        nominal_frequency: f64,
        droop: f64,
        frequency_deadband: f64,
        pfc_mode: PfcMode,
    ) -> Vec<TriggerAssignment> {
        let mut assignments = Vec::with_capacity(self.on.len() + self.off.len());

        if matches!(pfc_mode, PfcMode::UnderFrequency | PfcMode::OverUnderFrequency) {
            let mut cumulative = 0.0;
            for bid in &self.on {
                cumulative += bid.power;
                let mut trigger = nominal_frequency - cumulative * droop;
                let floor = nominal_frequency - frequency_deadband;
                if trigger > floor {
                    trigger = floor;
                }
                assignments.push(TriggerAssignment { bidder_index: bid.bidder_index, trigger_frequency: trigger, pfc_mode });
            }
        }

        if matches!(pfc_mode, PfcMode::OverFrequency | PfcMode::OverUnderFrequency) {
            let mut cumulative = 0.0;
            for bid in &self.off {
                cumulative += bid.power;
                let mut trigger = nominal_frequency + cumulative * droop;
                let ceiling = nominal_frequency + frequency_deadband;
                if trigger < ceiling {
                    trigger = ceiling;
                }
                assignments.push(TriggerAssignment { bidder_index: bid.bidder_index, trigger_frequency: trigger, pfc_mode });
            }
        }

        assignments
    }

    /// §4.5 step 3: reset for the next collection period.
    pub fn clear(&mut self) {
        self.on.clear();
        self.off.clear();
    }

    pub fn bids_on(&self) -> usize {
        self.on.len()
    }

    pub fn bids_off(&self) -> usize {
        self.off.len()
    }
}
