//! Market frame and clearing type (§3).

use serde::{Deserialize, Serialize};

use crate::clock::TimeStep;

/// Label describing which side (if any) determined the clearing price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearingType {
    Null,
    MarginalSeller,
    MarginalBuyer,
    Price,
    Exact,
    Failure,
}

/// Snapshot of one cleared market period, exposed as `current`/`past`/`next`
/// frames and the unit enqueued on the latency ring (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketFrame {
    pub market_id: u64,
    pub start_time: TimeStep,
    pub end_time: TimeStep,
    pub clearing_price: f64,
    pub clearing_quantity: f64,
    pub clearing_type: ClearingType,
    pub marginal_quantity: f64,
    pub total_marginal_quantity: f64,
    pub marginal_frac: f64,
    pub seller_total_quantity: f64,
    pub buyer_total_quantity: f64,
    pub seller_min_price: f64,
    pub buyer_total_unrep: f64,
    pub cap_ref_unrep: f64,
}

impl MarketFrame {
    /// The zero-value frame used before any market has cleared.
    pub fn empty(market_id: u64, start_time: TimeStep, end_time: TimeStep) -> Self {
        Self {
            market_id,
            start_time,
            end_time,
            clearing_price: 0.0,
            clearing_quantity: 0.0,
            clearing_type: ClearingType::Null,
            marginal_quantity: 0.0,
            total_marginal_quantity: 0.0,
            marginal_frac: 0.0,
            seller_total_quantity: 0.0,
            buyer_total_quantity: 0.0,
            seller_min_price: 0.0,
            buyer_total_unrep: 0.0,
            cap_ref_unrep: 0.0,
        }
    }

    /// Latency-consistency check from §8: `start_time <= now < end_time`.
    pub fn is_applicable_at(&self, now: TimeStep) -> bool {
        self.start_time <= now && now < self.end_time
    }
}
