//! Bid curve (§4.1): insertion-ordered bid storage plus a parallel
//! permutation array used as sort key, so sorting never rewrites storage
//! and resubmission-by-slot stays O(1).

use crate::bid::{Bid, BidState};
use crate::error::{MarketError, MarketResult};

/// Ordered supply or demand curve for a single market period.
#[derive(Debug, Clone, Default)]
pub struct BidCurve {
    bids: Vec<Bid>,
    /// Permutation over `bids`, reordered by `sort`; `bids` itself is never
    /// reordered so a slot index always addresses the same bid.
    order: Vec<usize>,
    total: f64,
    total_on: f64,
    total_off: f64,
}

impl BidCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn total_on(&self) -> f64 {
        self.total_on
    }

    pub fn total_off(&self) -> f64 {
        self.total_off
    }

    /// Quantity carried by bids whose `state` is [`BidState::Unknown`]
    /// (§4.2 step 1's `sum_unknown_bids`).
    pub fn total_unknown(&self) -> f64 {
        (self.total - self.total_on - self.total_off).max(0.0)
    }

    /// Minimum price among all bids currently on the curve, or `None` if empty.
    pub fn min_price(&self) -> Option<f64> {
        self.bids.iter().map(|b| b.price).fold(None, |acc, p| match acc {
            None => Some(p),
            Some(m) => Some(m.min(p)),
        })
    }

    /// Total quantity among bids priced at or better than `price`, walking
    /// insertion order (no sort dependency; used for diagnostics/logging).
    pub fn get_total_at(&self, price: f64) -> f64 {
        self.bids
            .iter()
            .filter(|b| b.price <= price)
            .map(|b| b.quantity.abs())
            .sum()
    }

    /// Append a bid. Returns its slot index (stable until `clear`).
    /// Amortised O(1): storage grows geometrically like `Vec::push`.
    pub fn submit(&mut self, bid: Bid) -> usize {
        self.add_contribution(&bid);
        let slot = self.bids.len();
        self.order.push(slot);
        self.bids.push(bid);
        slot
    }

    /// Replace the bid at `slot` in place. O(1): subtracts the old
    /// contribution before adding the new one.
    pub fn resubmit(&mut self, slot: usize, bid: Bid) -> MarketResult<()> {
        let existing = self
            .bids
            .get_mut(slot)
            .ok_or_else(|| MarketError::runtime_invariant(format!("resubmit: invalid slot {slot}")))?;
        let old = std::mem::replace(existing, bid);
        self.remove_contribution(&old);
        self.add_contribution(&self.bids[slot].clone());
        Ok(())
    }

    pub fn get(&self, slot: usize) -> Option<&Bid> {
        self.bids.get(slot)
    }

    /// Stable sort of the permutation array by price. `reverse = false`
    /// yields ascending price (sellers); `reverse = true` yields descending
    /// (buyers), matching §4.1.
    pub fn sort(&mut self, reverse: bool) {
        let bids = &self.bids;
        self.order.sort_by(|&a, &b| {
            let ord = bids[a].price.partial_cmp(&bids[b].price).unwrap_or(std::cmp::Ordering::Equal);
            if reverse {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    /// Bids in the order established by the last `sort` call.
    pub fn sorted(&self) -> impl Iterator<Item = &Bid> {
        self.order.iter().map(move |&i| &self.bids[i])
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.order.clear();
        self.total = 0.0;
        self.total_on = 0.0;
        self.total_off = 0.0;
    }

    fn add_contribution(&mut self, bid: &Bid) {
        let q = bid.quantity.abs();
        self.total += q;
        match bid.state {
            BidState::On => self.total_on += q,
            BidState::Off => self.total_off += q,
            BidState::Unknown => {}
        }
    }

    fn remove_contribution(&mut self, bid: &Bid) {
        let q = bid.quantity.abs();
        self.total -= q;
        match bid.state {
            BidState::On => self.total_on -= q,
            BidState::Off => self.total_off -= q,
            BidState::Unknown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bid::BidState;

    fn bid(price: f64, qty: f64) -> Bid {
        Bid::new("x", qty, price, BidState::Unknown)
    }

    #[test]
    fn submit_accumulates_totals() {
        let mut curve = BidCurve::new();
        curve.submit(Bid::new("a", 10.0, 5.0, BidState::On));
        curve.submit(Bid::new("b", 20.0, 6.0, BidState::Off));
        assert_eq!(curve.total(), 30.0);
        assert_eq!(curve.total_on(), 10.0);
        assert_eq!(curve.total_off(), 20.0);
    }

    #[test]
    fn sort_ascending_and_descending_preserve_storage() {
        let mut curve = BidCurve::new();
        curve.submit(bid(30.0, 1.0));
        curve.submit(bid(10.0, 1.0));
        curve.submit(bid(20.0, 1.0));

        curve.sort(false);
        let ascending: Vec<f64> = curve.sorted().map(|b| b.price).collect();
        assert_eq!(ascending, vec![10.0, 20.0, 30.0]);

        curve.sort(true);
        let descending: Vec<f64> = curve.sorted().map(|b| b.price).collect();
        assert_eq!(descending, vec![30.0, 20.0, 10.0]);

        // storage (insertion order) is untouched by sorting
        assert_eq!(curve.get(0).unwrap().price, 30.0);
        assert_eq!(curve.get(1).unwrap().price, 10.0);
        assert_eq!(curve.get(2).unwrap().price, 20.0);
    }

    #[test]
    fn resubmit_updates_totals_in_place() {
        let mut curve = BidCurve::new();
        let slot = curve.submit(Bid::new("a", 10.0, 5.0, BidState::On));
        curve.resubmit(slot, Bid::new("a", 15.0, 6.0, BidState::On)).unwrap();
        assert_eq!(curve.total(), 15.0);
        assert_eq!(curve.total_on(), 15.0);
        assert_eq!(curve.len(), 1);
    }

    #[test]
    fn resubmit_invalid_slot_errors() {
        let mut curve = BidCurve::new();
        assert!(curve.resubmit(0, bid(1.0, 1.0)).is_err());
    }

    #[test]
    fn clear_resets_counts() {
        let mut curve = BidCurve::new();
        curve.submit(bid(1.0, 1.0));
        curve.clear();
        assert_eq!(curve.len(), 0);
        assert_eq!(curve.total(), 0.0);
    }
}
