//! Bid, bid key encoding, and submission outcomes (§3, §4.1, §6).

use serde::{Deserialize, Serialize};

/// Opaque 64-bit bid handle. Signed so the `-1` "new bid" sentinel and the
/// `0`/rejection sentinels round-trip cleanly through the submission API.
pub type BidKey = i64;

/// Sentinel passed to `submit` to request a new bid rather than a resubmission.
pub const NEW_BID: BidKey = -1;

/// Sentinel returned when a bid is rejected or silently dropped (§7).
pub const REJECTED: BidKey = -1;

/// Sentinel returned when a key addresses an already-cleared market (§4.2).
pub const IGNORED_PAST_MARKET: BidKey = 0;

/// bits 63:16 = market_id, bit 15 = side, bits 14:0 = slot index.
///
/// The source carries two parallel masks (`0x4FFF…` in `bid.cpp`,
/// `0x8FFF…` in `bid_ccsi.cpp`). This crate standardises on the `8FFF`
/// variant, which the design notes call authoritative for new work.
const MARKET_MASK: u64 = 0x8FFF_FFFF_FFFF_0000;
const SIDE_BIT: u64 = 0x8000;
const SLOT_MASK: u64 = 0x7FFF;

/// Side of the market a bid participates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Negative quantity: demand.
    Buy,
    /// Positive quantity: supply.
    Sell,
}

impl Side {
    #[inline]
    pub fn from_quantity(quantity: f64) -> Self {
        if quantity < 0.0 {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    #[inline]
    fn bit(self) -> u64 {
        match self {
            Side::Buy => SIDE_BIT,
            Side::Sell => 0,
        }
    }
}

/// A bidder's current device state, carried for predictive bidding logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BidState {
    Unknown,
    Off,
    On,
}

/// A single offer to buy or sell at a price (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub bidder_id: String,
    /// Sign denotes side: negative = buy/demand, positive = sell/supply.
    pub quantity: f64,
    pub price: f64,
    pub state: BidState,
}

impl Bid {
    pub fn new(bidder_id: impl Into<String>, quantity: f64, price: f64, state: BidState) -> Self {
        Self {
            bidder_id: bidder_id.into(),
            quantity,
            price,
            state,
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        Side::from_quantity(self.quantity)
    }
}

/// Decoded fields of a bid key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedKey {
    pub market_id: u64,
    pub slot: u16,
    pub side: Side,
}

/// Encode `(market_id, slot, side)` into a bid key. Returns `None` if
/// `market_id` needs bits above the reserved mask or `slot` exceeds 15 bits.
pub fn encode(market_id: u64, slot: u16, side: Side) -> Option<BidKey> {
    if slot as u64 > SLOT_MASK {
        return None;
    }
    let shifted = market_id.checked_shl(16)?;
    if shifted & !MARKET_MASK != 0 {
        // market_id overflowed into the reserved high bits.
        return None;
    }
    let raw = (shifted & MARKET_MASK) | side.bit() | (slot as u64 & SLOT_MASK);
    Some(raw as i64)
}

/// Decode a bid key produced by [`encode`]. Returns `None` for the sentinel
/// values (`<= 0`), which callers must special-case before decoding.
pub fn decode(key: BidKey) -> Option<DecodedKey> {
    if key <= 0 {
        return None;
    }
    let raw = key as u64;
    let market_id = (raw & MARKET_MASK) >> 16;
    let side = if raw & SIDE_BIT != 0 { Side::Buy } else { Side::Sell };
    let slot = (raw & SLOT_MASK) as u16;
    Some(DecodedKey { market_id, slot, side })
}

/// Outcome of a call to `AuctionEngine::submit` (§4.2, §7).
///
/// Kept separate from [`crate::error::MarketError`]: rejections and
/// warmup drops are ordinary, non-fatal results, not propagated errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new bid was accepted; carries its key.
    Accepted(BidKey),
    /// An existing bid was updated in place; carries the same key.
    Resubmitted(BidKey),
    /// The key addressed an already-cleared market; harmlessly ignored.
    IgnoredPastMarket,
    /// The key addressed a market that hasn't opened yet.
    RejectedFutureMarket,
    /// A demand bid arrived during the warmup window (§4.2, §7).
    WarmupDropped,
    /// A resubmission key did not match any open bid.
    InvalidKey,
}

impl SubmitOutcome {
    /// The key value the host-facing `submit` entry point returns, matching
    /// the source's single-`int64`-return convention (§6).
    pub fn as_key(self) -> BidKey {
        match self {
            SubmitOutcome::Accepted(k) | SubmitOutcome::Resubmitted(k) => k,
            SubmitOutcome::IgnoredPastMarket => IGNORED_PAST_MARKET,
            SubmitOutcome::RejectedFutureMarket
            | SubmitOutcome::WarmupDropped
            | SubmitOutcome::InvalidKey => REJECTED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_encode_decode() {
        for market_id in [0u64, 1, 42, 1_000_000] {
            for slot in [0u16, 1, 500, 0x7FFF] {
                for side in [Side::Buy, Side::Sell] {
                    let key = encode(market_id, slot, side).unwrap();
                    let decoded = decode(key).unwrap();
                    assert_eq!(decoded.market_id, market_id);
                    assert_eq!(decoded.slot, slot);
                    assert_eq!(decoded.side, side);
                }
            }
        }
    }

    #[test]
    fn slot_overflow_rejected() {
        assert!(encode(0, 0x8000, Side::Buy).is_none());
    }

    #[test]
    fn sentinels_do_not_decode() {
        assert!(decode(NEW_BID).is_none());
        assert!(decode(IGNORED_PAST_MARKET).is_none());
    }

    #[test]
    fn side_from_quantity_sign() {
        assert_eq!(Side::from_quantity(-5.0), Side::Buy);
        assert_eq!(Side::from_quantity(5.0), Side::Sell);
        assert_eq!(Side::from_quantity(0.0), Side::Sell);
    }
}
