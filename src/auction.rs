//! Double-auction clearing engine (§4.2).
//!
//! The largest component: accepts bids each period, sorts and clears the
//! two curves, computes marginal share, clamps price, pushes the cleared
//! frame onto the latency ring, pops ready frames into the observable
//! current/past/next frames, and refreshes rolling statistics.

use parking_lot::RwLock;
use tracing::debug;

use crate::bid::{decode, encode, Bid, BidKey, BidState, Side, SubmitOutcome, NEW_BID};
use crate::clock::TimeStep;
use crate::config::{MarketConfig, SpecialMode};
use crate::curve::BidCurve;
use crate::error::MarketResult;
use crate::frame::{ClearingType, MarketFrame};
use crate::latency::{ring_length, LatencyRing};
use crate::log::{CurveLog, TransactionLog};
use crate::statistic::{parse_statistic_name, PriceHistory, Statistic};

/// Outcome of the core double-sided (or special-mode) match, before price
/// clamping and marginal-share computation (§4.2 steps 4-7).
struct ClearResult {
    quantity: f64,
    price: f64,
    clearing_type: ClearingType,
}

/// The unresponsive-load estimate consumed by [`AuctionEngine::clear_with_reference`]
/// (§4.2 step 1). Kept separate from bid submission per the §9 Open Question
/// decision: this type only carries the raw reference reading, and never
/// itself submits a bid — that's [`CappedBidder`]'s job, for a collaborator
/// that wants to bid its own price-cap demand independent of this estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceLoadEstimate {
    pub reference_load: f64,
}

impl ReferenceLoadEstimate {
    pub fn new(reference_load: f64) -> Self {
        Self { reference_load }
    }
}

/// A collaborator that can submit an ordinary price-cap bid independent of
/// the engine's own unresponsive-load estimate (§9 Open Question decision:
/// the source's single-object "capacity_reference" overload conflated these
/// two roles; this crate keeps them apart).
pub trait CappedBidder {
    fn reference_load(&self) -> f64;
}

/// The double-auction clearing engine for a single market (§4.2).
pub struct AuctionEngine {
    config: MarketConfig,
    market_id: u64,
    start_time: TimeStep,
    warmup_end: TimeStep,

    buy: BidCurve,
    sell: BidCurve,

    price_history: PriceHistory,
    stats: Vec<Statistic>,

    ring: LatencyRing<MarketFrame>,
    cleared_frame: Option<MarketFrame>,
    current_frame: Option<MarketFrame>,
    past_frame: Option<MarketFrame>,
    next_frame: Option<MarketFrame>,

    txn_log: Option<TransactionLog>,
    curve_log: Option<CurveLog>,
}

impl AuctionEngine {
    /// `property_names` enumerates the host's published properties so that
    /// `<frame>_price_<stat>_<N><unit>` statistics can be discovered (§4.2 init).
    pub fn new(config: MarketConfig, start_time: TimeStep, property_names: &[String]) -> Self {
        let mut stats = Vec::new();
        let mut longest = config.period;
        for name in property_names {
            if let Some((mode, stat_type, interval)) = parse_statistic_name(name, config.period) {
                longest = longest.max(interval);
                stats.push(Statistic {
                    name: name.clone(),
                    mode,
                    stat_type,
                    interval_seconds: interval,
                    value: config.init_stdev,
                });
            }
        }
        let history_len = if config.period > 0 {
            (longest / config.period) as usize + 2
        } else {
            2
        };
        let ring_len = ring_length(config.latency, config.period);

        Self {
            warmup_end: start_time + config.warmup_seconds,
            market_id: 0,
            start_time,
            buy: BidCurve::new(),
            sell: BidCurve::new(),
            price_history: PriceHistory::new(history_len, config.init_price),
            stats,
            ring: LatencyRing::new(ring_len),
            cleared_frame: None,
            current_frame: None,
            past_frame: None,
            next_frame: None,
            txn_log: None,
            curve_log: None,
            config,
        }
    }

    pub fn attach_transaction_log(&mut self, log: TransactionLog) {
        self.txn_log = Some(log);
    }

    pub fn attach_curve_log(&mut self, log: CurveLog) {
        self.curve_log = Some(log);
    }

    pub fn market_id(&self) -> u64 {
        self.market_id
    }

    pub fn current_frame(&self) -> Option<&MarketFrame> {
        self.current_frame.as_ref()
    }

    pub fn past_frame(&self) -> Option<&MarketFrame> {
        self.past_frame.as_ref()
    }

    pub fn next_frame(&self) -> Option<&MarketFrame> {
        self.next_frame.as_ref()
    }

    pub fn statistics(&self) -> &[Statistic] {
        &self.stats
    }

    /// Submission contract (§4.2, §7). `now` is used only for the warmup
    /// check; everything else is driven off `key`'s embedded market_id.
    pub fn submit(&mut self, now: TimeStep, bidder: &str, quantity: f64, price: f64, key: BidKey, state: BidState) -> SubmitOutcome {
        let price = price.clamp(-self.config.price_cap, self.config.price_cap);

        if key == NEW_BID || key == 0 {
            if quantity < 0.0 && now < self.warmup_end {
                debug!(bidder, "demand bid dropped during warmup");
                return SubmitOutcome::WarmupDropped;
            }
            if quantity == 0.0 {
                return SubmitOutcome::InvalidKey;
            }
            let bid = Bid::new(bidder, quantity, price, state);
            let side = bid.side();
            let slot = match side {
                Side::Buy => self.buy.submit(bid),
                Side::Sell => self.sell.submit(bid),
            };
            let Some(new_key) = encode(self.market_id, slot as u16, side) else {
                return SubmitOutcome::InvalidKey;
            };
            return SubmitOutcome::Accepted(new_key);
        }

        let Some(decoded) = decode(key) else {
            return SubmitOutcome::InvalidKey;
        };
        if decoded.market_id > self.market_id {
            return SubmitOutcome::RejectedFutureMarket;
        }
        if decoded.market_id < self.market_id {
            return SubmitOutcome::IgnoredPastMarket;
        }
        let bid = Bid::new(bidder, quantity, price, state);
        let curve = match decoded.side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        };
        if curve.resubmit(decoded.slot as usize, bid).is_err() {
            return SubmitOutcome::InvalidKey;
        }
        SubmitOutcome::Resubmitted(key)
    }

    /// Run the clearing algorithm for the period closing at `now` (§4.2
    /// steps 1-8, 10-11), with no reference-load augmentation. Call
    /// [`Self::pop_ready`] afterwards to advance the latency ring and
    /// refresh statistics (step 9).
    pub fn clear(&mut self, now: TimeStep) -> MarketResult<()> {
        self.clear_with_reference(now, None)
    }

    /// As [`Self::clear`], but with an optional reference-load estimate
    /// injected as an unresponsive price-cap demand bid before sorting
    /// (§4.2 step 1).
    pub fn clear_with_reference(&mut self, now: TimeStep, reference: Option<ReferenceLoadEstimate>) -> MarketResult<()> {
        let mut buyer_total_unrep = 0.0;
        let mut cap_ref_unrep = 0.0;
        if let Some(r) = reference {
            if self.config.capacity_reference_enabled && !matches!(self.config.special_mode, SpecialMode::FixedBuyer) {
                let sum_on = self.buy.total_on();
                let sum_unknown = self.buy.total_unknown();
                let scaled_load = r.reference_load * self.config.capacity_reference_scale;
                let unresp = scaled_load - sum_on - 0.5 * sum_unknown;
                cap_ref_unrep = r.reference_load;
                if unresp > 0.0 {
                    buyer_total_unrep = unresp;
                    self.buy.submit(Bid::new("capacity_reference", -unresp, self.config.price_cap, BidState::Unknown));
                }
            }
        }

        match self.config.special_mode {
            SpecialMode::FixedSeller => {
                let price = self.config.fixed_price.unwrap_or(0.0);
                let quantity = self.config.fixed_quantity.unwrap_or(0.0);
                if quantity > 0.0 {
                    self.sell.submit(Bid::new("fixed_seller", quantity, price, BidState::Unknown));
                }
            }
            SpecialMode::FixedBuyer => {
                let price = self.config.fixed_price.unwrap_or(0.0);
                let quantity = self.config.fixed_quantity.unwrap_or(0.0);
                if quantity > 0.0 {
                    self.buy.submit(Bid::new("fixed_buyer", -quantity, price, BidState::Unknown));
                }
            }
            SpecialMode::SellersOnly | SpecialMode::BuyersOnly | SpecialMode::None => {}
        }

        self.sell.sort(false);
        self.buy.sort(true);

        let mut result = match self.config.special_mode {
            SpecialMode::SellersOnly => self.clear_one_sided(Side::Sell),
            SpecialMode::BuyersOnly => self.clear_one_sided(Side::Buy),
            SpecialMode::FixedSeller | SpecialMode::FixedBuyer | SpecialMode::None => self.clear_double_sided(),
        };

        // §4.2 step 6 degenerate cases tied to the unresponsive-load bid:
        // the market failing to clear at least the unresponsive demand (or
        // clearing only the unresponsive demand) signals a capacity
        // shortfall rather than an ordinary price-split.
        if buyer_total_unrep > 0.0 {
            if result.quantity < buyer_total_unrep {
                result = ClearResult {
                    quantity: result.quantity,
                    price: self.config.price_cap,
                    clearing_type: ClearingType::Failure,
                };
            } else if (result.quantity - buyer_total_unrep).abs() < self.config.bid_offset {
                result = ClearResult {
                    quantity: result.quantity,
                    price: 0.0,
                    clearing_type: ClearingType::Price,
                };
            }
        }

        let price = result.price.clamp(-self.config.price_cap, self.config.price_cap);
        self.price_history.push(price);

        let (marginal_quantity, total_marginal_quantity, marginal_frac) =
            self.marginal_share(result.quantity, price, result.clearing_type);

        // The frame's start/end describe the window during which this
        // cleared result is the active dispatch window, which latency
        // pushes `config.latency` seconds past the clearing instant (§8
        // scenario 4); `pop_ready` gates exposure on this shifted time.
        let applicable_start = now + self.config.latency;
        let frame = MarketFrame {
            market_id: self.market_id,
            start_time: applicable_start,
            end_time: applicable_start + self.config.period,
            clearing_price: price,
            clearing_quantity: result.quantity,
            clearing_type: result.clearing_type,
            marginal_quantity,
            total_marginal_quantity,
            marginal_frac,
            seller_total_quantity: self.sell.total(),
            buyer_total_quantity: self.buy.total(),
            seller_min_price: self.sell.min_price().unwrap_or(0.0),
            buyer_total_unrep,
            cap_ref_unrep,
        };

        if let Some(log) = self.txn_log.as_mut() {
            for bid in self.sell.sorted().cloned().collect::<Vec<_>>() {
                log.record_bid(self.market_id, now, &bid);
            }
            for bid in self.buy.sorted().cloned().collect::<Vec<_>>() {
                log.record_bid(self.market_id, now, &bid);
            }
        }
        if let Some(log) = self.curve_log.as_mut() {
            let offers: Vec<Bid> = self.sell.sorted().cloned().collect();
            let asks: Vec<Bid> = self.buy.sorted().cloned().collect();
            let annotation = format!(
                "total={} total_on={} total_off={}",
                self.buy.total() + self.sell.total(),
                self.buy.total_on() + self.sell.total_on(),
                self.buy.total_off() + self.sell.total_off()
            );
            log.record_curve(self.market_id, now, offers.into_iter(), asks.into_iter(), Some(&annotation));
        }

        self.ring.push(frame.clone())?;
        self.cleared_frame = Some(frame);

        self.market_id += 1;
        self.buy.clear();
        self.sell.clear();
        Ok(())
    }

    /// Pop ready frames and recompute statistics (§4.2 step 9).
    pub fn pop_ready(&mut self, now: TimeStep) {
        while let Some(front) = self.ring.peek_front() {
            if front.start_time > now {
                break;
            }
            let frame = self.ring.pop().expect("peeked frame must pop");
            self.past_frame = self.current_frame.take();
            self.current_frame = Some(frame);
        }
        if let Some(front) = self.ring.peek_front() {
            if front.start_time > now && front.start_time <= now + self.config.period {
                self.next_frame = Some(front.clone());
            }
        }
        for stat in self.stats.iter_mut() {
            self.price_history.update(
                stat,
                self.config.period,
                self.config.ignore_pricecap,
                self.config.price_cap,
                self.config.init_stdev,
            );
        }
    }

    fn clear_one_sided(&self, side: Side) -> ClearResult {
        let curve = match side {
            Side::Sell => &self.sell,
            Side::Buy => &self.buy,
        };
        let target = self.config.fixed_quantity.unwrap_or(0.0);
        if target <= 0.0 {
            if let Some(price_target) = self.config.fixed_price {
                let mut quantity = 0.0;
                let mut last_price = 0.0;
                let mut any = false;
                for bid in curve.sorted() {
                    let on_side = if side == Side::Sell { bid.price <= price_target } else { bid.price >= price_target };
                    if on_side {
                        quantity += bid.quantity.abs();
                        last_price = bid.price;
                        any = true;
                    }
                }
                return ClearResult {
                    quantity,
                    price: if any { last_price } else { 0.0 },
                    clearing_type: if any { ClearingType::Exact } else { ClearingType::Null },
                };
            }
            return ClearResult { quantity: 0.0, price: 0.0, clearing_type: ClearingType::Null };
        }
        let mut acc = 0.0;
        let mut last_price = 0.0;
        for bid in curve.sorted() {
            acc += bid.quantity.abs();
            last_price = bid.price;
            if acc >= target {
                break;
            }
        }
        let clearing_type = if acc > target {
            if side == Side::Sell { ClearingType::MarginalSeller } else { ClearingType::MarginalBuyer }
        } else if (acc - target).abs() < f64::EPSILON {
            ClearingType::Exact
        } else {
            ClearingType::Failure
        };
        ClearResult {
            quantity: acc.min(target),
            price: last_price,
            clearing_type,
        }
    }

    /// Core double-sided walk (§4.2 step 4-6). `sell` is ascending,
    /// `buy` is descending, matching the curve's `sort` convention.
    fn clear_double_sided(&self) -> ClearResult {
        let sellers: Vec<&Bid> = self.sell.sorted().collect();
        let buyers: Vec<&Bid> = self.buy.sorted().collect();

        if sellers.is_empty() && buyers.is_empty() {
            return ClearResult { quantity: 0.0, price: 0.0, clearing_type: ClearingType::Null };
        }
        if sellers.is_empty() {
            // only demand present: raise price to entice supply
            let price = buyers[0].price + self.config.bid_offset;
            return ClearResult { quantity: 0.0, price, clearing_type: ClearingType::Null };
        }
        if buyers.is_empty() {
            // only supply present: lower price to entice demand
            let price = sellers[0].price - self.config.bid_offset;
            return ClearResult { quantity: 0.0, price, clearing_type: ClearingType::Null };
        }

        let (mut i, mut j) = (0usize, 0usize);
        let (mut demand_cum, mut supply_cum) = (0.0f64, 0.0f64);
        let mut last_quantity = 0.0;
        let mut last_type = ClearingType::Null;
        let (mut a, mut b) = (0.0f64, 0.0f64);
        let mut check = false;

        while i < buyers.len() && j < sellers.len() {
            let buy_price = buyers[i].price;
            let sell_price = sellers[j].price;
            if buy_price < sell_price {
                break;
            }
            let demand_after = demand_cum + buyers[i].quantity.abs();
            let supply_after = supply_cum + sellers[j].quantity.abs();

            if demand_after > supply_after {
                last_quantity = supply_after;
                a = buy_price;
                b = buy_price;
                last_type = ClearingType::MarginalBuyer;
                check = false;
                demand_cum = supply_after;
                supply_cum = supply_after;
                j += 1;
            } else if demand_after < supply_after {
                last_quantity = demand_after;
                a = sell_price;
                b = sell_price;
                last_type = ClearingType::MarginalSeller;
                check = false;
                demand_cum = demand_after;
                supply_cum = demand_after;
                i += 1;
            } else {
                demand_cum = demand_after;
                supply_cum = supply_after;
                last_quantity = demand_after;
                a = buy_price;
                b = sell_price;
                check = true;
                last_type = ClearingType::Exact;
                i += 1;
                j += 1;
            }
        }

        if last_quantity <= 0.0 {
            let price = self.zero_overlap_price(&sellers, &buyers);
            return ClearResult { quantity: 0.0, price, clearing_type: ClearingType::Null };
        }

        let (price, clearing_type) = if check {
            self.resolve_price_split(&sellers, &buyers, i, j, a, b)
        } else {
            (a, last_type)
        };

        ClearResult { quantity: last_quantity, price, clearing_type }
    }

    /// Neither curve exhausts the other (§4.2 step 6, "zero cleared quantity
    /// but one side present" with both curves non-empty): split the gap
    /// between the best seller and best buyer by `clearing_scalar`, unless
    /// one of them has already saturated the price cap, in which case the
    /// cap-holder's price is ignored in favour of the other side's best bid.
    fn zero_overlap_price(&self, sellers: &[&Bid], buyers: &[&Bid]) -> f64 {
        let cap = self.config.price_cap;
        if sellers[0].price == cap {
            buyers[0].price + self.config.bid_offset
        } else if buyers[0].price == -cap {
            sellers[0].price - self.config.bid_offset
        } else {
            sellers[0].price + (buyers[0].price - sellers[0].price) * self.config.clearing_scalar
        }
    }

    /// Resolve the clearing price/type when the walk stopped on a
    /// price-split (§4.2 step 5): `a`/`b` are the last matched buy/sell
    /// prices, `i`/`j` the walk's stopping indices into `buyers`/`sellers`.
    ///
    /// First determines which side is "tightest": if one side is exhausted
    /// but the other still has untried bids sitting at the same price,
    /// that side is still marginal and its price stands. Only when neither
    /// side can be singled out does the type fall to `Price`, whose price
    /// is the cap-saturation heuristic (midpoint of the next untried bids,
    /// nudged by `bid_offset`) if either side is pinned at the cap, else
    /// the `clearing_scalar` split between `a` and `b`.
    fn resolve_price_split(&self, sellers: &[&Bid], buyers: &[&Bid], i: usize, j: usize, a: f64, b: f64) -> (f64, ClearingType) {
        let next_buy = buyers.get(i).map(|bid| bid.price);
        let next_sell = sellers.get(j).map(|bid| bid.price);
        let buyers_exhausted = next_buy.is_none();
        let sellers_exhausted = next_sell.is_none();

        let clearing_type = if a == b {
            ClearingType::Exact
        } else if sellers_exhausted && next_buy == Some(a) {
            ClearingType::MarginalBuyer
        } else if buyers_exhausted && next_sell == Some(b) {
            ClearingType::MarginalSeller
        } else {
            ClearingType::Price
        };

        let price = match clearing_type {
            ClearingType::MarginalBuyer => a,
            ClearingType::MarginalSeller => b,
            ClearingType::Exact => a,
            ClearingType::Price => self.price_split_heuristic(a, b, next_buy, next_sell),
            _ => a,
        };

        (price, clearing_type)
    }

    fn price_split_heuristic(&self, a: f64, b: f64, next_buy: Option<f64>, next_sell: Option<f64>) -> f64 {
        let cap = self.config.price_cap;
        let offset = self.config.bid_offset;
        if a == cap && b == -cap {
            let high = next_buy.unwrap_or(a);
            let low = next_sell.unwrap_or(b);
            (high + low) / 2.0
        } else if a == cap {
            match next_buy {
                Some(nb) if nb > b => nb + offset,
                _ => b,
            }
        } else if b == -cap {
            match next_sell {
                Some(ns) if ns < a => ns - offset,
                _ => a,
            }
        } else {
            b + self.config.clearing_scalar * (a - b)
        }
    }

    /// Marginal share computation (§4.2 step 7).
    fn marginal_share(&self, clearing_quantity: f64, price: f64, clearing_type: ClearingType) -> (f64, f64, f64) {
        let curve = match clearing_type {
            ClearingType::MarginalBuyer => Some(&self.buy),
            ClearingType::MarginalSeller => Some(&self.sell),
            _ => None,
        };
        let Some(curve) = curve else {
            return (0.0, 0.0, 0.0);
        };
        let mut subtotal_strict_above = 0.0;
        let mut at_price = 0.0;
        for bid in curve.sorted() {
            let strictly_better = match clearing_type {
                ClearingType::MarginalBuyer => bid.price > price,
                ClearingType::MarginalSeller => bid.price < price,
                _ => false,
            };
            if strictly_better {
                subtotal_strict_above += bid.quantity.abs();
            } else if (bid.price - price).abs() < self.config.bid_offset {
                at_price += bid.quantity.abs();
            }
        }
        let marginal_quantity = (clearing_quantity - subtotal_strict_above).max(0.0);
        let marginal_frac = if at_price > 0.0 { marginal_quantity / at_price } else { 0.0 };
        (marginal_quantity, at_price, marginal_frac)
    }
}

/// A collaborator-facing handle around [`AuctionEngine`] guarded by a
/// `parking_lot::RwLock`, matching §5's "the auction uses a write lock
/// around `submit`" and "the `submit` entrypoint must remain reentrant":
/// any number of controllers/generators can call [`Self::submit`] from
/// their own bottom-up pass without the host needing to serialize them
/// itself. Clearing and the latency-ring pop take the same write lock,
/// since they mutate the same curves `submit` appends to.
pub struct SharedAuctionEngine {
    inner: RwLock<AuctionEngine>,
}

impl SharedAuctionEngine {
    pub fn new(engine: AuctionEngine) -> Self {
        Self { inner: RwLock::new(engine) }
    }

    /// Reentrant: acquires the write lock for the duration of one
    /// submission only, so concurrent callers interleave bid-by-bid rather
    /// than blocking for an entire clearing pass.
    pub fn submit(&self, now: TimeStep, bidder: &str, quantity: f64, price: f64, key: BidKey, state: BidState) -> SubmitOutcome {
        self.inner.write().submit(now, bidder, quantity, price, key, state)
    }

    pub fn clear(&self, now: TimeStep) -> MarketResult<()> {
        self.inner.write().clear(now)
    }

    pub fn clear_with_reference(&self, now: TimeStep, reference: Option<ReferenceLoadEstimate>) -> MarketResult<()> {
        self.inner.write().clear_with_reference(now, reference)
    }

    pub fn pop_ready(&self, now: TimeStep) {
        self.inner.write().pop_ready(now)
    }

    /// Snapshot of the current frame, cloned out from under the read lock
    /// so callers (controllers reading price/stats) never block a writer
    /// longer than a single clone.
    pub fn current_frame(&self) -> Option<MarketFrame> {
        self.inner.read().current_frame.clone()
    }

    pub fn market_id(&self) -> u64 {
        self.inner.read().market_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bid::NEW_BID;
    use crate::config::MarketConfig;

    fn engine() -> AuctionEngine {
        AuctionEngine::new(MarketConfig { warmup_seconds: 0, ..Default::default() }, 0, &[])
    }

    #[test]
    fn exact_match_clears_at_common_price() {
        let mut mkt = engine();
        mkt.submit(0, "seller", 100.0, 30.0, NEW_BID, BidState::Unknown);
        mkt.submit(0, "buyer", -100.0, 30.0, NEW_BID, BidState::Unknown);
        mkt.clear(0).unwrap();
        let frame = mkt.cleared_frame.clone().unwrap();
        assert_eq!(frame.clearing_price, 30.0);
        assert_eq!(frame.clearing_quantity, 100.0);
        assert_eq!(frame.clearing_type, ClearingType::Exact);
    }

    #[test]
    fn price_split_stalemate_applies_clearing_scalar() {
        let mut mkt = engine();
        mkt.submit(0, "seller", 100.0, 25.0, NEW_BID, BidState::Unknown);
        mkt.submit(0, "buyer", -100.0, 35.0, NEW_BID, BidState::Unknown);
        mkt.clear(0).unwrap();
        let frame = mkt.cleared_frame.clone().unwrap();
        assert_eq!(frame.clearing_quantity, 100.0);
        assert!((frame.clearing_price - 30.0).abs() < 1e-9);
        assert_eq!(frame.clearing_type, ClearingType::Price);
    }

    #[test]
    fn demand_exceeds_supply_is_marginal_buyer() {
        let mut mkt = engine();
        mkt.submit(0, "seller", 50.0, 20.0, NEW_BID, BidState::Unknown);
        mkt.submit(0, "buyer", -100.0, 40.0, NEW_BID, BidState::Unknown);
        mkt.clear(0).unwrap();
        let frame = mkt.cleared_frame.clone().unwrap();
        assert_eq!(frame.clearing_quantity, 50.0);
        assert_eq!(frame.clearing_price, 40.0);
        assert_eq!(frame.clearing_type, ClearingType::MarginalBuyer);
        assert_eq!(frame.marginal_quantity, 50.0);
        assert_eq!(frame.buyer_total_quantity, 100.0);
    }

    #[test]
    fn warmup_drops_demand_bids() {
        let mut mkt = AuctionEngine::new(MarketConfig::default(), 0, &[]);
        let outcome = mkt.submit(600, "buyer", -50.0, 10.0, NEW_BID, BidState::Unknown);
        assert_eq!(outcome, SubmitOutcome::WarmupDropped);
    }

    #[test]
    fn latency_two_periods_delays_current_frame() {
        let mut mkt = AuctionEngine::new(
            MarketConfig { period: 300, latency: 600, warmup_seconds: 0, ..Default::default() },
            0,
            &[],
        );
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
        assert_eq!(mkt.next_frame().unwrap().market_id, 0);
        assert_eq!(mkt.next_frame().unwrap().start_time, 600);

        mkt.pop_ready(600);
        assert_eq!(mkt.current_frame().unwrap().market_id, 0);
        assert_eq!(mkt.current_frame().unwrap().end_time, 900);
    }

    #[test]
    fn resubmission_updates_same_slot() {
        let mut mkt = engine();
        let key = mkt.submit(0, "seller", 10.0, 5.0, NEW_BID, BidState::Unknown).as_key();
        let outcome = mkt.submit(0, "seller", 20.0, 6.0, key, BidState::Unknown);
        assert!(matches!(outcome, SubmitOutcome::Resubmitted(_)));
        assert_eq!(mkt.sell.total(), 20.0);
    }

    #[test]
    fn past_market_key_is_ignored() {
        let mut mkt = engine();
        let key = mkt.submit(0, "seller", 10.0, 5.0, NEW_BID, BidState::Unknown).as_key();
        mkt.submit(0, "buyer", -10.0, 5.0, NEW_BID, BidState::Unknown);
        mkt.clear(0).unwrap();
        let outcome = mkt.submit(300, "seller", 10.0, 5.0, key, BidState::Unknown);
        assert_eq!(outcome, SubmitOutcome::IgnoredPastMarket);
    }

    #[test]
    fn reference_load_alone_clears_at_zero_price() {
        // §4.2 step 6: when only the injected unresponsive bid clears
        // (no other demand), the result is PRICE at 0, not the seller's ask.
        let mut mkt = AuctionEngine::new(
            MarketConfig { warmup_seconds: 0, capacity_reference_enabled: true, ..Default::default() },
            0,
            &[],
        );
        mkt.submit(0, "seller", 100.0, 30.0, NEW_BID, BidState::Unknown);
        mkt.clear_with_reference(0, Some(ReferenceLoadEstimate::new(40.0))).unwrap();
        let frame = mkt.cleared_frame.clone().unwrap();
        assert_eq!(frame.cap_ref_unrep, 40.0);
        assert_eq!(frame.buyer_total_unrep, 40.0);
        assert_eq!(frame.clearing_quantity, 40.0);
        assert_eq!(frame.clearing_price, 0.0);
        assert_eq!(frame.clearing_type, ClearingType::Price);
    }

    #[test]
    fn reference_load_shortfall_fails_at_price_cap() {
        let mut mkt = AuctionEngine::new(
            MarketConfig { warmup_seconds: 0, capacity_reference_enabled: true, ..Default::default() },
            0,
            &[],
        );
        mkt.submit(0, "seller", 10.0, 30.0, NEW_BID, BidState::Unknown);
        mkt.clear_with_reference(0, Some(ReferenceLoadEstimate::new(40.0))).unwrap();
        let frame = mkt.cleared_frame.clone().unwrap();
        assert_eq!(frame.clearing_type, ClearingType::Failure);
        assert_eq!(frame.clearing_price, mkt.config.price_cap);
    }

    #[test]
    fn reference_load_skipped_in_fixed_buyer_mode() {
        let mut mkt = AuctionEngine::new(
            MarketConfig {
                warmup_seconds: 0,
                capacity_reference_enabled: true,
                special_mode: SpecialMode::FixedBuyer,
                fixed_price: Some(30.0),
                fixed_quantity: Some(10.0),
                ..Default::default()
            },
            0,
            &[],
        );
        mkt.submit(0, "seller", 10.0, 30.0, NEW_BID, BidState::Unknown);
        mkt.clear_with_reference(0, Some(ReferenceLoadEstimate::new(40.0))).unwrap();
        let frame = mkt.cleared_frame.clone().unwrap();
        assert_eq!(frame.buyer_total_unrep, 0.0);
        assert_eq!(frame.clearing_quantity, 10.0);
    }

    #[test]
    fn fixed_seller_mode_injects_single_supply_bid() {
        let mut mkt = AuctionEngine::new(
            MarketConfig {
                warmup_seconds: 0,
                special_mode: SpecialMode::FixedSeller,
                fixed_price: Some(30.0),
                fixed_quantity: Some(100.0),
                ..Default::default()
            },
            0,
            &[],
        );
        mkt.submit(0, "buyer", -100.0, 30.0, NEW_BID, BidState::Unknown);
        mkt.clear(0).unwrap();
        let frame = mkt.cleared_frame.clone().unwrap();
        assert_eq!(frame.clearing_quantity, 100.0);
        assert_eq!(frame.clearing_type, ClearingType::Exact);
    }

    #[test]
    fn shared_engine_submit_is_reentrant_across_collaborators() {
        let shared = SharedAuctionEngine::new(AuctionEngine::new(
            MarketConfig { warmup_seconds: 0, ..Default::default() },
            0,
            &[],
        ));
        // two independent "collaborators" each acquire the write lock for
        // just their own submission, as §5 requires.
        shared.submit(0, "seller", 100.0, 30.0, NEW_BID, BidState::Unknown);
        shared.submit(0, "buyer", -100.0, 30.0, NEW_BID, BidState::Unknown);
        shared.clear(0).unwrap();
        shared.pop_ready(0);
        let frame = shared.current_frame().unwrap();
        assert_eq!(frame.clearing_price, 30.0);
        assert_eq!(frame.clearing_quantity, 100.0);
    }
}
