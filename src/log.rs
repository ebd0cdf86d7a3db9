//! Transaction and curve logs (§5, §6, §10.5).
//!
//! Append-only CSV, opened lazily on first write and closed once the
//! caller-specified event budget is exhausted; further writes are then
//! silently dropped rather than erroring (§5 resource lifecycle).

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use csv::Writer;

use crate::bid::{Bid, BidState};
use crate::clock::TimeStep;

fn state_label(state: BidState) -> &'static str {
    match state {
        BidState::Unknown => "UNKNOWN",
        BidState::Off => "OFF",
        BidState::On => "ON",
    }
}

/// `market_id,timestamp,bidder_name,bid_price,bid_quantity,bid_state` log,
/// one row per bid considered during clearing (§6).
pub struct TransactionLog {
    path: PathBuf,
    writer: Option<Writer<std::fs::File>>,
    budget: i64,
}

impl TransactionLog {
    pub fn new(path: impl Into<PathBuf>, budget: i64) -> Self {
        Self {
            path: path.into(),
            writer: None,
            budget,
        }
    }

    fn ensure_open(&mut self) -> std::io::Result<&mut Writer<std::fs::File>> {
        if self.writer.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            let mut writer = Writer::from_writer(file);
            writer.write_record(["# market_id,timestamp,bidder_name,bid_price,bid_quantity,bid_state"])?;
            self.writer = Some(writer);
        }
        Ok(self.writer.as_mut().unwrap())
    }

    /// Record one bid. No-op once the budget has been exhausted.
    pub fn record_bid(&mut self, market_id: u64, timestamp: TimeStep, bid: &Bid) {
        if self.budget <= 0 {
            return;
        }
        let Ok(writer) = self.ensure_open() else {
            tracing::warn!(path = %self.path.display(), "failed to open transaction log");
            self.budget = 0;
            return;
        };
        let _ = writer.write_record([
            market_id.to_string(),
            timestamp.to_string(),
            bid.bidder_id.clone(),
            bid.price.to_string(),
            bid.quantity.to_string(),
            state_label(bid.state).to_string(),
        ]);
        self.budget -= 1;
        if self.budget <= 0 {
            if let Some(w) = self.writer.as_mut() {
                let _ = w.flush();
            }
            self.writer = None;
        }
    }
}

/// `market_id,timestamp,sort_index,bidder_name,bid_quantity,bid_price` log
/// for the sorted offer and ask curves, with extra annotation lines when
/// verbose (§6).
pub struct CurveLog {
    path: PathBuf,
    writer: Option<Writer<std::fs::File>>,
    budget: i64,
    verbose: bool,
}

impl CurveLog {
    pub fn new(path: impl Into<PathBuf>, budget: i64, verbose: bool) -> Self {
        Self {
            path: path.into(),
            writer: None,
            budget,
            verbose,
        }
    }

    fn ensure_open(&mut self) -> std::io::Result<&mut Writer<std::fs::File>> {
        if self.writer.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            let mut writer = Writer::from_writer(file);
            writer.write_record(["# market_id,timestamp,sort_index,bidder_name,bid_quantity,bid_price"])?;
            self.writer = Some(writer);
        }
        Ok(self.writer.as_mut().unwrap())
    }

    /// Record the offer curve (sells) then the ask curve (buys) in sorted
    /// order, with an optional trailing annotation line.
    pub fn record_curve(
        &mut self,
        market_id: u64,
        timestamp: TimeStep,
        offers: impl Iterator<Item = Bid>,
        asks: impl Iterator<Item = Bid>,
        annotation: Option<&str>,
    ) {
        if self.budget <= 0 {
            return;
        }
        let Ok(writer) = self.ensure_open() else {
            tracing::warn!(path = %self.path.display(), "failed to open curve log");
            self.budget = 0;
            return;
        };
        let mut idx = 0u32;
        for bid in offers.chain(asks) {
            if self.budget <= 0 {
                break;
            }
            let _ = writer.write_record([
                market_id.to_string(),
                timestamp.to_string(),
                idx.to_string(),
                bid.bidder_id.clone(),
                bid.quantity.to_string(),
                bid.price.to_string(),
            ]);
            idx += 1;
            self.budget -= 1;
        }
        if self.verbose {
            if let Some(line) = annotation {
                let _ = writer.write_record([format!("# {line}")]);
            }
        }
        if self.budget <= 0 {
            if let Some(w) = self.writer.as_mut() {
                let _ = w.flush();
            }
            self.writer = None;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bid::BidState;

    #[test]
    fn transaction_log_writes_and_respects_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txn.csv");
        let mut log = TransactionLog::new(&path, 1);
        let bid = Bid::new("alice", -10.0, 30.0, BidState::On);
        log.record_bid(0, 0, &bid);
        log.record_bid(0, 300, &bid);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2); // header + one row, budget exhausted after
    }

    #[test]
    fn curve_log_writes_offers_then_asks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curve.csv");
        let mut log = CurveLog::new(&path, 10, false);
        let sell = Bid::new("seller", 10.0, 20.0, BidState::Unknown);
        let buy = Bid::new("buyer", -10.0, 25.0, BidState::Unknown);
        log.record_curve(0, 0, std::iter::once(sell), std::iter::once(buy), None);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("seller"));
        assert!(contents.contains("buyer"));
    }
}
