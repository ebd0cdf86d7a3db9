//! Rolling price statistics (§3, §4.2 step 9).
//!
//! A `PriceHistory` is a fixed-length circular buffer of cleared prices.
//! Each `Statistic` describes a named rolling mean or standard deviation
//! over a window of that history, discovered at init time by parsing
//! property names of the form `<frame>_price_<stat>_<N><unit>`.

use serde::{Deserialize, Serialize};

/// Which frame a statistic's window is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatMode {
    Current,
    Past,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatType {
    Mean,
    Stdev,
}

/// A single rolling statistic tracked by the auction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistic {
    pub name: String,
    pub mode: StatMode,
    pub stat_type: StatType,
    pub interval_seconds: i64,
    pub value: f64,
}

/// Parse `<frame>_price_<stat>_<N><unit>` into mode/type/interval (seconds),
/// rounding the interval down to the nearest positive multiple of `period`
/// and warning once if rounding occurred (§3, §7 RangeWarning).
pub fn parse_statistic_name(raw: &str, period: i64) -> Option<(StatMode, StatType, i64)> {
    let parts: Vec<&str> = raw.splitn(4, '_').collect();
    if parts.len() != 4 {
        return None;
    }
    let (frame, price, stat, period_field) = (parts[0], parts[1], parts[2], parts[3]);
    if price != "price" {
        return None;
    }
    let mode = match frame {
        "past" => StatMode::Past,
        "current" => StatMode::Current,
        _ => return None,
    };
    let stat_type = match stat {
        "mean" => StatType::Mean,
        "stdev" => StatType::Stdev,
        _ => return None,
    };
    let split_at = period_field.find(|c: char| c.is_ascii_alphabetic());
    let (digits, unit) = match split_at {
        Some(i) => (&period_field[..i], &period_field[i..]),
        None => (period_field, ""),
    };
    let mut interval: i64 = digits.parse().ok()?;
    if interval <= 0 {
        tracing::warn!(name = raw, "market statistic interval is not positive, skipping");
        return None;
    }
    match unit {
        "" => {}
        "s" => {}
        "m" => interval *= 60,
        "h" => interval *= 3600,
        "d" => interval *= 86_400,
        "w" => interval *= 604_800,
        other => {
            tracing::warn!(name = raw, unit = other, "market statistic period scalar not recognized");
        }
    }
    if period > 0 && interval % period != 0 {
        let rounded = (interval / period).max(1) * period;
        tracing::warn!(name = raw, interval, rounded, "statistic interval is not a multiple of period, rounding down");
        interval = rounded;
    }
    Some((mode, stat_type, interval))
}

/// Fixed-length circular buffer of cleared prices, sized to the longest
/// configured statistic's window (§4.2 init).
#[derive(Debug, Clone)]
pub struct PriceHistory {
    buffer: Vec<f64>,
    /// Index the next price will be written to; mirrors the source's `price_index`.
    price_index: usize,
    total_samples: u64,
}

impl PriceHistory {
    pub fn new(len: usize, init_price: f64) -> Self {
        Self {
            buffer: vec![init_price; len.max(1)],
            price_index: 0,
            total_samples: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Record a newly cleared price and advance the ring.
    pub fn push(&mut self, price: f64) {
        let n = self.buffer.len();
        self.buffer[self.price_index % n] = price;
        self.price_index = (self.price_index + 1) % n;
        self.total_samples += 1;
    }

    /// Recompute `stat.value` from the current window (§4.2 step 9).
    ///
    /// Standard deviation uses the `N` (population) denominator for
    /// `Current`-mode statistics and `N-1` for `Past`-mode statistics; while
    /// fewer samples than the window requires have accumulated, the stat
    /// reports `init_stdev` rather than a partial computation.
    pub fn update(&self, stat: &mut Statistic, period: i64, ignore_pricecap: bool, pricecap: f64, init_stdev: f64) {
        let history_len = self.buffer.len() as i64;
        if history_len == 0 || period <= 0 {
            return;
        }
        let sample_need = (stat.interval_seconds / period).max(1) as usize;
        let stop: i64 = match stat.mode {
            StatMode::Current => self.price_index as i64,
            StatMode::Past => self.price_index as i64 - 1,
        };
        let start = (((history_len + stop - sample_need as i64) % history_len) + history_len) % history_len;

        let mut mean = 0.0;
        let mut skipped = 0usize;
        for i in 0..sample_need {
            let idx = ((start + i as i64) % history_len) as usize;
            let p = self.buffer[idx];
            if !ignore_pricecap || (p != pricecap && p != -pricecap) {
                mean += p;
            } else {
                skipped += 1;
            }
        }
        mean = if skipped != sample_need { mean / sample_need as f64 } else { 0.0 };

        match stat.stat_type {
            StatType::Mean => stat.value = mean,
            StatType::Stdev => {
                let past_offset = if stat.mode == StatMode::Past { 1 } else { 0 };
                if (sample_need + past_offset) as u64 > self.total_samples {
                    stat.value = init_stdev;
                } else {
                    let mut var = 0.0;
                    for i in 0..sample_need {
                        let idx = ((start + i as i64) % history_len) as usize;
                        let p = self.buffer[idx];
                        if !ignore_pricecap || (p != pricecap && p != -pricecap) {
                            let d = p - mean;
                            var += d * d;
                        }
                    }
                    let denom = match stat.mode {
                        StatMode::Current => sample_need as f64,
                        StatMode::Past => (sample_need.saturating_sub(1)).max(1) as f64,
                    };
                    stat.value = (var / denom).sqrt();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names() {
        let (mode, ty, interval) = parse_statistic_name("current_price_mean_3600s", 300).unwrap();
        assert_eq!(mode, StatMode::Current);
        assert_eq!(ty, StatType::Mean);
        assert_eq!(interval, 3600);

        let (mode, ty, interval) = parse_statistic_name("past_price_stdev_1h", 300).unwrap();
        assert_eq!(mode, StatMode::Past);
        assert_eq!(ty, StatType::Stdev);
        assert_eq!(interval, 3600);
    }

    #[test]
    fn rounds_non_multiple_interval_down() {
        let (_, _, interval) = parse_statistic_name("current_price_mean_400s", 300).unwrap();
        assert_eq!(interval, 300);
    }

    #[test]
    fn rejects_unrelated_property_names() {
        assert!(parse_statistic_name("clearing_price", 300).is_none());
        assert!(parse_statistic_name("current_voltage_mean_300s", 300).is_none());
    }

    #[test]
    fn mean_over_constant_history_is_that_constant() {
        let history = PriceHistory::new(8, 30.0);
        let mut stat = Statistic {
            name: "current_price_mean_300s".into(),
            mode: StatMode::Current,
            stat_type: StatType::Mean,
            interval_seconds: 300,
            value: 0.0,
        };
        history.update(&mut stat, 300, false, 9999.0, 0.0);
        assert_eq!(stat.value, 30.0);
    }

    #[test]
    fn stdev_reports_init_seed_before_window_fills() {
        let history = PriceHistory::new(8, 30.0);
        let mut stat = Statistic {
            name: "current_price_stdev_2400s".into(),
            mode: StatMode::Current,
            stat_type: StatType::Stdev,
            interval_seconds: 2400,
            value: 0.0,
        };
        history.update(&mut stat, 300, false, 9999.0, 7.5);
        assert_eq!(stat.value, 7.5);
    }
}
