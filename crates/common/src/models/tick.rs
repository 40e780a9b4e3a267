use chrono::{DateTime, Utc};

/// One observed trade event for a symbol. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub price: f64,
    pub volume: i64,
    pub observed_at: DateTime<Utc>,
}

impl Tick {
    pub fn new(price: f64, volume: i64, observed_at: DateTime<Utc>) -> Self {
        Self {
            price,
            volume,
            observed_at,
        }
    }
}

/// Aggregated top-of-book volumes for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderbookSnapshot {
    pub bid_volume_total: i64,
    pub ask_volume_total: i64,
    pub ratio: f64,
    pub observed_at: DateTime<Utc>,
}

impl OrderbookSnapshot {
    pub fn new(bid_volume_total: i64, ask_volume_total: i64, observed_at: DateTime<Utc>) -> Self {
        let ratio = if ask_volume_total > 0 {
            bid_volume_total as f64 / ask_volume_total as f64
        } else {
            0.0
        };
        Self {
            bid_volume_total,
            ask_volume_total,
            ratio,
            observed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orderbook_ratio_zero_when_no_asks() {
        let snap = OrderbookSnapshot::new(500, 0, Utc::now());
        assert_eq!(snap.ratio, 0.0);

        let snap = OrderbookSnapshot::new(300, 200, Utc::now());
        assert!((snap.ratio - 1.5).abs() < f64::EPSILON);
    }
}
