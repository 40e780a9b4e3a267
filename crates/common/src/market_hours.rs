use chrono::{Datelike, NaiveDateTime, Weekday};

use crate::config::TradingParams;

/// True while the exchange session is open: a weekday, between the
/// configured open and close (inclusive on both ends).
pub fn is_market_open(now: NaiveDateTime, params: &TradingParams) -> bool {
    if is_weekend(now) {
        return false;
    }
    let t = now.time();
    params.market_open <= t && t <= params.market_close
}

/// True after the close on a trading day; drives the once-per-day
/// close-of-market handling.
pub fn is_past_close(now: NaiveDateTime, params: &TradingParams) -> bool {
    !is_weekend(now) && now.time() > params.market_close
}

fn is_weekend(now: NaiveDateTime) -> bool {
    matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn open_during_weekday_session() {
        let params = TradingParams::default();
        // 2026-08-05 is a Wednesday
        assert!(is_market_open(at(2026, 8, 5, 9, 0), &params));
        assert!(is_market_open(at(2026, 8, 5, 12, 30), &params));
        assert!(is_market_open(at(2026, 8, 5, 15, 30), &params));
        assert!(!is_market_open(at(2026, 8, 5, 8, 59), &params));
        assert!(!is_market_open(at(2026, 8, 5, 15, 31), &params));
    }

    #[test]
    fn closed_on_weekends() {
        let params = TradingParams::default();
        // 2026-08-08 is a Saturday
        assert!(!is_market_open(at(2026, 8, 8, 10, 0), &params));
        assert!(!is_past_close(at(2026, 8, 8, 18, 0), &params));
    }

    #[test]
    fn past_close_only_after_session() {
        let params = TradingParams::default();
        assert!(!is_past_close(at(2026, 8, 5, 15, 30), &params));
        assert!(is_past_close(at(2026, 8, 5, 15, 31), &params));
    }
}
