use tracing::info;

use common::config::RiskParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedOrder {
    pub quantity: u32,
    pub clamped: bool,
}

/// Notional available to one buy sweep: a configured share of the deposit
/// balance. None when the computed balance is not positive, which skips
/// the whole sweep.
pub fn sweep_notional(cash_balance: f64, risk: &RiskParams) -> Option<f64> {
    if cash_balance <= 0.0 {
        return None;
    }
    Some(cash_balance * risk.deposit_ratio)
}

/// Converts a notional into a share quantity: floor division, minimum 1,
/// then clamped so the order value never exceeds the hard ceiling. None
/// when even a single share breaches the ceiling or the price is invalid.
pub fn size_order(notional: f64, price: f64, risk: &RiskParams) -> Option<SizedOrder> {
    if price <= 0.0 {
        return None;
    }
    let quantity = ((notional / price).floor() as u32).max(1);
    if quantity as f64 * price <= risk.max_order_value {
        return Some(SizedOrder {
            quantity,
            clamped: false,
        });
    }
    let clamped = (risk.max_order_value / price).floor() as u32;
    if clamped == 0 {
        return None;
    }
    info!(
        "order value over ceiling, quantity clamped {} -> {}",
        quantity, clamped
    );
    Some(SizedOrder {
        quantity: clamped,
        clamped: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_notional_is_half_the_deposit() {
        let risk = RiskParams::default();
        assert_eq!(sweep_notional(1_000_000.0, &risk), Some(500_000.0));
        assert_eq!(sweep_notional(0.0, &risk), None);
        assert_eq!(sweep_notional(-5.0, &risk), None);
    }

    #[test]
    fn quantity_is_floored_with_minimum_one() {
        let risk = RiskParams::default();
        let sized = size_order(250_000.0, 70_000.0, &risk).unwrap();
        assert_eq!(sized.quantity, 3);
        assert!(!sized.clamped);

        // notional below one share still orders one share
        let sized = size_order(10_000.0, 70_000.0, &risk).unwrap();
        assert_eq!(sized.quantity, 1);
    }

    #[test]
    fn order_value_is_clamped_to_the_ceiling() {
        let risk = RiskParams::default();
        // unclamped quantity 60 would be a 6,000,000 order
        let sized = size_order(6_000_000.0, 100_000.0, &risk).unwrap();
        assert_eq!(sized.quantity, 50);
        assert!(sized.clamped);
        assert!(sized.quantity as f64 * 100_000.0 <= risk.max_order_value);
    }

    #[test]
    fn unaffordable_single_share_is_rejected() {
        let risk = RiskParams {
            max_order_value: 50_000.0,
            ..RiskParams::default()
        };
        assert_eq!(size_order(100_000.0, 70_000.0, &risk), None);
        assert_eq!(size_order(100_000.0, 0.0, &risk), None);
    }
}
