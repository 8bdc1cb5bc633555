use crate::collaborators::PaymentType;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round half away from zero to whole currency units; negatives floor at 0.
pub fn round_to_units(amount: Decimal) -> u64 {
    if amount <= Decimal::ZERO {
        return 0;
    }
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .unwrap_or(u64::MAX)
}

/// Payment owed for one clip.
///
/// - FIXED: `base_pay`
/// - PAY_PER_VIEW: `views × reward_per_view`
/// - HYBRID: `base_pay + views × reward_per_view`
/// - unknown: 0
///
/// A positive `limit_per_clip` caps the result.
pub fn calculate_clip_payment(
    views: u64,
    payment_type: PaymentType,
    base_pay: Decimal,
    reward_per_view: Decimal,
    limit_per_clip: Option<u64>,
) -> u64 {
    let view_pay = || {
        Decimal::from(views)
            .checked_mul(reward_per_view)
            .unwrap_or(Decimal::MAX)
    };

    let raw = match payment_type {
        PaymentType::Fixed => base_pay,
        PaymentType::PayPerView => view_pay(),
        PaymentType::Hybrid => base_pay.checked_add(view_pay()).unwrap_or(Decimal::MAX),
        PaymentType::Unknown => {
            tracing::warn!("unknown payment type, paying 0");
            Decimal::ZERO
        }
    };

    let capped = match limit_per_clip {
        Some(limit) if limit > 0 && raw > Decimal::from(limit) => Decimal::from(limit),
        _ => raw,
    };

    round_to_units(capped)
}

/// Platform fee on `gross`: `round(gross × fee_percent / 100)`, never more than `gross`.
pub fn platform_fee(gross: u64, fee_percent: Decimal) -> u64 {
    let fee = Decimal::from(gross)
        .checked_mul(fee_percent)
        .map(|v| v / Decimal::ONE_HUNDRED)
        .unwrap_or(Decimal::ZERO);
    round_to_units(fee).min(gross)
}
