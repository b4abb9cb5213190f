//! Dynamic pricing for candidate slots.
//!
//! Pure and deterministic: everything, including "now", comes in as an
//! argument. Modifiers apply in a fixed order — same-day fee, peak-hour
//! multiplier, weekend multiplier, emergency surcharge, consultation-type
//! multiplier — and reordering them changes the final price, so the order is
//! part of the business rule.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use lawyer_cell::models::BookingPolicy;
use shared_utils::time::round_half_up_2;

use crate::models::{ConsultationType, PriceModifier, SlotQuote};

const PEAK_HOUR_MULTIPLIER: f64 = 1.15;
const WEEKEND_MULTIPLIER: f64 = 1.10;
const EMERGENCY_SURCHARGE_RATE: f64 = 0.50;

/// Everything needed to price one candidate slot.
#[derive(Debug, Clone)]
pub struct PricingInput<'a> {
    pub start_utc: DateTime<Utc>,
    pub duration_minutes: i64,
    pub consultation_type: ConsultationType,
    pub hourly_rate: f64,
    pub policy: &'a BookingPolicy,
    pub is_emergency: bool,
    pub lawyer_tz: Tz,
    pub now: DateTime<Utc>,
}

pub fn quote_slot(input: &PricingInput<'_>) -> SlotQuote {
    let base_price = round_half_up_2(input.hourly_rate * input.duration_minutes as f64 / 60.0);
    let mut total = base_price;
    let mut modifiers = Vec::new();

    let local_start = input.start_utc.with_timezone(&input.lawyer_tz);
    let hour = local_start.hour();
    let is_weekend = matches!(local_start.weekday(), Weekday::Sat | Weekday::Sun);

    // Same-day fee: flat add, only when the provider allows same-day bookings
    // and the slot starts less than 24h out.
    if input.policy.allow_same_day_booking
        && input.start_utc > input.now
        && input.start_utc - input.now < Duration::hours(24)
        && input.policy.same_day_booking_fee > 0.0
    {
        total += input.policy.same_day_booking_fee;
        modifiers.push(PriceModifier {
            label: "same_day_fee".to_string(),
            amount: input.policy.same_day_booking_fee,
        });
    }

    // Peak hours: weekday evenings and early mornings, lawyer-local.
    if !is_weekend && (hour >= 18 || hour <= 8) {
        let before = total;
        total *= PEAK_HOUR_MULTIPLIER;
        modifiers.push(PriceModifier {
            label: "peak_hour".to_string(),
            amount: round_half_up_2(total - before),
        });
    }

    if is_weekend {
        let before = total;
        total *= WEEKEND_MULTIPLIER;
        modifiers.push(PriceModifier {
            label: "weekend".to_string(),
            amount: round_half_up_2(total - before),
        });
    }

    // Emergency surcharge is additive over the base, not the running total.
    if input.is_emergency {
        let surcharge = base_price * EMERGENCY_SURCHARGE_RATE;
        total += surcharge;
        modifiers.push(PriceModifier {
            label: "emergency".to_string(),
            amount: round_half_up_2(surcharge),
        });
    }

    // Consultation-type multiplier applies last.
    let type_multiplier = input.consultation_type.price_multiplier();
    if (type_multiplier - 1.0).abs() > f64::EPSILON {
        let before = total;
        total *= type_multiplier;
        modifiers.push(PriceModifier {
            label: format!("{}_consultation", input.consultation_type),
            amount: round_half_up_2(total - before),
        });
    }

    SlotQuote {
        base_price,
        total_price: round_half_up_2(total),
        modifiers,
    }
}
