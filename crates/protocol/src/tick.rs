//! Tick/price conversion for stablecoin exchange rates.
//!
//! A tick is an integer offset from par in units of 1/100000: price
//! `= (100000 + tick) / 100000`, rendered as a decimal string with
//! trailing zeros trimmed. The inverse parse truncates extra fractional
//! digits beyond five.

use thiserror::Error;

/// Lowest representable tick.
pub const MIN_TICK: i32 = -2000;
/// Highest representable tick.
pub const MAX_TICK: i32 = 2000;

/// Scale factor: one tick is 1/100000 of par.
const TICK_BASE: i64 = 100_000;

/// Errors from [`tick_to_price`] and [`price_to_tick`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TickError {
    #[error("tick {tick} is out of bounds ({MIN_TICK} to {MAX_TICK})")]
    TickOutOfBounds { tick: i32 },
    #[error("invalid price format: {price:?}")]
    InvalidPriceFormat { price: String },
    #[error("price {price:?} maps to tick {tick}, out of bounds ({MIN_TICK} to {MAX_TICK})")]
    PriceOutOfBounds { price: String, tick: i64 },
}

/// Renders a tick as its decimal price string.
///
/// The fractional part is at most five digits with trailing zeros
/// trimmed; a whole-number price carries no decimal point (tick 0 is
/// `"1"`, not `"1.00000"`).
pub fn tick_to_price(tick: i32) -> Result<String, TickError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(TickError::TickOutOfBounds { tick });
    }
    let scaled = TICK_BASE + tick as i64;
    let whole = scaled / TICK_BASE;
    let fraction = scaled % TICK_BASE;
    if fraction == 0 {
        return Ok(whole.to_string());
    }
    let digits = format!("{fraction:05}");
    let trimmed = digits.trim_end_matches('0');
    Ok(format!("{whole}.{trimmed}"))
}

/// Parses a decimal price string back into a tick.
///
/// The grammar is an optional minus sign, a non-empty integer part and an
/// optional non-empty fractional part. Fractional digits beyond the fifth
/// are truncated, not rounded.
pub fn price_to_tick(price: &str) -> Result<i32, TickError> {
    let invalid = || TickError::InvalidPriceFormat { price: price.to_owned() };

    let (negative, unsigned) = match price.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, price),
    };
    let (whole_digits, fraction_digits) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (unsigned, ""),
    };
    if whole_digits.is_empty() || !whole_digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if unsigned.contains('.')
        && (fraction_digits.is_empty() || !fraction_digits.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(invalid());
    }

    let out_of_bounds = |tick: i64| TickError::PriceOutOfBounds { price: price.to_owned(), tick };

    let whole: i64 = whole_digits
        .parse()
        .map_err(|_| out_of_bounds(if negative { i64::MIN } else { i64::MAX }))?;

    // Truncate to five fractional digits, then right-pad to the full scale.
    let mut fraction: i64 = 0;
    for b in fraction_digits.bytes().take(5) {
        fraction = fraction * 10 + (b - b'0') as i64;
    }
    for _ in fraction_digits.len().min(5)..5 {
        fraction *= 10;
    }

    let magnitude = whole
        .checked_mul(TICK_BASE)
        .and_then(|scaled| scaled.checked_add(fraction))
        .ok_or_else(|| out_of_bounds(if negative { i64::MIN } else { i64::MAX }))?;
    let signed = if negative { -magnitude } else { magnitude };
    let tick = signed - TICK_BASE;

    if tick < MIN_TICK as i64 || tick > MAX_TICK as i64 {
        return Err(out_of_bounds(tick));
    }
    Ok(tick as i32)
}
