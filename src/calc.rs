/// Share of `amount` in `total`, in percent. A zero total yields 0 rather than an error.
pub fn percentage(amount: f64, total: f64) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    100.0 * amount / total
}

pub fn average<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0;
    let mut count: usize = 0;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / (count as f64)
    }
}

/// Display rounding for report payloads: `Int(100*x + 0.5) / 100`.
/// Stored aggregates are never rounded.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}
