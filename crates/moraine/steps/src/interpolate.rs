//! Linear interpolation over ordered numeric series

/// Read a value out of an ordered `(key, value)` series.
///
/// Positions on or between keys interpolate linearly; a position before
/// the first key clamps to the first value; a position past the end of
/// the record falls back to the mean of all values. `None` only for an
/// empty series.
pub fn interpolate_or_mean(entries: &[(f64, f64)], position: f64) -> Option<f64> {
    let (first_key, first_value) = *entries.first()?;
    let (last_key, _) = *entries.last()?;

    if position <= first_key {
        return Some(first_value);
    }
    if position > last_key {
        return Some(series_mean(entries));
    }
    // first_key < position <= last_key, so a bracketing pair exists.
    let upper = entries.partition_point(|(key, _)| *key < position);
    let (a, a_value) = entries[upper - 1];
    let (b, b_value) = entries[upper];
    Some(a_value + (position - a) * (b_value - a_value) / (b - a))
}

fn series_mean(entries: &[(f64, f64)]) -> f64 {
    entries.iter().map(|(_, v)| v).sum::<f64>() / entries.len() as f64
}
