//! Single cron field parsing.

use std::collections::BTreeSet;

use cronflow_types::error::CronError;

/// Expand one cron field into the integers it matches within `[min, max]`.
///
/// Accepted forms, combinable with commas:
/// - `*` -- every value in `[min, max]`
/// - `n` -- a single value
/// - `a-b` -- inclusive range
/// - `base/step`, `*/step`, `a-b/step` -- every `step`-th value starting at
///   `base` (or `min` for `*`), up to `max` (or `b` for a range)
///
/// Values outside `[min, max]` are dropped from the result rather than
/// rejected. A range with `a > b` contributes nothing.
pub fn parse_field(field: &str, min: u32, max: u32) -> Result<BTreeSet<u32>, CronError> {
    let mut values = BTreeSet::new();

    for part in field.split(',') {
        if part.is_empty() {
            return Err(invalid(field, "empty list element"));
        }

        if let Some((base, step)) = part.split_once('/') {
            let step = parse_number(field, step)?;
            if step == 0 {
                return Err(invalid(field, "step must be positive"));
            }
            let (start, end) = if base == "*" {
                (min, max)
            } else if let Some((a, b)) = base.split_once('-') {
                (parse_number(field, a)?, parse_number(field, b)?.min(max))
            } else {
                (parse_number(field, base)?, max)
            };
            let mut value = start;
            while value <= end {
                values.insert(value);
                value = match value.checked_add(step) {
                    Some(next) => next,
                    None => break,
                };
            }
        } else if part == "*" {
            values.extend(min..=max);
        } else if let Some((a, b)) = part.split_once('-') {
            let (a, b) = (parse_number(field, a)?, parse_number(field, b)?);
            values.extend(a..=b);
        } else {
            values.insert(parse_number(field, part)?);
        }
    }

    values.retain(|v| (min..=max).contains(v));
    Ok(values)
}

fn parse_number(field: &str, raw: &str) -> Result<u32, CronError> {
    raw.parse::<u32>()
        .map_err(|_| invalid(field, &format!("'{raw}' is not a non-negative integer")))
}

fn invalid(field: &str, reason: &str) -> CronError {
    CronError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
