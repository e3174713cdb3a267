//! Periodic schedule grammars: cron expressions and durations.

use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("invalid cron expression: {0}")]
    Cron(String),

    #[error("invalid duration {input:?}: {reason}")]
    Duration { input: String, reason: &'static str },
}

/// Parse a cron expression.
///
/// Accepts the standard five-field form (`minute hour dom month dow`), the
/// six/seven-field form with leading seconds (and trailing year), the
/// `@hourly`-style descriptors, and `@every <duration>`. Day-of-week uses
/// 0 or 7 for Sunday in every form.
pub fn parse_cron(expr: &str) -> Result<(), ScheduleError> {
    let expr = expr.trim();

    if let Some(every) = expr.strip_prefix("@every ") {
        return parse_duration(every.trim()).map(|_| ());
    }

    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = match fields.as_slice() {
        [minute, hour, dom, month, dow] if !expr.starts_with('@') => format!(
            "0 {} {} {} {} {}",
            minute,
            hour,
            dom,
            month,
            standard_day_of_week(dow)
        ),
        [second, minute, hour, dom, month, dow, year @ ..] if year.len() <= 1 => {
            let mut fields = vec![
                second.to_string(),
                minute.to_string(),
                hour.to_string(),
                dom.to_string(),
                month.to_string(),
                standard_day_of_week(dow),
            ];
            fields.extend(year.iter().map(|y| y.to_string()));
            fields.join(" ")
        }
        _ => expr.to_string(),
    };

    Schedule::from_str(&normalized)
        .map(|_| ())
        .map_err(|e| ScheduleError::Cron(e.to_string()))
}

/// Renumber a day-of-week field (0 or 7 = Sunday) into the 1 = Sunday
/// numbering the `cron` crate expects. Step values and day
/// names are left alone.
fn standard_day_of_week(field: &str) -> String {
    let renumber = |day: &str| match day.parse::<u8>() {
        Ok(7) => "1".to_string(),
        Ok(n) if n < 7 => (n + 1).to_string(),
        _ => day.to_string(),
    };

    field
        .split(',')
        .map(|item| {
            let (base, step) = match item.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (item, None),
            };
            let base = match base.split_once('-') {
                Some((start, end)) => format!("{}-{}", renumber(start), renumber(end)),
                None => renumber(base),
            };
            match step {
                Some(step) => format!("{}/{}", base, step),
                None => base,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a duration such as `300ms`, `1.5h` or `2h45m`.
///
/// A sequence of decimal numbers, each with an optional fraction and a
/// mandatory unit (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`), optionally
/// preceded by `+`. A bare `0` is allowed. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, ScheduleError> {
    let fail = |reason| ScheduleError::Duration {
        input: input.to_string(),
        reason,
    };

    if input.starts_with('-') {
        return Err(fail("negative"));
    }
    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(fail("empty"));
    }
    let mut total_nanos: f64 = 0.0;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        if number.is_empty() || number == "." {
            return Err(fail("expected a number"));
        }
        let value: f64 = number.parse().map_err(|_| fail("malformed number"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            "" => return Err(fail("missing unit")),
            _ => return Err(fail("unknown unit")),
        };
        rest = &rest[unit_len..];

        total_nanos += value * scale;
    }

    if total_nanos > u64::MAX as f64 {
        return Err(fail("overflow"));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
