use chrono::{DateTime, NaiveDate};

/// Parse a run duration into whole seconds.
///
/// Accepted shapes:
/// - ISO-8601 durations as served by speedrun.com (`PT1H2M3.450S`, `P1DT2H`)
/// - plain seconds, integer or fractional (`3723`, `3723.45`)
/// - clock strings (`1:02:03`, `01:02:03`, `2:03`)
///
/// Sub-second precision is truncated; the local leaderboard stores whole seconds.
pub fn parse_duration_secs(raw: &str) -> Option<u64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(rest) = s.strip_prefix('P').or_else(|| s.strip_prefix('p')) {
        return parse_iso8601(rest);
    }
    if s.contains(':') {
        return parse_clock(s);
    }
    let secs: f64 = s.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(secs.trunc() as u64)
    } else {
        None
    }
}

fn parse_iso8601(rest: &str) -> Option<u64> {
    let mut total = 0f64;
    let mut in_time = false;
    let mut num = String::new();
    let mut saw_component = false;
    for ch in rest.chars() {
        match ch.to_ascii_uppercase() {
            'T' => {
                if !num.is_empty() || in_time {
                    return None;
                }
                in_time = true;
            }
            c if c.is_ascii_digit() || c == '.' => num.push(c),
            unit => {
                let value: f64 = num.parse().ok()?;
                num.clear();
                let factor = match (unit, in_time) {
                    ('D', false) => 86_400.0,
                    ('H', true) => 3_600.0,
                    ('M', true) => 60.0,
                    ('S', true) => 1.0,
                    _ => return None,
                };
                total += value * factor;
                saw_component = true;
            }
        }
    }
    if !num.is_empty() || !saw_component {
        return None;
    }
    Some(total.trunc() as u64)
}

fn parse_clock(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.split(':').collect();
    let (h, m, sec) = match parts.as_slice() {
        [h, m, sec] => (*h, *m, *sec),
        [m, sec] => ("0", *m, *sec),
        _ => return None,
    };
    let h: u64 = h.trim().parse().ok()?;
    let m: u64 = m.trim().parse().ok()?;
    let sec: f64 = sec.trim().parse().ok()?;
    if m >= 60 || !(0.0..60.0).contains(&sec) {
        return None;
    }
    h.checked_mul(3_600)?
        .checked_add(m * 60)?
        .checked_add(sec.trunc() as u64)
}

/// Render whole seconds as `HH:MM:SS`.
pub fn format_hms(total_secs: u64) -> String {
    let h = total_secs / 3_600;
    let m = (total_secs % 3_600) / 60;
    let s = total_secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// Normalize any accepted duration shape into the local `HH:MM:SS` form.
pub fn normalize_run_time(raw: &str) -> Option<String> {
    parse_duration_secs(raw).map(format_hms)
}

/// Pick the run date: the explicit `YYYY-MM-DD` date when valid, otherwise the
/// calendar date of the RFC3339 submission timestamp.
pub fn extract_run_date(date: Option<&str>, submitted: Option<&str>) -> Option<String> {
    if let Some(d) = date.map(str::trim).filter(|d| !d.is_empty()) {
        if let Ok(parsed) = NaiveDate::parse_from_str(d, "%Y-%m-%d") {
            return Some(parsed.format("%Y-%m-%d").to_string());
        }
    }
    let ts = submitted.map(str::trim).filter(|s| !s.is_empty())?;
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}
