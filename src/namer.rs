//! Automatic station naming for live promotion.
//!
//! When a run of splays promotes into a new station the surveyor has not
//! typed a name, so the kernel derives one from the station the leg grows
//! out of: a trailing integer is incremented (`2` → `3`, `3a7` → `3a8`),
//! anything else gets a numeric suffix (`entrance` → `entrance1`). The
//! candidate is probed against the survey until it is unused, so the result
//! is always unique and the scheme is deterministic.

use regex_lite::Regex;

use crate::survey::Survey;
use crate::types::StationId;

/// Generate the next unused station name, derived from `from`'s name.
pub fn generate_next_station_name(survey: &Survey, from: StationId) -> String {
    let base = survey
        .station(from)
        .map(|station| station.name().to_string())
        .unwrap_or_default();

    let trailing_number = Regex::new(r"^(.*?)(\d+)$").unwrap();

    if let Some(captures) = trailing_number.captures(&base) {
        let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        let digits = captures.get(2).map(|m| m.as_str()).unwrap_or("0");
        let mut value: u64 = digits.parse().unwrap_or(0);
        loop {
            value += 1;
            let candidate = format!("{prefix}{value}");
            if survey.station_by_name(&candidate).is_none() {
                return candidate;
            }
        }
    }

    let mut suffix: u64 = 1;
    loop {
        let candidate = format!("{base}{suffix}");
        if survey.station_by_name(&candidate).is_none() {
            return candidate;
        }
        suffix += 1;
    }
}
