use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Normalizes a raw source date into an ISO-8601 instant, or `None` when the
/// string is not in a recognized shape.
///
/// Accepted shapes: RFC 3339 timestamps, bare `YYYY-MM-DD` dates, and the
/// long form `March 3, 2020` with or without a leading weekday (device
/// clippings write `Monday, March 3, 2020`). Date-only shapes normalize to
/// midnight UTC.
pub fn normalize(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(
            instant
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }

    let stripped = raw
        .split_once(',')
        .filter(|(head, _)| WEEKDAYS.contains(&head.trim()))
        .map(|(_, rest)| rest.trim())
        .unwrap_or(raw);

    for format in ["%B %d, %Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(stripped, format) {
            let instant = date.and_hms_opt(0, 0, 0)?.and_utc();
            return Some(instant.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
    }

    None
}
