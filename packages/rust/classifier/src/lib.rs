//! Heuristic content classification for scraped business websites.
//!
//! Two independent pure functions over fetched page content: operating-hours
//! extraction and impound-capability detection. No I/O happens here; the
//! fetch side hands in raw HTML plus the extracted visible text.
//!
//! The keyword sets and confidence thresholds are deliberately coarse and
//! must stay byte-compatible with the data already persisted by earlier
//! pipeline runs, so treat them as frozen constants.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Weekday names matched against the visible text, in calendar order.
const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Phrases indicating round-the-clock operation.
const ALWAYS_OPEN_MARKERS: [&str; 4] = ["24/7", "24 hours", "always open", "open 24"];

/// Keywords indicating the business offers impound service.
const IMPOUND_KEYWORDS: [&str; 10] = [
    "impound",
    "impound lot",
    "impound yard",
    "vehicle impound",
    "car impound",
    "towing impound",
    "impoundment",
    "impounded vehicles",
    "impound storage",
    "police impound",
];

/// Negation phrases. Any hit overrides all positive evidence.
const NEGATIVE_KEYWORDS: [&str; 3] = ["we do not impound", "no impound", "not an impound"];

// ---------------------------------------------------------------------------
// Operating hours
// ---------------------------------------------------------------------------

/// Operating hours extracted from website text.
///
/// Hour strings are stored verbatim as captured; no timezone or format
/// normalization is attempted. Downstream consumers must tolerate free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingHours {
    /// Weekday name → rest-of-line hour string, as found in the text.
    pub days: BTreeMap<String, String>,
    /// Set when the text advertises 24/7 operation.
    #[serde(default)]
    pub always_open: bool,
}

/// Extract operating hours from a page's visible text.
///
/// For each weekday name, the first case-insensitive match of
/// `"<day>[:\s]*<rest-of-line>"` contributes one entry. Returns `None` when
/// no day matched and no always-open marker was found.
pub fn extract_hours(text: &str) -> Option<OperatingHours> {
    let lower = text.to_lowercase();
    let mut days = BTreeMap::new();

    for day in WEEKDAYS {
        let pattern = Regex::new(&format!(r"{day}[\s:]*([^\n]+)")).expect("valid day pattern");
        if let Some(caps) = pattern.captures(&lower) {
            let hours = caps[1].trim().to_string();
            if !hours.is_empty() {
                days.insert(day.to_string(), hours);
            }
        }
    }

    let always_open = ALWAYS_OPEN_MARKERS.iter().any(|m| lower.contains(m));

    if days.is_empty() && !always_open {
        None
    } else {
        Some(OperatingHours { days, always_open })
    }
}

// ---------------------------------------------------------------------------
// Impound capability
// ---------------------------------------------------------------------------

/// Heuristic impound-capability verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capability {
    pub has_impound: bool,
    /// 0.0–1.0. A coarse monotonic score, not a calibrated probability.
    pub confidence: f64,
}

/// Detect whether the business offers impound service.
///
/// Negation phrases are checked first against both the visible text and the
/// raw HTML; any hit returns `(false, 0.9)` regardless of positive evidence.
/// Otherwise every keyword scores one hit per source it appears in — a
/// keyword present in both text and HTML counts twice. The HTML-side scan
/// can match boilerplate markup (a nav link containing "no impound" text,
/// say); that imprecision is part of the frozen heuristic.
pub fn detect_capability(html: &str, text: &str) -> Capability {
    let text_lower = text.to_lowercase();
    let html_lower = html.to_lowercase();

    for phrase in NEGATIVE_KEYWORDS {
        if text_lower.contains(phrase) || html_lower.contains(phrase) {
            return Capability {
                has_impound: false,
                confidence: 0.9,
            };
        }
    }

    let mut matches = 0u32;
    for keyword in IMPOUND_KEYWORDS {
        if text_lower.contains(keyword) {
            matches += 1;
        }
        if html_lower.contains(keyword) {
            matches += 1;
        }
    }

    match matches {
        0 => Capability {
            has_impound: false,
            confidence: 0.3,
        },
        1 => Capability {
            has_impound: true,
            confidence: 0.6,
        },
        2 => Capability {
            has_impound: true,
            confidence: 0.8,
        },
        _ => Capability {
            has_impound: true,
            confidence: 0.95,
        },
    }
}

/// Coarse fleet-size bucket from listing review volume.
///
/// A rough popularity proxy: busier shops accumulate reviews faster.
pub fn fleet_size_from_reviews(review_count: Option<u32>) -> Option<&'static str> {
    match review_count? {
        n if n > 500 => Some("large"),
        n if n > 100 => Some("medium"),
        _ => Some("small"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_per_day_hours() {
        let text = "Our Hours\nMonday: 8am - 6pm\nTuesday: 8am - 6pm\nSunday: closed\n";
        let hours = extract_hours(text).expect("hours found");
        assert_eq!(hours.days.get("monday").map(String::as_str), Some("8am - 6pm"));
        assert_eq!(hours.days.get("sunday").map(String::as_str), Some("closed"));
        assert!(!hours.days.contains_key("wednesday"));
        assert!(!hours.always_open);
    }

    #[test]
    fn day_match_is_case_insensitive() {
        let text = "FRIDAY 9:00-17:00";
        let hours = extract_hours(text).expect("hours found");
        assert_eq!(hours.days.get("friday").map(String::as_str), Some("9:00-17:00"));
    }

    #[test]
    fn detects_always_open_markers() {
        for text in [
            "We are open 24/7 for emergencies",
            "available 24 hours a day",
            "Always open, call anytime",
        ] {
            let hours = extract_hours(text).expect("hours found");
            assert!(hours.always_open, "marker not detected in: {text}");
        }
    }

    #[test]
    fn absent_when_nothing_found() {
        assert_eq!(extract_hours("Fast towing at fair prices."), None);
        assert_eq!(extract_hours(""), None);
    }

    #[test]
    fn hour_strings_kept_verbatim() {
        // No normalization: whatever trails the day name is stored as-is.
        let text = "monday 8 AM til whenever we feel like closing";
        let hours = extract_hours(text).unwrap();
        assert_eq!(
            hours.days["monday"],
            "8 am til whenever we feel like closing"
        );
    }

    #[test]
    fn negation_always_wins() {
        let text = "We run the biggest impound lot in town. Vehicle impound, police impound.";
        let html = "<p>we do not impound</p>";
        let cap = detect_capability(html, text);
        assert!(!cap.has_impound);
        assert_eq!(cap.confidence, 0.9);
    }

    #[test]
    fn negation_detected_in_text_too() {
        let cap = detect_capability("<html></html>", "Sorry, no impound services here.");
        assert!(!cap.has_impound);
        assert_eq!(cap.confidence, 0.9);
    }

    #[test]
    fn zero_matches_low_confidence_negative() {
        let cap = detect_capability("<html><body>Tires and oil</body></html>", "Tires and oil");
        assert!(!cap.has_impound);
        assert_eq!(cap.confidence, 0.3);
    }

    #[test]
    fn confidence_ladder() {
        // Bare "impound" in text only matches exactly one keyword.
        let cap = detect_capability("<html></html>", "we offer impound services");
        assert!(cap.has_impound);
        assert_eq!(cap.confidence, 0.6);

        // Same keyword in both sources counts as two hits.
        let cap = detect_capability("<p>impound</p>", "we offer impound services");
        assert!(cap.has_impound);
        assert_eq!(cap.confidence, 0.8);

        // "impoundment" substring-matches the bare "impound" keyword too,
        // so a single longer keyword already scores two hits per source.
        let cap = detect_capability("<p>impoundment</p>", "ask about impoundment");
        assert!(cap.has_impound);
        assert_eq!(cap.confidence, 0.95);
    }

    #[test]
    fn confidence_is_monotonic_in_hits() {
        let samples = [
            detect_capability("", ""),
            detect_capability("", "we offer impound services"),
            detect_capability("impound", "we offer impound services"),
            detect_capability("impound lot", "visit the impound lot"),
        ];
        for pair in samples.windows(2) {
            assert!(pair[0].confidence <= pair[1].confidence);
        }
    }

    #[test]
    fn fleet_size_buckets() {
        assert_eq!(fleet_size_from_reviews(None), None);
        assert_eq!(fleet_size_from_reviews(Some(12)), Some("small"));
        assert_eq!(fleet_size_from_reviews(Some(101)), Some("medium"));
        assert_eq!(fleet_size_from_reviews(Some(501)), Some("large"));
    }

    #[test]
    fn operating_hours_serialization() {
        let hours = OperatingHours {
            days: BTreeMap::from([("monday".to_string(), "8am - 6pm".to_string())]),
            always_open: false,
        };
        let json = serde_json::to_value(&hours).expect("serialize");
        assert_eq!(json["days"]["monday"], "8am - 6pm");
        let parsed: OperatingHours = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, hours);
    }
}
