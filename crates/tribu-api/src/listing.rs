//! How many children a page shows inline, and the wording around them.

use chrono::{DateTime, Utc};

/// Children shown inline on a detail page before a "view all" link appears.
pub const PREVIEW_LIMIT: u32 = 5;

/// Word count echo summaries are cut to in lists.
pub const SUMMARY_WORDS: usize = 20;

/// A slice of an ordered collection plus the size of the whole collection.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Listing<T> {
    /// Every item is shown.
    pub fn full(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }

    /// At most [`PREVIEW_LIMIT`] items of a collection holding `total`.
    pub fn preview(mut items: Vec<T>, total: usize) -> Self {
        items.truncate(PREVIEW_LIMIT as usize);
        Self { items, total }
    }

    /// True when part of the collection is hidden behind a "view all" link.
    pub fn has_more(&self) -> bool {
        self.total > self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Count banner for the global feed; `None` when there is nothing to count.
pub fn feed_banner(total: usize) -> Option<String> {
    match total {
        0 => None,
        1 => Some("Tribu has posted 1 echo so far!".to_string()),
        n => Some(format!("Tribu has posted {} echos so far!", n)),
    }
}

/// Keeps the first `max_words` whitespace-separated words, marking the cut with " …".
/// Text that already fits is returned unchanged.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    format!("{} …", words[..max_words].join(" "))
}

const TIME_UNITS: &[(i64, &str, &str)] = &[
    (60 * 60 * 24 * 365, "year", "years"),
    (60 * 60 * 24 * 30, "month", "months"),
    (60 * 60 * 24 * 7, "week", "weeks"),
    (60 * 60 * 24, "day", "days"),
    (60 * 60, "hour", "hours"),
    (60, "minute", "minutes"),
];

/// Human-readable elapsed time, e.g. "3 days, 2 hours". Anything under a
/// minute (or in the future) reads "0 minutes".
pub fn timesince(from: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - from).num_seconds();
    if seconds < 60 {
        return "0 minutes".to_string();
    }

    let unit = |count: i64, singular: &str, plural: &str| {
        format!("{} {}", count, if count == 1 { singular } else { plural })
    };

    let Some(idx) = TIME_UNITS.iter().position(|(secs, _, _)| seconds >= *secs) else {
        return "0 minutes".to_string();
    };
    let (secs, singular, plural) = TIME_UNITS[idx];
    let count = seconds / secs;
    let mut out = unit(count, singular, plural);

    if let Some(&(next_secs, next_singular, next_plural)) = TIME_UNITS.get(idx + 1) {
        let next_count = (seconds - count * secs) / next_secs;
        if next_count > 0 {
            out.push_str(", ");
            out.push_str(&unit(next_count, next_singular, next_plural));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn preview_caps_items_and_reports_more() {
        let listing = Listing::preview((0..8).collect::<Vec<_>>(), 8);
        assert_eq!(listing.items, [0, 1, 2, 3, 4]);
        assert!(listing.has_more());
    }

    #[test]
    fn preview_at_limit_has_no_more() {
        let listing = Listing::preview((0..5).collect::<Vec<_>>(), 5);
        assert_eq!(listing.items.len(), 5);
        assert!(!listing.has_more());

        let small = Listing::preview(vec![1, 2], 2);
        assert!(!small.has_more());
        assert!(!small.is_empty());
    }

    #[test]
    fn full_listing_never_has_more() {
        let listing = Listing::full((0..12).collect::<Vec<_>>());
        assert_eq!(listing.total, 12);
        assert!(!listing.has_more());
        assert!(Listing::<u8>::full(vec![]).is_empty());
    }

    #[test]
    fn banner_pluralizes() {
        assert_eq!(feed_banner(0), None);
        assert_eq!(feed_banner(1).unwrap(), "Tribu has posted 1 echo so far!");
        assert_eq!(feed_banner(15).unwrap(), "Tribu has posted 15 echos so far!");
    }

    #[test]
    fn truncate_only_long_text() {
        assert_eq!(truncate_words("short  text", 20), "short  text");
        let long = (1..=25).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let cut = truncate_words(&long, 20);
        assert!(cut.starts_with("w1 w2"));
        assert!(cut.ends_with("w20 …"));
        assert!(!cut.contains("w21"));
    }

    #[test]
    fn timesince_picks_two_adjacent_units() {
        let now = Utc::now();
        assert_eq!(timesince(now, now), "0 minutes");
        assert_eq!(timesince(now + Duration::minutes(5), now), "0 minutes");
        assert_eq!(timesince(now - Duration::minutes(1), now), "1 minute");
        assert_eq!(
            timesince(now - Duration::hours(2) - Duration::minutes(5), now),
            "2 hours, 5 minutes"
        );
        assert_eq!(timesince(now - Duration::days(3), now), "3 days");
        // the second unit must be adjacent: weeks then days, never weeks then hours
        assert_eq!(timesince(now - Duration::days(7) - Duration::hours(3), now), "1 week");
    }
}
