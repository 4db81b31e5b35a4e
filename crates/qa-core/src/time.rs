//! Clock-time parsing for dialogue fragments and temporal queries.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn clock_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])([0-9]{1,2}:[0-9]{2}(?::[0-9]{2})?)")
            .expect("clock pattern is valid")
    })
}

/// Convert a clock string into seconds.
///
/// Accepts `HH:MM:SS`, and `A:B` which reads as `HH:MM` when `A >= 60`
/// and as `MM:SS` otherwise. Anything else is 0.
pub fn parse_clock(s: &str) -> u32 {
    let parts: Vec<&str> = s.trim().split(':').collect();
    let numbers: Option<Vec<u32>> = parts.iter().map(|p| p.parse::<u32>().ok()).collect();

    let Some(numbers) = numbers else {
        return 0;
    };

    match (parts.as_slice(), numbers.as_slice()) {
        ([h, m, sec], [hours, minutes, seconds])
            if (1..=2).contains(&h.len()) && m.len() == 2 && sec.len() == 2 =>
        {
            hours * 3600 + minutes * 60 + seconds
        }
        ([a, b], [first, second]) if (1..=2).contains(&a.len()) && b.len() == 2 => {
            if *first >= 60 {
                first * 3600 + second * 60
            } else {
                first * 60 + second
            }
        }
        _ => 0,
    }
}

/// Render seconds as `HH:MM:SS`.
pub fn format_clock(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Whether the text mentions a clock time such as `10:30`.
pub fn contains_clock_expression(text: &str) -> bool {
    clock_pattern().is_match(text)
}

/// An inclusive range of seconds used by the temporal retrieval path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u32,
    pub end: u32,
}

impl TimeRange {
    /// Range covering every fragment.
    pub fn full() -> Self {
        Self {
            start: 0,
            end: u32::MAX,
        }
    }

    /// Build a range, swapping the bounds when given in reverse.
    pub fn new(start: u32, end: u32) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Extract a range from the first two clock expressions in a query.
    ///
    /// One expression leaves the upper bound open; none covers everything.
    pub fn from_query(query: &str) -> Self {
        let clocks: Vec<u32> = clock_pattern()
            .captures_iter(query)
            .filter_map(|c| c.get(1))
            .map(|m| parse_clock(m.as_str()))
            .take(2)
            .collect();

        match clocks.as_slice() {
            [start, end] => Self::new(*start, *end),
            [start] => Self {
                start: *start,
                end: u32::MAX,
            },
            _ => Self::full(),
        }
    }

    /// Whether a fragment spanning `[start, end]` lies inside this range.
    pub fn contains(&self, start: u32, end: u32) -> bool {
        start >= self.start && end <= self.end
    }
}
