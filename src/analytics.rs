use crate::result::TestResult;
use crate::util::mean;
use chrono::{DateTime, Duration, Local};
use clap::ValueEnum;
use itertools::Itertools;
use std::cmp::Ordering;

/// Time-range filter applied to a result collection before aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, strum_macros::Display)]
pub enum Window {
    All,
    Today,
    Week,
    Month,
}

/// One ranked leaderboard row. Rank is positional in the returned list, not
/// stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub username: String,
    pub max_wpm: u32,
    pub avg_accuracy: u8,
    pub test_count: usize,
}

/// Keep the results falling inside `window`, evaluated against `now`.
///
/// `Today` compares local calendar dates, not a rolling 24 hours; `Week` and
/// `Month` are rolling 7x24h and fixed 30x24h cutoffs. Results without a
/// `created_at` are excluded from every dated window and kept by `All`.
pub fn filter_by_window(
    results: &[TestResult],
    window: Window,
    now: DateTime<Local>,
) -> Vec<TestResult> {
    results
        .iter()
        .filter(|r| match window {
            Window::All => true,
            Window::Today => r
                .created_at
                .is_some_and(|t| t.date_naive() == now.date_naive()),
            Window::Week => r.created_at.is_some_and(|t| t >= now - Duration::days(7)),
            Window::Month => r.created_at.is_some_and(|t| t >= now - Duration::days(30)),
        })
        .cloned()
        .collect()
}

/// Integer-rounded mean WPM; zero for an empty collection.
pub fn average_wpm(results: &[TestResult]) -> u32 {
    mean(&results.iter().map(|r| r.wpm as f64).collect::<Vec<_>>())
        .map(|m| m.round() as u32)
        .unwrap_or(0)
}

/// Integer-rounded mean accuracy; zero for an empty collection.
pub fn average_accuracy(results: &[TestResult]) -> u8 {
    mean(&results.iter().map(|r| r.accuracy as f64).collect::<Vec<_>>())
        .map(|m| m.round() as u8)
        .unwrap_or(0)
}

/// The `n` fastest results. Ties on WPM are broken by earliest `created_at`;
/// the first to reach a speed ranks ahead of later repeats. Undated results
/// sort after dated ones at equal speed.
pub fn best_n(results: &[TestResult], n: usize) -> Vec<TestResult> {
    results
        .iter()
        .cloned()
        .sorted_by(|a, b| b.wpm.cmp(&a.wpm).then_with(|| earliest_first(a, b)))
        .take(n)
        .collect()
}

/// Group the windowed results by user and rank the groups: peak WPM
/// descending, then average accuracy descending, then test count descending
/// (more data is more trustworthy at equal peak speed). Truncated to `limit`.
pub fn build_leaderboard(
    results: &[TestResult],
    window: Window,
    limit: usize,
    now: DateTime<Local>,
) -> Vec<LeaderboardEntry> {
    let filtered = filter_by_window(results, window, now);

    filtered
        .iter()
        .into_group_map_by(|r| r.username.as_deref().unwrap_or("anonymous").to_string())
        .into_iter()
        .map(|(username, group)| LeaderboardEntry {
            max_wpm: group.iter().map(|r| r.wpm).max().unwrap_or(0),
            avg_accuracy: mean(&group.iter().map(|r| r.accuracy as f64).collect::<Vec<_>>())
                .map(|m| m.round() as u8)
                .unwrap_or(0),
            test_count: group.len(),
            username,
        })
        .sorted_by(|a, b| {
            b.max_wpm
                .cmp(&a.max_wpm)
                .then(b.avg_accuracy.cmp(&a.avg_accuracy))
                .then(b.test_count.cmp(&a.test_count))
        })
        .take(limit)
        .collect()
}

fn earliest_first(a: &TestResult, b: &TestResult) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
