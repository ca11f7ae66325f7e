use chrono::{Datelike, Duration, NaiveDate};

/// How a scan bounds its message set. Exactly one mode applies per run;
/// `RecentOnly` is the heuristic default that caps an otherwise unbounded
/// scan at the last 30 days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanWindow {
    Days(u32),
    Range {
        since: Option<NaiveDate>,
        before: Option<NaiveDate>,
    },
    RecentOnly,
}

pub const RECENT_ONLY_DAYS: u32 = 30;

/// IMAP date format: `1-Jan-2025`, no leading zero on the day.
fn imap_date(date: NaiveDate) -> String {
    format!("{}-{}-{}", date.day(), date.format("%b"), date.year())
}

/// Builds the SEARCH string passed through to the server unmodified. Date
/// bounds are widened by one day on each side because IMAP SINCE/BEFORE
/// compare against server-local internal dates and clip messages right at
/// the boundary otherwise.
pub fn build_search_criteria(window: &ScanWindow, unread_only: bool, today: NaiveDate) -> String {
    let (since, before) = match window {
        ScanWindow::Days(days) => (Some(today - Duration::days(i64::from(*days))), None),
        ScanWindow::RecentOnly => (
            Some(today - Duration::days(i64::from(RECENT_ONLY_DAYS))),
            None,
        ),
        ScanWindow::Range { since, before } => (*since, *before),
    };

    let mut parts = Vec::new();
    match (since, before) {
        (Some(since), Some(before)) => {
            parts.push(format!(
                "SINCE {} BEFORE {}",
                imap_date(since - Duration::days(1)),
                imap_date(before + Duration::days(1))
            ));
        }
        (Some(since), None) => {
            parts.push(format!("SINCE {}", imap_date(since - Duration::days(1))));
        }
        (None, Some(before)) => {
            parts.push(format!("BEFORE {}", imap_date(before + Duration::days(1))));
        }
        (None, None) => {}
    }
    if unread_only {
        parts.push("UNSEEN".to_string());
    }

    if parts.is_empty() {
        "ALL".to_string()
    } else {
        format!("({})", parts.join(" "))
    }
}
