// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Filesystem-safe export filenames.

use chrono::{DateTime, SecondsFormat, Utc};

/// Replaces every run of characters outside `[A-Za-z0-9._-]` with a single `-`.
///
/// The result is idempotent: sanitizing an already sanitized label is a no-op.
///
/// ```
/// use chat2md::filename::sanitize;
///
/// assert_eq!(sanitize("my repo"), "my-repo");
/// assert_eq!(sanitize("a / b: c"), "a-b-c");
/// ```
#[must_use]
pub fn sanitize(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut in_run = false;
    for c in label.chars() {
        if is_safe(c) {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }
    out
}

const fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Formats a timestamp as ISO-8601 UTC with millisecond precision (`2024-01-01T00:00:00.000Z`).
#[must_use]
pub fn iso_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Builds `<label>-chat-export-<timestamp>.md`, with `:` and `.` in the
/// timestamp replaced by `-`.
#[must_use]
pub fn build_export_filename(label: &str, exported_at: &DateTime<Utc>) -> String {
    let stamp = iso_timestamp(exported_at).replace([':', '.'], "-");
    format!("{}-chat-export-{stamp}.md", sanitize(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn keeps_safe_characters() {
        assert_eq!(sanitize("owner_repo-1.2"), "owner_repo-1.2");
    }

    #[test]
    fn collapses_unsafe_runs() {
        assert_eq!(sanitize("my   repo"), "my-repo");
        assert_eq!(sanitize("owner/repo@main"), "owner-repo-main");
        assert_eq!(sanitize("héllo wörld"), "h-llo-w-rld");
    }

    #[test]
    fn handles_empty_label() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for label in ["", "plain", "a b", "--x--", "ü/ñ\t\n", "../../etc/passwd", "日本語"] {
            let once = sanitize(label);
            assert_eq!(sanitize(&once), once, "not idempotent for {label:?}");
            assert!(once.chars().all(is_safe), "unsafe output for {label:?}");
        }
    }

    #[test]
    fn formats_iso_timestamp_with_millis() {
        assert_eq!(iso_timestamp(&new_year()), "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn builds_timestamped_filename() {
        assert_eq!(
            build_export_filename("my repo", &new_year()),
            "my-repo-chat-export-2024-01-01T00-00-00-000Z.md"
        );
    }

    #[test]
    fn distinct_millis_give_distinct_filenames() {
        let later = new_year() + chrono::Duration::milliseconds(1);
        assert_ne!(
            build_export_filename("repo", &new_year()),
            build_export_filename("repo", &later)
        );
    }
}
