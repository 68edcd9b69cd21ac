//! Deadline arithmetic for review requests.
//!
//! Every value is UTC. Functions taking `now` explicitly are the deterministic core; the
//! wall-clock variants only read `Utc::now()` and delegate.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn minutes(value: i32) -> Duration {
    Duration::minutes(i64::from(value))
}

/// `review_start - shift_minutes`.
pub fn decision_deadline(review_start: DateTime<Utc>, shift_minutes: i32) -> DateTime<Utc> {
    review_start - minutes(shift_minutes)
}

pub fn non_whitelist_cancel_at(delay_minutes: i32) -> DateTime<Utc> {
    non_whitelist_cancel_at_from(now_utc(), delay_minutes)
}

pub fn non_whitelist_cancel_at_from(now: DateTime<Utc>, delay_minutes: i32) -> DateTime<Utc> {
    now + minutes(delay_minutes)
}

pub fn should_shift_slot(slot_start: DateTime<Utc>, threshold_minutes: i32) -> bool {
    should_shift_slot_at(now_utc(), slot_start, threshold_minutes)
}

/// Boundary-inclusive: a slot starting exactly `threshold_minutes` from `now` shifts.
pub fn should_shift_slot_at(
    now: DateTime<Utc>,
    slot_start: DateTime<Utc>,
    threshold_minutes: i32,
) -> bool {
    now + minutes(threshold_minutes) >= slot_start
}

/// Whether a whitelisted request should be put in front of the reviewer.
pub fn decision_window_open(
    now: DateTime<Utc>,
    review_start: DateTime<Utc>,
    shift_minutes: i32,
) -> bool {
    should_shift_slot_at(now, decision_deadline(review_start, shift_minutes), shift_minutes)
}

pub fn is_expired_at(now: DateTime<Utc>, deadline: DateTime<Utc>) -> bool {
    deadline <= now
}

/// Whole minutes, truncated toward zero.
pub fn duration_in_minutes(duration: Duration) -> i64 {
    duration.num_minutes()
}

pub fn minutes_until(now: DateTime<Utc>, target: DateTime<Utc>) -> i64 {
    duration_in_minutes(target - now)
}

pub fn slot_duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    duration_in_minutes(end - start)
}

pub fn from_unix_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

pub fn from_unix_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// `2026-10-18 14:05:00 UTC`
pub fn format_for_message(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// `Oct 18 14:05 UTC`
pub fn format_short(at: DateTime<Utc>) -> String {
    at.format("%b %-d %H:%M UTC").to_string()
}

/// Fixed-width storage encoding; lexical order equals chronological order.
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn decode_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|at| at.with_timezone(&Utc))
}
