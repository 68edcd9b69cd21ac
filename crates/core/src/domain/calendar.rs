use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotKind {
    FreeTime,
    Booking,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreeTime => "FREE_TIME",
            Self::Booking => "BOOKING",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FREE_TIME" => Some(Self::FreeTime),
            "BOOKING" => Some(Self::Booking),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSlot {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: SlotKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarBooking {
    pub id: String,
    pub event_slot_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Task name attached to the booking, when the platform exposes it.
    pub project_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSnapshot {
    pub slots: Vec<CalendarSlot>,
    pub bookings: Vec<CalendarBooking>,
}

impl CalendarSnapshot {
    pub fn free_slots(&self) -> impl Iterator<Item = &CalendarSlot> {
        self.slots.iter().filter(|slot| slot.kind == SlotKind::FreeTime)
    }
}

/// Platform notification, used to recover the project of a booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalNotification {
    pub id: String,
    pub related_object_type: String,
    pub related_object_id: String,
    pub message: String,
    pub time: DateTime<Utc>,
    pub was_read: bool,
    pub group_name: String,
}

/// Notification about `slot_id` stamped within one minute of `slot_time`.
pub fn find_notification_for_slot<'a>(
    notifications: &'a [ExternalNotification],
    slot_id: &str,
    slot_time: DateTime<Utc>,
) -> Option<&'a ExternalNotification> {
    notifications.iter().find(|notification| {
        notification.related_object_id == slot_id
            && (notification.time - slot_time).abs() < Duration::minutes(1)
    })
}

pub fn find_notification_by_time(
    notifications: &[ExternalNotification],
    slot_time: DateTime<Utc>,
    window: Duration,
) -> Option<&ExternalNotification> {
    notifications.iter().find(|notification| (notification.time - slot_time).abs() < window)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{find_notification_by_time, find_notification_for_slot, ExternalNotification};

    fn notification(id: &str, slot_id: &str, offset_secs: i64) -> ExternalNotification {
        let base = Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).single().expect("valid time");
        ExternalNotification {
            id: id.to_string(),
            related_object_type: "EVENT_SLOT".to_string(),
            related_object_id: slot_id.to_string(),
            message: "go-concurrency".to_string(),
            time: base + Duration::seconds(offset_secs),
            was_read: false,
            group_name: "review".to_string(),
        }
    }

    #[test]
    fn slot_lookup_requires_matching_id_and_close_time() {
        let slot_time = Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).single().expect("valid time");
        let notifications = vec![
            notification("n-1", "slot-1", 120),
            notification("n-2", "slot-2", 10),
            notification("n-3", "slot-1", -30),
        ];

        let found = find_notification_for_slot(&notifications, "slot-1", slot_time);
        assert_eq!(found.map(|n| n.id.as_str()), Some("n-3"));
        assert!(find_notification_for_slot(&notifications, "slot-9", slot_time).is_none());
    }

    #[test]
    fn time_lookup_uses_open_window() {
        let slot_time = Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).single().expect("valid time");
        let notifications = vec![notification("n-1", "slot-1", 300)];

        assert!(find_notification_by_time(&notifications, slot_time, Duration::minutes(5)).is_none());
        assert!(find_notification_by_time(&notifications, slot_time, Duration::minutes(6)).is_some());
    }
}
