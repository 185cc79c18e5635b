//! Slot calculator.
//!
//! # Responsibility
//! - Decide which notification slots in a request window still need content.
//! - Convert (civil date, slot time) pairs into absolute instants.
//!
//! # Invariants
//! - All arithmetic runs in one fixed civil offset.
//! - A slot at or before `now` is never planned.
//! - Today's slots are sorted by time-of-day, followed by each subsequent
//!   full day's slots in the same order.

use crate::model::preferences::SlotTime;
use crate::model::validation::ValidationError;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;

/// How the window start relates to a civil midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// Window starts at `00:00`; the whole day is being synced.
    FullWindow,
    /// Window starts mid-day; only strictly future slots qualify.
    Incremental,
}

/// Input for one slot computation.
#[derive(Debug, Clone, Copy)]
pub struct SlotRequest<'a> {
    pub now: DateTime<FixedOffset>,
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
    /// Sorted unique notification times.
    pub notification_times: &'a [SlotTime],
    pub account_created_at: DateTime<FixedOffset>,
    pub offset: FixedOffset,
}

/// One notification slot on one civil day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub date: NaiveDate,
    pub time: SlotTime,
    pub at: DateTime<FixedOffset>,
}

/// Slots that need content, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPlan {
    pub kind: SyncKind,
    pub effective_start: DateTime<FixedOffset>,
    /// Qualifying slots on `now`'s civil date.
    pub today: Vec<Slot>,
    /// All slots of every full subsequent day.
    pub upcoming: Vec<Slot>,
    /// Number of subsequent civil days fully inside the window.
    pub full_days: u32,
}

impl SlotPlan {
    pub fn total_slots(&self) -> usize {
        self.today.len() + self.upcoming.len()
    }

    /// Iterates all slots chronologically.
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.today.iter().chain(self.upcoming.iter())
    }
}

/// Returns the absolute instant of a civil date and time-of-day.
pub fn civil_instant(
    date: NaiveDate,
    time: NaiveTime,
    offset: FixedOffset,
) -> DateTime<FixedOffset> {
    DateTime::from_naive_utc_and_offset(date.and_time(time) - offset, offset)
}

/// Checks window ordering and returns the end actually scheduled.
///
/// The end is pulled back to `from + max_days` days when the request spans
/// more than that.
pub fn bound_window(
    from: DateTime<FixedOffset>,
    to: DateTime<FixedOffset>,
    max_days: u32,
) -> Result<DateTime<FixedOffset>, ValidationError> {
    if to <= from {
        return Err(ValidationError::EmptyWindow);
    }
    let limit = from
        .checked_add_days(Days::new(u64::from(max_days)))
        .unwrap_or(to);
    Ok(to.min(limit))
}

/// Classifies the request by its window start.
pub fn classify(from: DateTime<FixedOffset>) -> SyncKind {
    if from.hour() == 0 && from.minute() == 0 {
        SyncKind::FullWindow
    } else {
        SyncKind::Incremental
    }
}

/// Computes which slots in `[from, to)` need content.
///
/// Zero slots is a valid result.
pub fn plan_slots(request: &SlotRequest<'_>) -> SlotPlan {
    let offset = request.offset;
    let now = request.now.with_timezone(&offset);
    let from = request.from.with_timezone(&offset);
    let to = request.to.with_timezone(&offset);
    let created_at = request.account_created_at.with_timezone(&offset);
    let today = now.date_naive();

    let kind = classify(from);
    let effective_start = match kind {
        SyncKind::FullWindow if created_at.date_naive() == today => created_at,
        SyncKind::FullWindow => from,
        SyncKind::Incremental => now,
    };

    let mut plan = SlotPlan {
        kind,
        effective_start,
        today: Vec::new(),
        upcoming: Vec::new(),
        full_days: 0,
    };
    if to <= from {
        return plan;
    }

    if from.date_naive() <= today && today < to.date_naive() {
        plan.today = request
            .notification_times
            .iter()
            .map(|time| Slot {
                date: today,
                time: *time,
                at: civil_instant(today, time.time(), offset),
            })
            .filter(|slot| {
                slot.at >= from && slot.at > effective_start && slot.at > now && slot.at < to
            })
            .collect();
    }

    let mut day = match today.checked_add_days(Days::new(1)) {
        Some(next) => next.max(from.date_naive()),
        None => return plan,
    };
    loop {
        let Some(next_day) = day.checked_add_days(Days::new(1)) else {
            break;
        };
        let day_start = civil_instant(day, NaiveTime::MIN, offset);
        let day_end = civil_instant(next_day, NaiveTime::MIN, offset);
        if day_end > to {
            break;
        }
        if day_start >= from {
            plan.full_days += 1;
            plan.upcoming
                .extend(request.notification_times.iter().map(|time| Slot {
                    date: day,
                    time: *time,
                    at: civil_instant(day, time.time(), offset),
                }));
        }
        day = next_day;
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::{bound_window, classify, plan_slots, SlotRequest, SyncKind};
    use crate::model::preferences::parse_notification_times;
    use crate::model::validation::ValidationError;
    use chrono::{DateTime, FixedOffset, TimeZone};

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        ist()
            .with_ymd_and_hms(2025, 3, day, hour, minute, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn window_start_at_midnight_is_full_sync() {
        assert_eq!(classify(at(10, 0, 0)), SyncKind::FullWindow);
        assert_eq!(classify(at(10, 0, 30)), SyncKind::Incremental);
        assert_eq!(classify(at(10, 12, 0)), SyncKind::Incremental);
    }

    #[test]
    fn existing_user_full_sync_covers_rest_of_today_and_next_day() {
        let times = parse_notification_times(&["09:00", "13:00", "18:00", "21:00"]).unwrap();
        let plan = plan_slots(&SlotRequest {
            now: at(10, 10, 0),
            from: at(10, 0, 0),
            to: at(12, 0, 0),
            notification_times: &times,
            account_created_at: at(1, 8, 0),
            offset: ist(),
        });

        let today: Vec<String> = plan.today.iter().map(|slot| slot.time.to_string()).collect();
        assert_eq!(today, vec!["13:00", "18:00", "21:00"]);
        assert_eq!(plan.full_days, 1);
        assert_eq!(plan.upcoming.len(), 4);
        assert_eq!(plan.total_slots(), 7);
        assert_eq!(plan.upcoming[0].at, at(11, 9, 0));
    }

    #[test]
    fn new_user_full_sync_skips_slots_before_registration() {
        let times = parse_notification_times(&["09:00", "13:00", "18:00", "21:00"]).unwrap();
        let plan = plan_slots(&SlotRequest {
            now: at(10, 14, 5),
            from: at(10, 0, 0),
            to: at(11, 0, 0),
            notification_times: &times,
            account_created_at: at(10, 14, 0),
            offset: ist(),
        });
        assert_eq!(plan.effective_start, at(10, 14, 0));
        let today: Vec<String> = plan.today.iter().map(|slot| slot.time.to_string()).collect();
        assert_eq!(today, vec!["18:00", "21:00"]);
        assert!(plan.upcoming.is_empty());
    }

    #[test]
    fn incremental_sync_keeps_only_strictly_future_slots() {
        let times = parse_notification_times(&["09:00", "13:00", "18:00"]).unwrap();
        let plan = plan_slots(&SlotRequest {
            now: at(10, 13, 0),
            from: at(10, 13, 0),
            to: at(11, 0, 0),
            notification_times: &times,
            account_created_at: at(1, 0, 0),
            offset: ist(),
        });
        assert_eq!(plan.kind, SyncKind::Incremental);
        assert_eq!(plan.total_slots(), 1);
        assert_eq!(plan.today[0].at, at(10, 18, 0));
    }

    #[test]
    fn late_request_yields_empty_plan() {
        let times = parse_notification_times(&["09:00"]).unwrap();
        let plan = plan_slots(&SlotRequest {
            now: at(10, 23, 0),
            from: at(10, 0, 0),
            to: at(11, 0, 0),
            notification_times: &times,
            account_created_at: at(1, 0, 0),
            offset: ist(),
        });
        assert_eq!(plan.total_slots(), 0);
    }

    #[test]
    fn long_window_is_clamped_not_rejected() {
        assert_eq!(
            bound_window(at(10, 0, 0), at(10, 0, 0), 7),
            Err(ValidationError::EmptyWindow)
        );
        assert_eq!(bound_window(at(10, 0, 0), at(17, 0, 0), 7), Ok(at(17, 0, 0)));
        assert_eq!(bound_window(at(10, 0, 0), at(24, 6, 0), 7), Ok(at(17, 0, 0)));
        assert_eq!(bound_window(at(10, 9, 30), at(20, 0, 0), 2), Ok(at(12, 9, 30)));
    }
}
