//! Slot assignment.
//!
//! # Invariants
//! - Slots are filled in plan order with exactly `items_per_slot` items
//!   each, from the front of the selection (facts first).
//! - Reported counts describe what was assigned, never what was requested.

use super::selection::Selection;
use super::slots::SlotPlan;
use crate::model::content::{ContentItem, ContentType};
use chrono::{DateTime, FixedOffset};

/// One content item bound to a delivery instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAssignment {
    pub item: ContentItem,
    pub scheduled_at: DateTime<FixedOffset>,
}

/// Output of one assignment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub items: Vec<ScheduledAssignment>,
    pub facts: u32,
    pub questions: u32,
    /// Selected items left over after the last slot.
    pub dropped: u32,
}

impl Assignment {
    pub fn total(&self) -> u32 {
        self.facts + self.questions
    }
}

/// Maps selected items onto slots.
///
/// Stops when slots or items run out. The last filled slot may receive fewer
/// than `items_per_slot` items.
pub fn assign_slots(selection: Selection, plan: &SlotPlan, items_per_slot: u32) -> Assignment {
    let mut assignment = Assignment::default();
    let mut items = selection.into_ordered();
    let per_slot = usize::try_from(items_per_slot).unwrap_or(usize::MAX);

    'slots: for slot in plan.slots() {
        for _ in 0..per_slot {
            let Some(item) = items.next() else {
                break 'slots;
            };
            match item.content_type {
                ContentType::Fact => assignment.facts += 1,
                ContentType::Question => assignment.questions += 1,
            }
            assignment.items.push(ScheduledAssignment {
                item,
                scheduled_at: slot.at,
            });
        }
    }

    assignment.dropped = u32::try_from(items.count()).unwrap_or(u32::MAX);
    assignment
}

#[cfg(test)]
mod tests {
    use super::assign_slots;
    use crate::model::content::{ContentItem, ExamType};
    use crate::model::preferences::parse_notification_times;
    use crate::schedule::selection::Selection;
    use crate::schedule::slots::{plan_slots, SlotRequest};
    use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(2025, 3, day, hour, 0, 0).single().unwrap()
    }

    fn selection(facts: usize, questions: usize) -> Selection {
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        Selection {
            facts: (0..facts)
                .map(|i| ContentItem::fact(ExamType::Upsc, format!("f{i}"), "d", day, day, 0))
                .collect(),
            questions: (0..questions)
                .map(|i| {
                    ContentItem::question(
                        ExamType::Upsc,
                        format!("q{i}"),
                        "d",
                        vec!["a".into(), "b".into()],
                        "a",
                        day,
                        day,
                        0,
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn fills_slots_in_order_and_drops_leftovers() {
        let times = parse_notification_times(&["09:00", "18:00"]).unwrap();
        let plan = plan_slots(&SlotRequest {
            now: at(10, 8),
            from: at(10, 0),
            to: at(11, 0),
            notification_times: &times,
            account_created_at: at(1, 0),
            offset: ist(),
        });

        let assignment = assign_slots(selection(4, 1), &plan, 2);
        assert_eq!(assignment.items.len(), 4);
        assert_eq!(assignment.dropped, 1);
        assert_eq!((assignment.facts, assignment.questions), (4, 0));
        assert_eq!(assignment.items[0].scheduled_at, at(10, 9));
        assert_eq!(assignment.items[1].scheduled_at, at(10, 9));
        assert_eq!(assignment.items[2].scheduled_at, at(10, 18));
    }

    #[test]
    fn shortfall_leaves_last_slot_partially_filled() {
        let times = parse_notification_times(&["09:00", "13:00", "18:00", "21:00"]).unwrap();
        let plan = plan_slots(&SlotRequest {
            now: at(10, 10),
            from: at(10, 0),
            to: at(12, 0),
            notification_times: &times,
            account_created_at: at(1, 0),
            offset: ist(),
        });

        let assignment = assign_slots(selection(4, 1), &plan, 3);
        assert_eq!(assignment.total(), 5);
        assert_eq!(assignment.dropped, 0);
        assert_eq!(assignment.items[4].item.title, "q0");
        assert_eq!(assignment.items[4].scheduled_at, at(10, 18));
    }
}
