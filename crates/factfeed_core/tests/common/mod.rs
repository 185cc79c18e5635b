#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use factfeed_core::repo::account_repo::AccountStore;
use factfeed_core::repo::content_repo::ContentPool;
use factfeed_core::{
    ContentItem, ExamType, SqliteAccountStore, SqliteContentPool, SubscriptionTier, UserAccount,
    UserId,
};
use rusqlite::Connection;
use uuid::Uuid;

pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(330 * 60).unwrap()
}

/// Civil instant in March 2025, IST.
pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    ist()
        .with_ymd_and_hms(2025, 3, day, hour, minute, 0)
        .single()
        .unwrap()
}

pub fn ms(instant: DateTime<FixedOffset>) -> i64 {
    instant.timestamp_millis()
}

pub fn seed_account(
    conn: &Connection,
    created_at: DateTime<FixedOffset>,
    tier: SubscriptionTier,
) -> UserId {
    let mut account = UserAccount::new(Uuid::new_v4(), ms(created_at));
    account.tier = tier;
    SqliteAccountStore::try_new(conn)
        .unwrap()
        .upsert_account(&account)
        .unwrap();
    account.user_id
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

/// Inserts `count` facts; higher index means newer.
pub fn seed_facts(conn: &Connection, exam: ExamType, count: usize) -> Vec<ContentItem> {
    let pool = SqliteContentPool::try_new(conn).unwrap();
    (0..count)
        .map(|index| {
            let item = ContentItem::fact(
                exam,
                format!("{exam} fact {index}"),
                "A short current-affairs fact.",
                day(),
                day(),
                1_000 + index as i64,
            )
            .with_category("Polity");
            pool.insert_content(&item).unwrap();
            item
        })
        .collect()
}

/// Inserts `count` questions; higher index means newer.
pub fn seed_questions(conn: &Connection, exam: ExamType, count: usize) -> Vec<ContentItem> {
    let pool = SqliteContentPool::try_new(conn).unwrap();
    (0..count)
        .map(|index| {
            let item = ContentItem::question(
                exam,
                format!("{exam} question {index}"),
                "Which body made the announcement?",
                vec!["A".into(), "B".into(), "C".into(), "D".into()],
                "B",
                day(),
                day(),
                2_000 + index as i64,
            )
            .with_explanation("Announced in the weekly bulletin.");
            pool.insert_content(&item).unwrap();
            item
        })
        .collect()
}
