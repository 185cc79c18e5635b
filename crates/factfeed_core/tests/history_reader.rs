mod common;

use common::{at, ms, seed_account, seed_facts, seed_questions};
use factfeed_core::db::open_db_in_memory;
use factfeed_core::repo::account_repo::AccountStore;
use factfeed_core::repo::delivery_repo::DeliveryLedger;
use factfeed_core::{
    sqlite_service, ExamType, FeedConfig, HistoryRequest, ServiceError, SqliteAccountStore,
    SqliteDeliveryLedger, SubscriptionTier, UserPreferences, ValidationError,
};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn start_subscription(conn: &Connection, user: Uuid, started_day: u32) {
    let store = SqliteAccountStore::try_new(conn).unwrap();
    let mut account = store.get_account(user).unwrap().unwrap();
    account.subscription_started_at = Some(ms(at(started_day, 10, 0)));
    store.upsert_account(&account).unwrap();
    store
        .upsert_preferences(&UserPreferences::defaults_for(user))
        .unwrap();
}

fn request(user_id: Uuid) -> HistoryRequest {
    HistoryRequest {
        user_id,
        page: 1,
        page_size: 20,
    }
}

#[test]
fn history_starts_at_subscription_and_ends_before_today() {
    let conn = open_db_in_memory().unwrap();
    let user = seed_account(&conn, at(1, 8, 0), SubscriptionTier::Premium);
    start_subscription(&conn, user, 10);
    let facts = seed_facts(&conn, ExamType::Upsc, 4);
    let ledger = SqliteDeliveryLedger::try_new(&conn).unwrap();

    ledger
        .mark_delivered(user, &[facts[0].id], ms(at(5, 9, 0)), "mobile")
        .unwrap();
    ledger
        .mark_delivered(user, &[facts[1].id], ms(at(12, 13, 0)), "mobile")
        .unwrap();
    ledger
        .mark_delivered(user, &[facts[2].id], ms(at(19, 21, 0)), "mobile")
        .unwrap();
    ledger
        .mark_delivered(user, &[facts[3].id], ms(at(20, 9, 0)), "mobile")
        .unwrap();

    let service = sqlite_service(&conn, FeedConfig::default()).unwrap();
    let page = service.history_for_tier(&request(user), at(20, 10, 0)).unwrap();

    let ids: Vec<Uuid> = page.items.iter().map(|entry| entry.item.id).collect();
    assert_eq!(ids, vec![facts[2].id, facts[1].id]);
    assert_eq!(page.items[0].delivered_at, at(19, 21, 0));
    assert_eq!(page.window_start, at(10, 10, 0));
    assert_eq!(page.window_end, at(20, 0, 0));
    assert_eq!((page.counts.facts, page.counts.questions), (2, 0));

    let value = serde_json::to_value(&page).unwrap();
    assert_eq!(value["items"][0]["delivered_at"], json!("2025-03-19T21:00:00+05:30"));
    assert_eq!(value["counts"]["total"], json!(2));
}

#[test]
fn retention_caps_history_without_subscription_start() {
    let conn = open_db_in_memory().unwrap();
    let user = seed_account(&conn, at(1, 8, 0), SubscriptionTier::Trial);
    SqliteAccountStore::try_new(&conn)
        .unwrap()
        .upsert_preferences(&UserPreferences::defaults_for(user))
        .unwrap();
    let facts = seed_facts(&conn, ExamType::Upsc, 2);
    let ledger = SqliteDeliveryLedger::try_new(&conn).unwrap();
    ledger
        .mark_delivered(user, &[facts[0].id], ms(at(2, 9, 0)), "mobile")
        .unwrap();
    ledger
        .mark_delivered(user, &[facts[1].id], ms(at(25, 9, 0)), "mobile")
        .unwrap();

    let config = FeedConfig {
        history_retention_days: 7,
        ..FeedConfig::default()
    };
    let service = sqlite_service(&conn, config).unwrap();
    let page = service.history(&request(user), at(28, 12, 0)).unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].item.id, facts[1].id);
}

#[test]
fn history_follows_current_exam_filter_and_pages() {
    let conn = open_db_in_memory().unwrap();
    let user = seed_account(&conn, at(1, 8, 0), SubscriptionTier::Premium);
    start_subscription(&conn, user, 1);
    let upsc = seed_questions(&conn, ExamType::Upsc, 3);
    let ssc = seed_facts(&conn, ExamType::Ssc, 2);
    let ledger = SqliteDeliveryLedger::try_new(&conn).unwrap();
    for (hour, item) in upsc.iter().chain(ssc.iter()).enumerate() {
        ledger
            .mark_delivered(user, &[item.id], ms(at(15, hour as u32 + 8, 0)), "mobile")
            .unwrap();
    }
    let service = sqlite_service(&conn, FeedConfig::default()).unwrap();
    let now = at(20, 10, 0);

    let first = service
        .history(
            &HistoryRequest {
                user_id: user,
                page: 1,
                page_size: 2,
            },
            now,
        )
        .unwrap();
    let second = service
        .history(
            &HistoryRequest {
                user_id: user,
                page: 2,
                page_size: 2,
            },
            now,
        )
        .unwrap();
    let third = service
        .history(
            &HistoryRequest {
                user_id: user,
                page: 3,
                page_size: 2,
            },
            now,
        )
        .unwrap();

    assert_eq!(
        first.items.iter().map(|e| e.item.id).collect::<Vec<_>>(),
        vec![upsc[2].id, upsc[1].id]
    );
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].item.id, upsc[0].id);
    assert_eq!((second.counts.facts, second.counts.questions), (0, 1));
    assert!(third.items.is_empty());
}

#[test]
fn free_accounts_and_lapsed_trials_are_gated() {
    let conn = open_db_in_memory().unwrap();
    let free = seed_account(&conn, at(1, 8, 0), SubscriptionTier::Free);
    let trial = seed_account(&conn, at(1, 8, 0), SubscriptionTier::Trial);
    let store = SqliteAccountStore::try_new(&conn).unwrap();
    let mut lapsed = store.get_account(trial).unwrap().unwrap();
    lapsed.subscription_expires_at = Some(ms(at(15, 0, 0)));
    store.upsert_account(&lapsed).unwrap();
    let service = sqlite_service(&conn, FeedConfig::default()).unwrap();
    let now = at(20, 10, 0);

    for user in [free, trial] {
        let err = service.history_for_tier(&request(user), now).unwrap_err();
        assert!(matches!(err, ServiceError::PremiumRequired));
        assert!(!err.is_retryable());
    }
}

#[test]
fn invalid_page_and_missing_records() {
    let conn = open_db_in_memory().unwrap();
    let user = seed_account(&conn, at(1, 8, 0), SubscriptionTier::Premium);
    let service = sqlite_service(&conn, FeedConfig::default()).unwrap();
    let now = at(20, 10, 0);

    let zero_page = HistoryRequest {
        user_id: user,
        page: 0,
        page_size: 10,
    };
    assert!(matches!(
        service.history(&zero_page, now),
        Err(ServiceError::Validation(ValidationError::InvalidPage { .. }))
    ));

    // No preference record yet.
    assert!(matches!(
        service.history(&request(user), now),
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        service.history(&request(Uuid::new_v4()), now),
        Err(ServiceError::NotFound(_))
    ));

    SqliteAccountStore::try_new(&conn)
        .unwrap()
        .upsert_preferences(&UserPreferences::defaults_for(user))
        .unwrap();
    let empty = service.history(&request(user), now).unwrap();
    assert!(empty.items.is_empty());
    assert_eq!(empty.counts.total, 0);
}
