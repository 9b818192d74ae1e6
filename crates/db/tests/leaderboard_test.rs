// crates/db/tests/leaderboard_test.rs
//! Leaderboard rebuild and community-benchmark computation.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use burntop_core::Period;
use burntop_db::{Database, LeaderboardSort, NewUser, UsageDelta};

async fn fresh_db() -> Database {
    Database::new_in_memory().await.unwrap()
}

async fn create_user(db: &Database, name: &str) -> Uuid {
    db.users()
        .create(&NewUser {
            email: format!("{name}@example.com"),
            username: name.to_string(),
            display_name: None,
        })
        .await
        .unwrap()
        .id
}

fn tokens_on(user_id: Uuid, date: NaiveDate, input: i64) -> UsageDelta {
    UsageDelta {
        user_id,
        date,
        source: "cursor".into(),
        model: "claude-3-5-sonnet-20241022".into(),
        machine_id: "default".into(),
        input_tokens: input,
        output_tokens: 0,
        cache_read_tokens: 0,
        cache_write_tokens: 0,
        reasoning_tokens: 0,
        cost: dec!(1.0000),
        usage_timestamp: 1_700_000_000,
        synced_at: 1_700_000_000,
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[tokio::test]
async fn weekly_window_excludes_old_usage() {
    let db = fresh_db().await;
    let usage = db.usage();

    // user0 has 1M tokens 10 days ago plus 50K 3 days ago; the rest have
    // their full totals within the last week.
    let users = [
        create_user(&db, "user0").await,
        create_user(&db, "user1").await,
        create_user(&db, "user2").await,
        create_user(&db, "user3").await,
        create_user(&db, "user4").await,
    ];
    usage
        .upsert_daily(&[
            tokens_on(users[0], today() - Duration::days(10), 1_000_000),
            tokens_on(users[0], today() - Duration::days(3), 50_000),
            tokens_on(users[1], today() - Duration::days(2), 100_000),
            tokens_on(users[2], today() - Duration::days(2), 500_000),
            tokens_on(users[3], today() - Duration::days(2), 200_000),
            tokens_on(users[4], today() - Duration::days(2), 300_000),
        ])
        .await
        .unwrap();

    let board = db.leaderboard();
    assert_eq!(board.rebuild_period(Period::All, today()).await.unwrap(), 5);
    assert_eq!(board.rebuild_period(Period::Week, today()).await.unwrap(), 5);

    let (all, _) = board
        .rankings_page(Period::All, LeaderboardSort::Tokens, 100, 0)
        .await
        .unwrap();
    let all_order: Vec<i64> = all.iter().map(|e| e.total_tokens).collect();
    assert_eq!(all_order, vec![1_050_000, 500_000, 300_000, 200_000, 100_000]);
    assert_eq!(all[0].user_id, users[0]);
    assert_eq!(all[0].rank, 1);

    let (week, _) = board
        .rankings_page(Period::Week, LeaderboardSort::Tokens, 100, 0)
        .await
        .unwrap();
    let week_order: Vec<i64> = week.iter().map(|e| e.total_tokens).collect();
    assert_eq!(week_order, vec![500_000, 300_000, 200_000, 100_000, 50_000]);
    assert_eq!(week.last().unwrap().user_id, users[0], "user0 ranks last in the week");

    // Ranks are dense 1..N.
    let ranks: Vec<i64> = week.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn rank_change_is_previous_minus_new() {
    let db = fresh_db().await;
    let usage = db.usage();
    let board = db.leaderboard();

    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;

    usage
        .upsert_daily(&[
            tokens_on(alice, today(), 1000),
            tokens_on(bob, today(), 500),
        ])
        .await
        .unwrap();
    board.rebuild_period(Period::All, today()).await.unwrap();

    // First build: everybody is a newcomer → rank_change is NULL.
    let first = board.user_rank(bob, Period::All).await.unwrap().unwrap();
    assert_eq!(first.rank, 2);
    assert_eq!(first.rank_change, None);

    // Bob overtakes alice; his rank improves 2 → 1, change = +1.
    usage
        .upsert_daily(&[tokens_on(bob, today(), 10_000)])
        .await
        .unwrap();
    board.rebuild_period(Period::All, today()).await.unwrap();

    let bob_entry = board.user_rank(bob, Period::All).await.unwrap().unwrap();
    assert_eq!(bob_entry.rank, 1);
    assert_eq!(bob_entry.rank_change, Some(1));
    let alice_entry = board.user_rank(alice, Period::All).await.unwrap().unwrap();
    assert_eq!(alice_entry.rank, 2);
    assert_eq!(alice_entry.rank_change, Some(-1));
}

#[tokio::test]
async fn soft_deleted_users_disappear_from_reads() {
    let db = fresh_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    db.usage()
        .upsert_daily(&[
            tokens_on(alice, today(), 1000),
            tokens_on(bob, today(), 500),
        ])
        .await
        .unwrap();
    db.leaderboard().rebuild_period(Period::All, today()).await.unwrap();

    db.users().soft_delete(bob).await.unwrap();

    let (entries, _) = db
        .leaderboard()
        .rankings_page(Period::All, LeaderboardSort::Tokens, 100, 0)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].username, "alice");
    assert_eq!(db.leaderboard().count(Period::All).await.unwrap(), 1);
}

#[tokio::test]
async fn pagination_reports_has_more() {
    let db = fresh_db().await;
    for i in 0..5 {
        let user = create_user(&db, &format!("user{i}")).await;
        db.usage()
            .upsert_daily(&[tokens_on(user, today(), 1000 - i as i64)])
            .await
            .unwrap();
    }
    db.leaderboard().rebuild_period(Period::All, today()).await.unwrap();

    let (page, has_more) = db
        .leaderboard()
        .rankings_page(Period::All, LeaderboardSort::Tokens, 2, 0)
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert!(has_more);

    let (page, has_more) = db
        .leaderboard()
        .rankings_page(Period::All, LeaderboardSort::Tokens, 2, 4)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert!(!has_more);
}

#[tokio::test]
async fn benchmark_with_no_users_is_all_null() {
    let db = fresh_db().await;
    let row = db
        .benchmarks()
        .compute_and_store(Period::Week, today())
        .await
        .unwrap();
    assert_eq!(row.total_users, 0);
    assert_eq!(row.avg_tokens, None);
    assert_eq!(row.median_tokens, None);
    assert_eq!(row.total_community_tokens, None);
    assert_eq!(row.avg_cost, None);
    assert_eq!(row.avg_streak, None);
    assert_eq!(row.avg_unique_tools, None);
    assert_eq!(row.avg_cache_efficiency, None);
}

#[tokio::test]
async fn benchmark_aggregates_per_user_totals() {
    let db = fresh_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;

    db.usage()
        .upsert_daily(&[
            tokens_on(alice, today(), 100),
            tokens_on(bob, today(), 300),
        ])
        .await
        .unwrap();
    db.streaks().update_streak(alice, today(), "UTC").await.unwrap();

    let row = db
        .benchmarks()
        .compute_and_store(Period::All, today())
        .await
        .unwrap();
    assert_eq!(row.total_users, 2);
    assert_eq!(row.avg_tokens, Some(200));
    // Lower median of [100, 300] picks the n/2-th order statistic.
    assert_eq!(row.median_tokens, Some(300));
    assert_eq!(row.total_community_tokens, Some(400));
    assert_eq!(row.avg_cost, Some(dec!(1.0000)));
    assert_eq!(row.avg_streak, Some(1));
    assert_eq!(row.avg_unique_tools, Some(1));
    // No cache reads anywhere → efficiency averages to exactly zero.
    assert_eq!(row.avg_cache_efficiency, Some(0.0));

    // Re-running upserts the same single row per period.
    db.benchmarks().compute_and_store(Period::All, today()).await.unwrap();
    let count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM community_benchmarks WHERE period = 'all'")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(count.0, 1);
}

#[tokio::test]
async fn streak_percentile_counts_strictly_below() {
    let db = fresh_db().await;
    for (name, days) in [("usr1", 1_i64), ("usr2", 3), ("usr3", 7), ("usr4", 10)] {
        let user = create_user(&db, name).await;
        let start = today() - Duration::days(days - 1);
        for offset in 0..days {
            db.streaks()
                .update_streak(user, start + Duration::days(offset), "UTC")
                .await
                .unwrap();
        }
    }

    // Streaks are [1, 3, 7, 10]; a 7-day streak beats two of four rows.
    let pct = db.benchmarks().streak_percentile(7).await.unwrap();
    assert_eq!(pct, 50.0);
    let pct = db.benchmarks().streak_percentile(10).await.unwrap();
    assert_eq!(pct, 75.0);
}
