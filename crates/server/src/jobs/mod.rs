// crates/server/src/jobs/mod.rs
//! Background jobs: leaderboard rebuild every minute, community
//! benchmarks hourly at minute 5.
//!
//! Each job runs on its own tokio task with skip-on-overrun semantics:
//! ticks that land while a run is still in flight are coalesced into the
//! next one, so a job never has two concurrent instances. A failing run
//! logs and never stops the loop. All schedule math is UTC.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use tokio::time::MissedTickBehavior;

use burntop_core::Period;
use burntop_db::{Database, DbResult};

use crate::state::AppState;

const LEADERBOARD_INTERVAL: Duration = Duration::from_secs(60);
/// Minute of the hour the benchmark job fires at.
const BENCHMARK_MINUTE: u32 = 5;

/// Spawn both schedulers. Called once from `main`.
pub fn spawn(state: Arc<AppState>) {
    let db = state.db.clone();
    tokio::spawn(leaderboard_loop(db));

    let db = state.db.clone();
    tokio::spawn(benchmark_loop(db));
}

async fn leaderboard_loop(db: Database) {
    let mut interval = tokio::time::interval(LEADERBOARD_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // the first tick fires immediately; skip it

    loop {
        interval.tick().await;
        tracing::info!(job = "leaderboard", "Starting leaderboard cache update");
        match run_leaderboard_update(&db).await {
            Ok(total) => {
                tracing::info!(job = "leaderboard", entries = total, "Leaderboard cache updated")
            }
            Err(e) => tracing::error!(job = "leaderboard", error = %e, "Leaderboard update failed"),
        }
    }
}

async fn benchmark_loop(db: Database) {
    loop {
        tokio::time::sleep(until_next_benchmark_tick()).await;
        tracing::info!(job = "benchmarks", "Starting community benchmarks update");
        match run_benchmark_update(&db).await {
            Ok(()) => tracing::info!(job = "benchmarks", "Community benchmarks updated"),
            Err(e) => tracing::error!(job = "benchmarks", error = %e, "Benchmark update failed"),
        }
    }
}

/// Time until the next minute-5 boundary (UTC). A run that overshoots
/// into the next hour simply waits for the following boundary; missed
/// ticks coalesce.
fn until_next_benchmark_tick() -> Duration {
    let now = Utc::now();
    let this_hour = now
        .with_minute(BENCHMARK_MINUTE)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let next = if this_hour > now {
        this_hour
    } else {
        this_hour + chrono::Duration::hours(1)
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(3600))
}

/// Rebuild every period's rankings. Returns total cached entries.
pub async fn run_leaderboard_update(db: &Database) -> DbResult<usize> {
    let today = Utc::now().date_naive();
    let board = db.leaderboard();
    let mut total = 0;
    for period in Period::ALL_PERIODS {
        let entries = board.rebuild_period(period, today).await?;
        tracing::debug!(period = %period, entries, "Rankings computed");
        total += entries;
    }
    Ok(total)
}

/// Recompute every period's community benchmark.
pub async fn run_benchmark_update(db: &Database) -> DbResult<()> {
    let today = Utc::now().date_naive();
    let benchmarks = db.benchmarks();
    for period in Period::ALL_PERIODS {
        let row = benchmarks.compute_and_store(period, today).await?;
        tracing::debug!(
            period = %period,
            total_users = row.total_users,
            avg_tokens = ?row.avg_tokens,
            "Benchmark computed"
        );
    }
    Ok(())
}
