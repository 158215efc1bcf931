//! Periodic overdue sweep.
//!
//! Every tick finds open tasks whose end date has passed and that have not
//! been flagged yet, sends the owner a `task_overdue` notification and sets
//! the flag. Ticks run one after another on a single task, so a slow sweep
//! delays the next tick instead of overlapping it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::AppError;
use crate::handlers::notification::insert_notification;
use crate::models::notification::NotificationKind;
use crate::models::task::{Task, TASK_COLUMNS};

pub struct OverdueSweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl OverdueSweeper {
    pub fn start(pool: PgPool, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(pool, interval, cancel.clone()));
        OverdueSweeper { cancel, handle }
    }

    /// Cancels the loop and waits for an in-flight sweep to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            log::error!("Overdue sweeper terminated abnormally: {}", e);
        }
    }
}

async fn run(pool: PgPool, interval: Duration, cancel: CancellationToken) {
    log::info!("Overdue sweeper started, interval {}s", interval.as_secs());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("Overdue sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                match sweep_once(&pool, Utc::now()).await {
                    Ok(0) => log::debug!("Overdue sweep: nothing new"),
                    Ok(flagged) => log::info!("Overdue sweep: notified {} task owner(s)", flagged),
                    Err(e) => log::error!("Overdue sweep failed: {}", e),
                }
            }
        }
    }
}

/// Runs one sweep and returns how many tasks were newly flagged.
pub async fn sweep_once(pool: &PgPool, now: DateTime<Utc>) -> Result<usize, AppError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "SELECT {} FROM tasks WHERE status <> 'completed' AND NOT overdue_notified \
         AND end_date IS NOT NULL AND end_date <= $1 FOR UPDATE SKIP LOCKED",
        TASK_COLUMNS
    );
    let candidates = sqlx::query_as::<_, Task>(&sql)
        .bind(now.date_naive())
        .fetch_all(&mut *tx)
        .await?;

    let overdue: Vec<Task> = candidates.into_iter().filter(|task| task.is_overdue(now)).collect();
    if overdue.is_empty() {
        tx.commit().await?;
        return Ok(0);
    }

    for task in &overdue {
        insert_notification(
            &mut *tx,
            task.user_id,
            &format!("Task overdue: {}", task.task_name),
            NotificationKind::TaskOverdue,
            task.project.as_deref(),
            task.end_date,
        )
        .await?;
    }

    let ids: Vec<Uuid> = overdue.iter().map(|task| task.task_id).collect();
    sqlx::query("UPDATE tasks SET overdue_notified = TRUE WHERE task_id = ANY($1)")
        .bind(&ids)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(overdue.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[actix_web::test]
    async fn sweeper_stops_promptly_when_cancelled() {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://localhost/taskdesk_unused")
            .unwrap();
        // Long interval: only the immediate first tick fires, and its error
        // (no database) is logged rather than ending the loop.
        let sweeper = OverdueSweeper::start(pool, Duration::from_secs(3600));
        tokio::time::timeout(Duration::from_secs(30), sweeper.stop())
            .await
            .expect("sweeper did not stop");
    }
}
