//! SQLite-backed job store.

use crate::error::StoreError;
use crate::job::{BackoffPolicy, INTERRUPTED_REASON, JobCounts, JobState, QueuedJob};
use crate::store::{JobStore, inclusive_len};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodeflow_core::JobId;
use nodeflow_workflow::envelope;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::info;

const COLUMNS: &str = "id, state, attempts_made, max_attempts, backoff_base_ms, progress, \
                       data, result, failed_reason, enqueued_at, started_at, finished_at, run_at";

/// Row type for job queries.
#[derive(FromRow)]
struct JobRow {
    id: String,
    state: String,
    attempts_made: i64,
    max_attempts: i64,
    backoff_base_ms: i64,
    progress: i64,
    data: String,
    result: Option<String>,
    failed_reason: Option<String>,
    enqueued_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    run_at: Option<i64>,
}

impl JobRow {
    fn try_into_job(self) -> Result<QueuedJob, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let id = JobId::from_str(&self.id).map_err(|e| corrupt(e.to_string()))?;
        let state = JobState::from_str(&self.state).map_err(corrupt)?;
        let data = envelope::decode(&self.data).map_err(|e| corrupt(e.to_string()))?;
        let result = self
            .result
            .as_deref()
            .map(envelope::decode)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let timestamp = |ms: i64| {
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| corrupt(format!("timestamp out of range: {ms}")))
        };
        let count = |value: i64, column: &str| {
            u32::try_from(value).map_err(|_| corrupt(format!("{column} out of range: {value}")))
        };

        Ok(QueuedJob {
            id,
            state,
            attempts_made: count(self.attempts_made, "attempts_made")?,
            max_attempts: count(self.max_attempts, "max_attempts")?,
            backoff: BackoffPolicy::exponential(u64::try_from(self.backoff_base_ms).unwrap_or(0)),
            progress: u8::try_from(self.progress.clamp(0, 100)).unwrap_or(0),
            data,
            result,
            failed_reason: self.failed_reason.clone(),
            enqueued_at: timestamp(self.enqueued_at)?,
            started_at: self.started_at.map(timestamp).transpose()?,
            finished_at: self.finished_at.map(timestamp).transpose()?,
            run_at: self.run_at.map(timestamp).transpose()?,
        })
    }
}

/// Encoded column values of a job, ready to bind.
struct JobColumns {
    data: String,
    result: Option<String>,
}

impl JobColumns {
    fn encode(job: &QueuedJob) -> Result<Self, StoreError> {
        let corrupt = |e: envelope::EnvelopeError| StoreError::Corrupt {
            id: job.id.to_string(),
            reason: e.to_string(),
        };
        Ok(Self {
            data: envelope::encode(&job.data).map_err(corrupt)?,
            result: job
                .result
                .as_ref()
                .map(envelope::encode)
                .transpose()
                .map_err(corrupt)?,
        })
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable {
        reason: e.to_string(),
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// A [`JobStore`] persisted in SQLite.
///
/// Jobs survive restarts; call [`JobStore::recover_active`] on startup to
/// recover attempts interrupted by a crash.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Wraps an existing pool. The schema must already be migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `url` and migrates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(unavailable)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(unavailable)?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Runs the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("running job store migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &QueuedJob) -> Result<(), StoreError> {
        let columns = JobColumns::encode(job)?;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, state, attempts_made, max_attempts, backoff_base_ms, progress,
                              data, result, failed_reason, enqueued_at, started_at, finished_at, run_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.state.as_str())
        .bind(i64::from(job.attempts_made))
        .bind(i64::from(job.max_attempts))
        .bind(to_i64(job.backoff.base_ms))
        .bind(i64::from(job.progress))
        .bind(columns.data)
        .bind(columns.result)
        .bind(job.failed_reason.as_deref())
        .bind(millis(job.enqueued_at))
        .bind(job.started_at.map(millis))
        .bind(job.finished_at.map(millis))
        .bind(job.run_at.map(millis))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<QueuedJob>, StoreError> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        row.map(JobRow::try_into_job).transpose()
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>, StoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs
            SET state = 'active',
                attempts_made = attempts_made + 1,
                progress = 0,
                result = NULL,
                failed_reason = NULL,
                started_at = ?1,
                finished_at = NULL,
                run_at = NULL
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'waiting' OR (state = 'delayed' AND run_at <= ?1)
                ORDER BY COALESCE(run_at, enqueued_at), id
                LIMIT 1
            )
            RETURNING {COLUMNS}
            "#
        ))
        .bind(millis(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(JobRow::try_into_job).transpose()
    }

    async fn replace(&self, job: &QueuedJob, expected: JobState) -> Result<bool, StoreError> {
        let columns = JobColumns::encode(job)?;
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, attempts_made = ?, max_attempts = ?, backoff_base_ms = ?, progress = ?,
                data = ?, result = ?, failed_reason = ?, enqueued_at = ?, started_at = ?,
                finished_at = ?, run_at = ?
            WHERE id = ? AND state = ?
            "#,
        )
        .bind(job.state.as_str())
        .bind(i64::from(job.attempts_made))
        .bind(i64::from(job.max_attempts))
        .bind(to_i64(job.backoff.base_ms))
        .bind(i64::from(job.progress))
        .bind(columns.data)
        .bind(columns.result)
        .bind(job.failed_reason.as_deref())
        .bind(millis(job.enqueued_at))
        .bind(job.started_at.map(millis))
        .bind(job.finished_at.map(millis))
        .bind(job.run_at.map(millis))
        .bind(job.id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_progress(&self, id: JobId, progress: u8) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE jobs SET progress = ? WHERE id = ? AND state = 'active'")
            .bind(i64::from(progress))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(
        &self,
        state: JobState,
        start: usize,
        end: usize,
    ) -> Result<Vec<QueuedJob>, StoreError> {
        let limit = inclusive_len(start, end);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let order = if state.is_finished() {
            "finished_at DESC, id DESC"
        } else {
            "enqueued_at ASC, id ASC"
        };
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM jobs WHERE state = ? ORDER BY {order} LIMIT ? OFFSET ?"
        ))
        .bind(state.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(start).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter().map(JobRow::try_into_job).collect()
    }

    async fn counts(&self) -> Result<JobCounts, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;

        let mut counts = JobCounts::default();
        for (state, count) in rows {
            let state = JobState::from_str(&state).map_err(|reason| StoreError::Corrupt {
                id: "*".to_string(),
                reason,
            })?;
            counts.add(state, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    async fn delete(&self, id: JobId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_finished_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobId>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            DELETE FROM jobs
            WHERE state IN ('completed', 'failed') AND finished_at < ?
            RETURNING id
            "#,
        )
        .bind(millis(cutoff))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(|(id,)| {
                JobId::from_str(&id).map_err(|e| StoreError::Corrupt {
                    id,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn recover_active(&self, now: DateTime<Utc>) -> Result<Vec<QueuedJob>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let failed: Vec<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs
            SET state = 'failed', failed_reason = ?, finished_at = ?
            WHERE state = 'active' AND attempts_made >= max_attempts
            RETURNING {COLUMNS}
            "#
        ))
        .bind(INTERRUPTED_REASON)
        .bind(millis(now))
        .fetch_all(&mut *tx)
        .await
        .map_err(unavailable)?;

        let requeued: Vec<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs
            SET state = 'waiting', progress = 0, started_at = NULL
            WHERE state = 'active'
            RETURNING {COLUMNS}
            "#
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;

        failed
            .into_iter()
            .chain(requeued)
            .map(JobRow::try_into_job)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use nodeflow_workflow::{NodeSpec, NodeType, WorkflowJob};
    use tempfile::TempDir;

    async fn store() -> (SqliteJobStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
        let store = SqliteJobStore::connect(&url).await.unwrap();
        (store, dir)
    }

    fn queued(name: &str, enqueued_at: DateTime<Utc>) -> QueuedJob {
        let job = WorkflowJob::new(name, name, vec![NodeSpec::new("t", NodeType::Trigger)]);
        QueuedJob::new(job, 3, BackoffPolicy::exponential(1_000), enqueued_at)
    }

    /// Truncates to the millisecond precision the store keeps.
    fn stored_time(at: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap()
    }

    #[tokio::test]
    async fn insert_and_get() {
        let (store, _dir) = store().await;
        let job = queued("wf-1", Utc::now());
        store.insert(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.state, JobState::Waiting);
        assert_eq!(loaded.data, job.data);
        assert_eq!(loaded.enqueued_at, stored_time(job.enqueued_at));
        assert!(store.get(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let (store, _dir) = store().await;
        let job = queued("wf-1", Utc::now());
        store.insert(&job).await.unwrap();

        let now = Utc::now();
        let claimed = store.claim_next(now).await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.state, JobState::Active);
        assert_eq!(claimed.attempts_made, 1);
        assert_eq!(claimed.started_at, Some(stored_time(now)));
        assert!(store.claim_next(now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_a_job() {
        let (store, _dir) = store().await;
        for i in 0..5 {
            store.insert(&queued(&format!("wf-{i}"), Utc::now())).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.claim_next(Utc::now()).await.unwrap().map(|job| job.id)
            }));
        }
        let mut claimed = Vec::new();
        for handle in handles {
            if let Some(id) = handle.await.unwrap() {
                claimed.push(id);
            }
        }
        claimed.sort();
        claimed.dedup();
        assert_eq!(claimed.len(), 5);
    }

    #[tokio::test]
    async fn delayed_jobs_become_due() {
        let (store, _dir) = store().await;
        let now = Utc::now();
        let mut job = queued("wf-1", now);
        job.state = JobState::Delayed;
        job.run_at = Some(now + TimeDelta::seconds(5));
        store.insert(&job).await.unwrap();

        assert!(store.claim_next(now).await.unwrap().is_none());
        let claimed = store
            .claim_next(now + TimeDelta::seconds(6))
            .await
            .unwrap()
            .unwrap();
        assert!(claimed.run_at.is_none());
    }

    #[tokio::test]
    async fn replace_round_trips_result() {
        let (store, _dir) = store().await;
        let job = queued("wf-1", Utc::now());
        store.insert(&job).await.unwrap();
        let mut active = store.claim_next(Utc::now()).await.unwrap().unwrap();

        let result = nodeflow_workflow::WorkflowResult {
            workflow_id: "wf-1".to_string(),
            status: nodeflow_workflow::RunStatus::Failed,
            started_at: stored_time(Utc::now()),
            completed_at: stored_time(Utc::now()),
            duration_ms: 4,
            node_results: Vec::new(),
            final_output: Default::default(),
            error: Some("node t failed: boom".to_string()),
        };
        active.state = JobState::Failed;
        active.result = Some(result.clone());
        active.failed_reason = result.error.clone();
        active.finished_at = Some(Utc::now());

        assert!(!store.replace(&active, JobState::Waiting).await.unwrap());
        assert!(store.replace(&active, JobState::Active).await.unwrap());

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Failed);
        assert_eq!(loaded.result, Some(result));
        assert_eq!(loaded.failed_reason.as_deref(), Some("node t failed: boom"));
    }

    #[tokio::test]
    async fn progress_requires_active() {
        let (store, _dir) = store().await;
        let job = queued("wf-1", Utc::now());
        store.insert(&job).await.unwrap();

        assert!(!store.set_progress(job.id, 40).await.unwrap());
        store.claim_next(Utc::now()).await.unwrap();
        assert!(store.set_progress(job.id, 40).await.unwrap());
        assert_eq!(store.get(job.id).await.unwrap().unwrap().progress, 40);
    }

    #[tokio::test]
    async fn list_counts_and_clean() {
        let (store, _dir) = store().await;
        let now = Utc::now();
        for i in 0..3 {
            store
                .insert(&queued(&format!("wf-{i}"), now + TimeDelta::milliseconds(i * 10)))
                .await
                .unwrap();
        }
        let mut old = queued("old", now - TimeDelta::hours(30));
        old.state = JobState::Completed;
        old.finished_at = Some(now - TimeDelta::hours(25));
        store.insert(&old).await.unwrap();

        let page = store.list(JobState::Waiting, 0, 1).await.unwrap();
        let names: Vec<&str> = page.iter().map(|j| j.data.workflow_id.as_str()).collect();
        assert_eq!(names, vec!["wf-0", "wf-1"]);
        assert_eq!(store.list(JobState::Waiting, 2, 2).await.unwrap().len(), 1);
        assert_eq!(store.list(JobState::Waiting, 0, 20).await.unwrap().len(), 3);
        assert!(store.list(JobState::Waiting, 2, 1).await.unwrap().is_empty());

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.waiting, 3);
        assert_eq!(counts.completed, 1);

        let removed = store
            .delete_finished_before(now - TimeDelta::hours(24))
            .await
            .unwrap();
        assert_eq!(removed, vec![old.id]);
        assert_eq!(store.counts().await.unwrap().completed, 0);
    }

    #[tokio::test]
    async fn delete_and_recover() {
        let (store, _dir) = store().await;
        let a = queued("a", Utc::now());
        let b = queued("b", Utc::now() + TimeDelta::milliseconds(5));
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        assert!(store.delete(a.id).await.unwrap());
        assert!(!store.delete(a.id).await.unwrap());

        store.claim_next(Utc::now() + TimeDelta::seconds(1)).await.unwrap();
        let recovered = store.recover_active(Utc::now()).await.unwrap();
        assert_eq!(recovered.len(), 1);
        let requeued = store.get(b.id).await.unwrap().unwrap();
        assert_eq!(requeued.state, JobState::Waiting);
        assert_eq!(requeued.attempts_made, 1);
        assert!(requeued.started_at.is_none());
    }

    #[tokio::test]
    async fn recover_fails_jobs_out_of_attempts() {
        let (store, _dir) = store().await;
        let mut job = queued("crash-loop", Utc::now());
        job.max_attempts = 1;
        store.insert(&job).await.unwrap();
        store.claim_next(Utc::now()).await.unwrap();

        let recovered = store.recover_active(Utc::now()).await.unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].state, JobState::Failed);
        assert_eq!(recovered[0].failed_reason.as_deref(), Some(INTERRUPTED_REASON));
        assert!(recovered[0].finished_at.is_some());
        assert!(store.recover_active(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn jobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
        let job = queued("durable", Utc::now());
        {
            let store = SqliteJobStore::connect(&url).await.unwrap();
            store.insert(&job).await.unwrap();
        }

        let reopened = SqliteJobStore::connect(&url).await.unwrap();
        let loaded = reopened.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.data.workflow_id, "durable");
    }
}
