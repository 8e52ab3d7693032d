use chrono::{DateTime, Utc};

use crate::models::{DeferredJob, JobStatus};

/// A terminal transition requested by a solver callback or by the
/// trigger superseding a pending job.
#[derive(Debug, Clone)]
pub enum Transition {
    Complete {
        evaluation_id: String,
        data: serde_json::Value,
        data_hash: String,
    },
    Fail {
        error: String,
    },
    Abandon,
}

/// Apply a terminal transition to an in-memory job. Returns false when
/// the job is already terminal: callbacks are delivered at least once,
/// and only the first terminal transition may win. The database write
/// path mirrors this with a guarded `UPDATE ... WHERE status =
/// 'pending'` so concurrent handlers agree with this decision.
pub fn apply(job: &mut DeferredJob, transition: Transition, now: DateTime<Utc>) -> bool {
    if job.status.is_terminal() {
        return false;
    }

    match transition {
        Transition::Complete {
            evaluation_id,
            data,
            data_hash,
        } => {
            job.status = JobStatus::Completed;
            job.evaluation_id = Some(evaluation_id);
            job.result_data = Some(data);
            job.result_hash = Some(data_hash);
        }
        Transition::Fail { error } => {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        }
        Transition::Abandon => {
            job.status = JobStatus::Abandoned;
        }
    }
    job.updated_at = now;
    true
}

/// Read model for polling consumers at the UI boundary.
#[derive(Debug, Clone)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Seconds since creation; the core enforces no wall-clock timeout
    /// on pending jobs, so callers use this to flag stale ones.
    pub age_seconds: i64,
    /// A completed job that was never stamped with a batch is an
    /// operator-visible inconsistency: the optimizer succeeded but the
    /// result was never applied. Keyed to the job's own stamp, not the
    /// period's current batch, so a re-run whose materialization fails
    /// is flagged even while an earlier batch is still current.
    pub awaiting_batch: bool,
}

pub fn status_view(job: &DeferredJob, now: DateTime<Utc>) -> JobStatusView {
    JobStatusView {
        status: job.status,
        error: job.error.clone(),
        updated_at: job.updated_at,
        age_seconds: (now - job.created_at).num_seconds(),
        awaiting_batch: job.status == JobStatus::Completed && job.batch_id.is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn pending_job() -> DeferredJob {
        let now = Utc::now();
        DeferredJob {
            id: Uuid::new_v4(),
            period_id: Uuid::new_v4(),
            kind: "cp-sat".to_string(),
            request: serde_json::json!({}),
            status: JobStatus::Pending,
            created_at: now - Duration::minutes(5),
            updated_at: now - Duration::minutes(5),
            evaluation_id: None,
            result_data: None,
            result_hash: None,
            error: None,
            batch_id: None,
        }
    }

    #[test]
    fn completion_is_idempotent() {
        let mut job = pending_job();
        let first = Utc::now();

        let applied = apply(
            &mut job,
            Transition::Complete {
                evaluation_id: "eval-1".to_string(),
                data: serde_json::json!({"groups": [[0, 1], [2]]}),
                data_hash: "hash-1".to_string(),
            },
            first,
        );
        assert!(applied);
        assert_eq!(job.status, JobStatus::Completed);

        // A retried delivery, even with a different payload, changes
        // nothing.
        let applied = apply(
            &mut job,
            Transition::Complete {
                evaluation_id: "eval-2".to_string(),
                data: serde_json::json!({"groups": [[2], [0, 1]]}),
                data_hash: "hash-2".to_string(),
            },
            first + Duration::seconds(30),
        );
        assert!(!applied);
        assert_eq!(job.evaluation_id.as_deref(), Some("eval-1"));
        assert_eq!(job.result_hash.as_deref(), Some("hash-1"));
        assert_eq!(job.updated_at, first);
    }

    #[test]
    fn double_fail_keeps_the_first_error() {
        let mut job = pending_job();
        let first = Utc::now();

        assert!(apply(
            &mut job,
            Transition::Fail {
                error: "solver timeout".to_string()
            },
            first,
        ));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("solver timeout"));

        assert!(!apply(
            &mut job,
            Transition::Fail {
                error: "solver unreachable".to_string()
            },
            first + Duration::seconds(10),
        ));
        assert_eq!(job.error.as_deref(), Some("solver timeout"));
        assert_eq!(job.updated_at, first);
    }

    #[test]
    fn completion_after_failure_is_ignored() {
        let mut job = pending_job();
        let now = Utc::now();
        assert!(apply(
            &mut job,
            Transition::Fail {
                error: "solver unreachable".to_string()
            },
            now,
        ));

        assert!(!apply(
            &mut job,
            Transition::Complete {
                evaluation_id: "late".to_string(),
                data: serde_json::json!({"groups": []}),
                data_hash: "late-hash".to_string(),
            },
            now + Duration::minutes(1),
        ));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.result_data, None);
    }

    #[test]
    fn late_callback_for_abandoned_job_is_ignored() {
        let mut job = pending_job();
        let now = Utc::now();
        assert!(apply(&mut job, Transition::Abandon, now));
        assert_eq!(job.status, JobStatus::Abandoned);

        assert!(!apply(
            &mut job,
            Transition::Complete {
                evaluation_id: "stale".to_string(),
                data: serde_json::json!({"groups": [[0]]}),
                data_hash: "stale-hash".to_string(),
            },
            now + Duration::minutes(2),
        ));
        assert_eq!(job.result_data, None);
        assert_eq!(job.result_hash, None);
    }

    #[test]
    fn status_view_exposes_age_and_missing_batch() {
        let mut job = pending_job();
        let now = Utc::now();
        let view = status_view(&job, now);
        assert_eq!(view.status, JobStatus::Pending);
        assert!(view.age_seconds >= 299);
        assert!(!view.awaiting_batch);

        apply(
            &mut job,
            Transition::Complete {
                evaluation_id: "eval".to_string(),
                data: serde_json::json!({"groups": []}),
                data_hash: "h".to_string(),
            },
            now,
        );
        assert!(status_view(&job, now).awaiting_batch);

        job.batch_id = Some("batch-1".to_string());
        assert!(!status_view(&job, now).awaiting_batch);
    }

    #[test]
    fn rerun_without_its_own_batch_is_still_flagged() {
        // The period already has a current batch from an earlier run.
        // A re-run job that completes but is never stamped with a new
        // batch must still surface as awaiting-batch; the older batch
        // does not vouch for this job's result.
        let mut job = pending_job();
        let now = Utc::now();
        apply(
            &mut job,
            Transition::Complete {
                evaluation_id: "eval-rerun".to_string(),
                data: serde_json::json!({"groups": [[0]]}),
                data_hash: "h2".to_string(),
            },
            now,
        );
        assert_eq!(job.batch_id, None);
        assert!(status_view(&job, now).awaiting_batch);
    }
}
