use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::compiler::{self, CompileInput};
use crate::db;
use crate::error::AssignError;
use crate::jobs;
use crate::materialize;
use crate::models::{DeferredJob, PeriodStatus, Preference, Question, StudentAnswer};
use crate::solver::Solver;

pub const DEFAULT_JOB_KIND: &str = "cp-sat";

#[derive(Debug, Clone, Default)]
pub struct AssignOptions {
    /// Target size per topic; when absent the roster is split evenly
    /// across topics (earlier topics take the remainder).
    pub group_sizes: Option<HashMap<Uuid, usize>>,
    pub ranking_percentage: Option<f64>,
    pub max_time_seconds: Option<u32>,
    /// Administrator override for the closed-status precondition. The
    /// questionnaire-completeness check is never overridable.
    pub force: bool,
}

/// Students with any preference or answer who have not answered every
/// required question. A non-empty return blocks job creation.
pub fn incomplete_students(
    preferences: &[Preference],
    answers: &[StudentAnswer],
    questions: &[Question],
    period_id: Uuid,
) -> Vec<Uuid> {
    let required: Vec<Uuid> = questions
        .iter()
        .filter(|q| q.required && q.period_id == period_id)
        .map(|q| q.id)
        .collect();
    if required.is_empty() {
        return Vec::new();
    }

    let answered: HashSet<(Uuid, Uuid)> = answers
        .iter()
        .filter(|a| a.period_id == period_id)
        .map(|a| (a.student_id, a.question_id))
        .collect();

    compiler::roster(preferences, answers, period_id)
        .into_iter()
        .filter(|student| {
            required
                .iter()
                .any(|question| !answered.contains(&(*student, *question)))
        })
        .collect()
}

pub fn check_preconditions(
    status: PeriodStatus,
    force: bool,
    incomplete: &[Uuid],
) -> Result<(), AssignError> {
    if status != PeriodStatus::Closed && !force {
        return Err(AssignError::PeriodNotClosed {
            status: status.to_string(),
        });
    }
    if !incomplete.is_empty() {
        return Err(AssignError::IncompleteQuestionnaires {
            students: incomplete.to_vec(),
        });
    }
    Ok(())
}

/// Even split used by the scheduled path, where no administrator is
/// around to supply sizes: earlier topics absorb the remainder.
pub fn even_group_sizes(num_students: usize, topic_ids: &[Uuid]) -> HashMap<Uuid, usize> {
    if topic_ids.is_empty() {
        return HashMap::new();
    }
    let base = num_students / topic_ids.len();
    let remainder = num_students % topic_ids.len();
    topic_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, base + usize::from(i < remainder)))
        .collect()
}

/// Build a preview of the compiled request without creating a job.
/// Compilation is pure over the snapshot, so this is safe to call as
/// often as the UI wants.
pub async fn compile_preview(
    pool: &PgPool,
    period_name: &str,
    options: &AssignOptions,
) -> anyhow::Result<crate::models::CompiledRequest> {
    let period = db::fetch_period(pool, period_name).await?;
    let topics = db::fetch_topics(pool, period.id).await?;
    let constraints_by_topic = db::fetch_constraints_by_topic(pool, period.id).await?;
    let questions = db::fetch_questions(pool, period.id).await?;
    let preferences = db::fetch_preferences(pool, period.id).await?;
    let answers = db::fetch_answers(pool, period.id).await?;
    let exclusions = db::fetch_exclusions(pool, period.id).await?;

    let roster = compiler::roster(&preferences, &answers, period.id);
    let topic_ids: Vec<Uuid> = topics.iter().map(|t| t.id).collect();
    let group_sizes = options
        .group_sizes
        .clone()
        .unwrap_or_else(|| even_group_sizes(roster.len(), &topic_ids));

    let compiled = compiler::compile(&CompileInput {
        period: &period,
        topics: &topics,
        constraints_by_topic: &constraints_by_topic,
        questions: &questions,
        preferences: &preferences,
        answers: &answers,
        group_sizes: &group_sizes,
        exclusions: &exclusions,
        ranking_percentage: options.ranking_percentage,
        max_time_seconds: options.max_time_seconds,
    })?;
    Ok(compiled)
}

/// The "assign now" path. Both this and the period-close scan converge
/// here. Policy for a concurrent pending job: supersede. The pending
/// job is moved to `abandoned` before the fresh one is created, so a
/// late callback for it is ignored rather than materialized.
pub async fn assign_now(
    pool: &PgPool,
    solver: &dyn Solver,
    period_name: &str,
    options: &AssignOptions,
) -> anyhow::Result<DeferredJob> {
    let period = db::fetch_period(pool, period_name).await?;
    let has_batch = db::current_batch_id(pool, period.id).await?.is_some();
    let status = period.status(has_batch, Utc::now());

    let questions = db::fetch_questions(pool, period.id).await?;
    let preferences = db::fetch_preferences(pool, period.id).await?;
    let answers = db::fetch_answers(pool, period.id).await?;

    let incomplete = incomplete_students(&preferences, &answers, &questions, period.id);
    // Re-running an already-assigned period is allowed; it produces a
    // fresh batch on completion.
    let gate_status = if status == PeriodStatus::Assigned {
        PeriodStatus::Closed
    } else {
        status
    };
    check_preconditions(gate_status, options.force, &incomplete)?;

    let compiled = compile_preview(pool, period_name, options).await?;

    if let Some(mut stale) = db::pending_job(pool, period.id).await? {
        if jobs::apply(&mut stale, jobs::Transition::Abandon, Utc::now()) {
            db::abandon_job(pool, stale.id).await?;
            tracing::info!(job_id = %stale.id, period = %period.name, "superseded pending job");
        }
    }

    let job = db::insert_job(pool, period.id, DEFAULT_JOB_KIND, &compiled).await?;
    tracing::info!(job_id = %job.id, period = %period.name, "created assignment job");

    if let Err(err) = solver.submit(job.id, &compiled.request).await {
        tracing::warn!(job_id = %job.id, error = %err, "solver submission failed");
        db::fail_job(pool, job.id, &format!("solver submission failed: {err}")).await?;
        return db::fetch_job(pool, job.id).await;
    }

    Ok(job)
}

/// Inbound completion callback. Delivery is at-least-once; only the
/// first terminal transition is applied, and a callback for a job that
/// is no longer the period's path-of-record (abandoned) never
/// materializes.
pub async fn on_solver_result(
    pool: &PgPool,
    job_id: Uuid,
    evaluation_id: &str,
    data: &serde_json::Value,
    data_hash: &str,
) -> anyhow::Result<Option<String>> {
    let mut job = db::fetch_job(pool, job_id).await?;
    let transition = jobs::Transition::Complete {
        evaluation_id: evaluation_id.to_string(),
        data: data.clone(),
        data_hash: data_hash.to_string(),
    };
    if !jobs::apply(&mut job, transition, Utc::now()) {
        tracing::info!(%job_id, status = %job.status, "ignoring callback for terminal job");
        return Ok(None);
    }

    // The guarded update is the arbiter under concurrent delivery.
    if !db::complete_job(pool, job_id, evaluation_id, data, data_hash).await? {
        tracing::info!(%job_id, "another handler settled this job first");
        return Ok(None);
    }

    let batch_id = materialize::materialize(pool, &job).await?;
    Ok(Some(batch_id))
}

pub async fn on_solver_failure(pool: &PgPool, job_id: Uuid, error: &str) -> anyhow::Result<bool> {
    let mut job = db::fetch_job(pool, job_id).await?;
    let transition = jobs::Transition::Fail {
        error: error.to_string(),
    };
    if !jobs::apply(&mut job, transition, Utc::now()) {
        tracing::info!(%job_id, status = %job.status, "ignoring failure callback for terminal job");
        return Ok(false);
    }

    let applied = db::fail_job(pool, job_id, error).await?;
    if applied {
        tracing::warn!(%job_id, error, "assignment job failed");
    } else {
        tracing::info!(%job_id, "another handler settled this job first");
    }
    Ok(applied)
}

/// Time-based trigger: fires once per period whose close date has
/// passed with no job and no batch. Rescheduling after a close-date
/// edit falls out of the scan reading the current value.
pub async fn tick(pool: &PgPool, solver: &dyn Solver) -> anyhow::Result<usize> {
    let due = db::periods_due_for_assignment(pool, Utc::now()).await?;
    let mut fired = 0usize;

    for period in due {
        let options = AssignOptions::default();
        match assign_now(pool, solver, &period.name, &options).await {
            Ok(job) => {
                tracing::info!(period = %period.name, job_id = %job.id, "period close fired");
                fired += 1;
            }
            Err(err) => {
                // Incomplete questionnaires or a compile error leave
                // the period for an administrator to resolve.
                tracing::warn!(period = %period.name, error = %err, "period close skipped");
            }
        }
    }

    Ok(fired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawAnswer;
    use chrono::Utc;

    fn question(period_id: Uuid, required: bool) -> Question {
        Question {
            id: Uuid::new_v4(),
            period_id,
            prompt: "Completed the prerequisite?".to_string(),
            constraint_name: None,
            max_scale: 0,
            required,
        }
    }

    fn answer(student_id: Uuid, period_id: Uuid, question_id: Uuid) -> StudentAnswer {
        StudentAnswer {
            student_id,
            period_id,
            question_id,
            raw_answer: RawAnswer::Bool(true),
            normalized_answer: 1.0,
        }
    }

    fn preference(student_id: Uuid, period_id: Uuid) -> Preference {
        Preference {
            student_id,
            period_id,
            topic_order: vec![Uuid::new_v4()],
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn students_missing_required_answers_are_reported() {
        let period_id = Uuid::new_v4();
        let q = question(period_id, true);
        let complete = Uuid::new_v4();
        let missing = Uuid::new_v4();

        let preferences = vec![preference(complete, period_id), preference(missing, period_id)];
        let answers = vec![answer(complete, period_id, q.id)];

        let incomplete = incomplete_students(&preferences, &answers, &[q], period_id);
        assert_eq!(incomplete, vec![missing]);
    }

    #[test]
    fn optional_questions_do_not_block() {
        let period_id = Uuid::new_v4();
        let q = question(period_id, false);
        let student = Uuid::new_v4();
        let preferences = vec![preference(student, period_id)];

        let incomplete = incomplete_students(&preferences, &[], &[q], period_id);
        assert!(incomplete.is_empty());
    }

    #[test]
    fn answer_only_students_are_part_of_the_roster_check() {
        let period_id = Uuid::new_v4();
        let q = question(period_id, true);
        let other_q = question(period_id, true);
        let student = Uuid::new_v4();
        // Answered one required question but not the other.
        let answers = vec![answer(student, period_id, q.id)];

        let incomplete =
            incomplete_students(&[], &answers, &[q, other_q], period_id);
        assert_eq!(incomplete, vec![student]);
    }

    #[test]
    fn open_period_is_refused_without_force() {
        let err = check_preconditions(PeriodStatus::Open, false, &[]).unwrap_err();
        assert!(matches!(err, AssignError::PeriodNotClosed { .. }));
        assert!(check_preconditions(PeriodStatus::Open, true, &[]).is_ok());
        assert!(check_preconditions(PeriodStatus::Closed, false, &[]).is_ok());
    }

    #[test]
    fn incomplete_questionnaires_refuse_even_with_force() {
        let students = vec![Uuid::new_v4()];
        let err = check_preconditions(PeriodStatus::Closed, true, &students).unwrap_err();
        match err {
            AssignError::IncompleteQuestionnaires { students: reported } => {
                assert_eq!(reported, students);
            }
            other => panic!("expected IncompleteQuestionnaires, got {other:?}"),
        }
    }

    #[test]
    fn even_split_spreads_the_remainder_forward() {
        let topics: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let sizes = even_group_sizes(7, &topics);
        assert_eq!(sizes[&topics[0]], 3);
        assert_eq!(sizes[&topics[1]], 2);
        assert_eq!(sizes[&topics[2]], 2);
        assert_eq!(sizes.values().sum::<usize>(), 7);

        assert!(even_group_sizes(5, &[]).is_empty());
    }
}
