use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::error::AssignError;
use crate::models::{Assignment, CompiledRequest, DeferredJob, JobStatus, SolverResult};

/// Batch ids are period-scoped and time-ordered; "the current batch"
/// is simply the latest one materialized for the period.
pub fn new_batch_id(period_id: Uuid, now: DateTime<Utc>) -> String {
    format!("{}-{}", period_id, now.timestamp_millis())
}

/// Map a solver result back onto the compiled roster. Every student in
/// the compiled request must appear exactly once; anything else is a
/// materialization error, never a silent drop.
pub fn build_batch(
    compiled: &CompiledRequest,
    result: &SolverResult,
    batch_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Assignment>, AssignError> {
    if result.groups.len() != compiled.topics.len() {
        return Err(AssignError::MalformedResult(format!(
            "result has {} groups, request had {}",
            result.groups.len(),
            compiled.topics.len()
        )));
    }

    let mut seen = vec![false; compiled.students.len()];
    let mut assignments = Vec::with_capacity(compiled.students.len());

    for (group_idx, members) in result.groups.iter().enumerate() {
        let topic_id = compiled.topics[group_idx];
        for &student_idx in members {
            let student_id = *compiled
                .students
                .get(student_idx)
                .ok_or(AssignError::UnknownStudentIndex { index: student_idx })?;
            if seen[student_idx] {
                return Err(AssignError::DuplicateStudent {
                    student: student_id,
                });
            }
            seen[student_idx] = true;

            // Rank against the compile-time snapshot, never against
            // live preferences that may have changed in flight.
            let original_rank = compiled
                .topic_orders
                .get(student_idx)
                .and_then(|order| order.iter().position(|t| *t == topic_id))
                .map(|pos| pos as i32 + 1);

            assignments.push(Assignment {
                period_id: compiled.period_id,
                batch_id: batch_id.to_string(),
                student_id,
                topic_id,
                assigned_at: now,
                original_rank,
            });
        }
    }

    let missing: Vec<Uuid> = seen
        .iter()
        .enumerate()
        .filter(|(_, present)| !**present)
        .map(|(idx, _)| compiled.students[idx])
        .collect();
    if !missing.is_empty() {
        return Err(AssignError::MissingStudents { students: missing });
    }

    Ok(assignments)
}

/// Turn a completed job's result into the period's new current batch.
/// The batch rows and the job's batch stamp are written in one
/// transaction, so concurrent readers see either the previous batch or
/// the full new one. A failure here leaves the job `completed` with no
/// stamp, which the status view reports as awaiting-batch.
pub async fn materialize(pool: &PgPool, job: &DeferredJob) -> anyhow::Result<String> {
    if job.status != JobStatus::Completed {
        return Err(AssignError::InvalidStateTransition {
            from: job.status.to_string(),
            to: "materialized".to_string(),
        }
        .into());
    }

    let compiled: CompiledRequest = serde_json::from_value(job.request.clone())?;
    let data = job
        .result_data
        .clone()
        .ok_or_else(|| AssignError::MalformedResult("completed job has no result data".into()))?;
    let result: SolverResult = serde_json::from_value(data)
        .map_err(|e| AssignError::MalformedResult(e.to_string()))?;

    let now = Utc::now();
    let batch_id = new_batch_id(compiled.period_id, now);
    let assignments = build_batch(&compiled, &result, &batch_id, now)?;

    db::insert_assignment_batch(pool, job.id, &assignments).await?;
    tracing::info!(
        period_id = %compiled.period_id,
        batch_id = %batch_id,
        students = assignments.len(),
        "materialized assignment batch"
    );
    Ok(batch_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SolverRequest, WireGroup};
    use std::collections::BTreeMap;

    fn compiled(num_students: usize, num_topics: usize) -> CompiledRequest {
        let students: Vec<Uuid> = (0..num_students).map(|_| Uuid::new_v4()).collect();
        let topics: Vec<Uuid> = (0..num_topics).map(|_| Uuid::new_v4()).collect();
        let per_group = num_students / num_topics;
        CompiledRequest {
            period_id: Uuid::new_v4(),
            students: students.clone(),
            topics,
            topic_orders: vec![Vec::new(); num_students],
            request: SolverRequest {
                num_students,
                num_groups: num_topics,
                groups: (0..num_topics)
                    .map(|id| WireGroup {
                        id,
                        size: per_group,
                        criteria: BTreeMap::new(),
                    })
                    .collect(),
                exclude: Vec::new(),
                ranking_percentage: None,
                max_time_in_seconds: None,
            },
        }
    }

    fn rank_everything(compiled: &mut CompiledRequest) {
        compiled.topic_orders = vec![compiled.topics.clone(); compiled.students.len()];
    }

    #[test]
    fn full_coverage_with_ranks() {
        let mut compiled = compiled(6, 2);
        rank_everything(&mut compiled);
        let result = SolverResult {
            groups: vec![vec![0, 2, 4], vec![1, 3, 5]],
        };

        let batch = build_batch(&compiled, &result, "batch-1", Utc::now()).unwrap();
        assert_eq!(batch.len(), 6);

        let mut seen: Vec<Uuid> = batch.iter().map(|a| a.student_id).collect();
        seen.sort();
        let mut expected = compiled.students.clone();
        expected.sort();
        assert_eq!(seen, expected);

        // Every student ranked both topics, so every row has a rank of
        // 1 or 2 matching the topic's position in their order.
        for assignment in &batch {
            let rank = assignment.original_rank.unwrap();
            assert!(rank == 1 || rank == 2);
            let expected_rank = if assignment.topic_id == compiled.topics[0] {
                1
            } else {
                2
            };
            assert_eq!(rank, expected_rank);
        }
    }

    #[test]
    fn off_ballot_placement_has_no_rank() {
        let mut compiled = compiled(2, 2);
        // Only the first student ranked anything, and only topic 1.
        compiled.topic_orders[0] = vec![compiled.topics[1]];
        let result = SolverResult {
            groups: vec![vec![0], vec![1]],
        };

        let batch = build_batch(&compiled, &result, "batch-1", Utc::now()).unwrap();
        let by_student = |id: Uuid| batch.iter().find(|a| a.student_id == id).unwrap();

        // Student 0 landed on topic 0, which they did not rank.
        assert_eq!(by_student(compiled.students[0]).original_rank, None);
        assert_eq!(by_student(compiled.students[1]).original_rank, None);
    }

    #[test]
    fn missing_student_is_an_error_not_a_drop() {
        let compiled = compiled(4, 2);
        let result = SolverResult {
            groups: vec![vec![0, 1], vec![2]],
        };

        match build_batch(&compiled, &result, "batch-1", Utc::now()) {
            Err(AssignError::MissingStudents { students }) => {
                assert_eq!(students, vec![compiled.students[3]]);
            }
            other => panic!("expected MissingStudents, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_student_is_rejected() {
        let compiled = compiled(4, 2);
        let result = SolverResult {
            groups: vec![vec![0, 1], vec![1, 2]],
        };

        match build_batch(&compiled, &result, "batch-1", Utc::now()) {
            Err(AssignError::DuplicateStudent { student }) => {
                assert_eq!(student, compiled.students[1]);
            }
            other => panic!("expected DuplicateStudent, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let compiled = compiled(2, 2);
        let result = SolverResult {
            groups: vec![vec![0], vec![7]],
        };
        assert!(matches!(
            build_batch(&compiled, &result, "batch-1", Utc::now()),
            Err(AssignError::UnknownStudentIndex { index: 7 })
        ));
    }

    #[test]
    fn group_count_mismatch_is_malformed() {
        let compiled = compiled(2, 2);
        let result = SolverResult {
            groups: vec![vec![0, 1]],
        };
        assert!(matches!(
            build_batch(&compiled, &result, "batch-1", Utc::now()),
            Err(AssignError::MalformedResult(_))
        ));
    }

    #[test]
    fn six_students_two_topics_end_to_end() {
        use crate::compiler::{self, CompileInput};
        use crate::models::{Period, Preference, Topic};
        use crate::solver::GreedySolver;
        use std::collections::HashMap;

        let period = Period {
            id: Uuid::new_v4(),
            name: "spring-2026".to_string(),
            opens_at: Utc::now() - chrono::Duration::days(14),
            closes_at: Utc::now() - chrono::Duration::days(1),
        };
        let topics: Vec<Topic> = ["Robotics Lab", "Data Commons"]
            .iter()
            .map(|title| Topic {
                id: Uuid::new_v4(),
                period_id: period.id,
                title: title.to_string(),
                enabled_for_ranking: true,
            })
            .collect();
        let preferences: Vec<Preference> = (0..6)
            .map(|_| Preference {
                student_id: Uuid::new_v4(),
                period_id: period.id,
                topic_order: vec![topics[0].id, topics[1].id],
                last_updated: Utc::now(),
            })
            .collect();
        let sizes: HashMap<Uuid, usize> = topics.iter().map(|t| (t.id, 3)).collect();

        let compiled = compiler::compile(&CompileInput {
            period: &period,
            topics: &topics,
            constraints_by_topic: &HashMap::new(),
            questions: &[],
            preferences: &preferences,
            answers: &[],
            group_sizes: &sizes,
            exclusions: &[],
            ranking_percentage: Some(70.0),
            max_time_seconds: Some(60),
        })
        .unwrap();

        let result = GreedySolver::solve(&compiled.request).unwrap();
        let batch_id = new_batch_id(period.id, Utc::now());
        let batch = build_batch(&compiled, &result, &batch_id, Utc::now()).unwrap();

        assert_eq!(batch.len(), 6);
        for assignment in &batch {
            let rank = assignment.original_rank.expect("every student ranked both topics");
            assert!(rank == 1 || rank == 2);
        }
    }

    #[test]
    fn ranks_come_from_the_compile_time_snapshot() {
        let mut compiled = compiled(2, 2);
        rank_everything(&mut compiled);
        let result = SolverResult {
            groups: vec![vec![0], vec![1]],
        };
        let before = build_batch(&compiled, &result, "batch-1", Utc::now()).unwrap();

        // A student flips their ranking while the job is in flight.
        // The stored request is the snapshot of record, so the batch
        // built from it reports the same ranks as before the edit.
        let live_edit: Vec<Uuid> = compiled.topic_orders[0].iter().rev().copied().collect();
        assert_ne!(live_edit, compiled.topic_orders[0]);
        let after = build_batch(&compiled, &result, "batch-2", Utc::now()).unwrap();

        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.student_id, b.student_id);
            assert_eq!(a.original_rank, b.original_rank);
        }
        assert_eq!(before[0].original_rank, Some(1));
        assert_eq!(before[1].original_rank, Some(2));
    }

    #[test]
    fn batch_ids_are_period_scoped_and_time_ordered() {
        let period_id = Uuid::new_v4();
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(5);
        let first = new_batch_id(period_id, earlier);
        let second = new_batch_id(period_id, later);
        assert_ne!(first, second);
        assert!(first.starts_with(&period_id.to_string()));
    }
}
