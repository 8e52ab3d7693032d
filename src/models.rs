use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct Period {
    pub id: Uuid,
    pub name: String,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodStatus {
    Upcoming,
    Open,
    Closed,
    Assigned,
}

impl PeriodStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodStatus::Upcoming => "upcoming",
            PeriodStatus::Open => "open",
            PeriodStatus::Closed => "closed",
            PeriodStatus::Assigned => "assigned",
        }
    }
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Period {
    /// Status is derived, never stored: a period with a materialized
    /// batch is `assigned` regardless of its window.
    pub fn status(&self, has_batch: bool, now: DateTime<Utc>) -> PeriodStatus {
        if has_batch {
            PeriodStatus::Assigned
        } else if now < self.opens_at {
            PeriodStatus::Upcoming
        } else if now < self.closes_at {
            PeriodStatus::Open
        } else {
            PeriodStatus::Closed
        }
    }
}

#[derive(Debug, Clone)]
pub struct Topic {
    pub id: Uuid,
    pub period_id: Uuid,
    pub title: String,
    pub enabled_for_ranking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionType {
    Prerequisite,
    Minimize,
    Pull,
    Push,
    Maximize,
}

impl CriterionType {
    pub fn as_str(self) -> &'static str {
        match self {
            CriterionType::Prerequisite => "prerequisite",
            CriterionType::Minimize => "minimize",
            CriterionType::Pull => "pull",
            CriterionType::Push => "push",
            CriterionType::Maximize => "maximize",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "prerequisite" => Some(CriterionType::Prerequisite),
            "minimize" => Some(CriterionType::Minimize),
            "pull" => Some(CriterionType::Pull),
            "push" => Some(CriterionType::Push),
            "maximize" => Some(CriterionType::Maximize),
            _ => None,
        }
    }
}

/// A balancing/eligibility rule attached to topics by reference.
/// `criterion_type: None` marks an inert category label; the compiler
/// must never see one.
#[derive(Debug, Clone)]
pub struct ConstraintDef {
    pub id: Uuid,
    pub name: String,
    pub criterion_type: Option<CriterionType>,
    pub min_ratio: Option<f64>,
    pub min_students: Option<i32>,
    pub max_students: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct Question {
    pub id: Uuid,
    pub period_id: Uuid,
    pub prompt: String,
    pub constraint_name: Option<String>,
    /// 0 means a boolean question, otherwise the top of the 0..N scale.
    pub max_scale: i32,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct Preference {
    pub student_id: Uuid,
    pub period_id: Uuid,
    /// Rank = 1-indexed position. No duplicate topics.
    pub topic_order: Vec<Uuid>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawAnswer {
    Bool(bool),
    Scale(i32),
}

#[derive(Debug, Clone)]
pub struct StudentAnswer {
    pub student_id: Uuid,
    pub period_id: Uuid,
    pub question_id: Uuid,
    pub raw_answer: RawAnswer,
    pub normalized_answer: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
    Abandoned,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "abandoned" => Some(JobStatus::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct DeferredJob {
    pub id: Uuid,
    pub period_id: Uuid,
    pub kind: String,
    pub request: serde_json::Value,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub evaluation_id: Option<String>,
    pub result_data: Option<serde_json::Value>,
    pub result_hash: Option<String>,
    pub error: Option<String>,
    /// Stamped when this job's result is materialized. A completed job
    /// without one never had its result applied, even when an earlier
    /// batch is still current for the period.
    pub batch_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub period_id: Uuid,
    pub batch_id: String,
    pub student_id: Uuid,
    pub topic_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub original_rank: Option<i32>,
}

// ---- solver wire contract ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireCriterion {
    #[serde(rename = "type")]
    pub kind: CriterionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_students: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_students: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireGroup {
    pub id: usize,
    pub size: usize,
    pub criteria: BTreeMap<String, Vec<WireCriterion>>,
}

/// The request document handed to the external optimizer. Optional
/// fields are omitted from the JSON entirely; 0 and "absent" mean
/// different things to the solver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverRequest {
    pub num_students: usize,
    pub num_groups: usize,
    pub groups: Vec<WireGroup>,
    pub exclude: Vec<[usize; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time_in_seconds: Option<u32>,
}

/// Solver result payload: one member-index list per wire group, in
/// group order. Opaque to the core beyond this mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverResult {
    pub groups: Vec<Vec<usize>>,
}

/// Snapshot stored on the job: the wire request plus the index order
/// it was built from, so a completion can be mapped back to students
/// and topics even after later edits to preferences or constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompiledRequest {
    pub period_id: Uuid,
    /// Roster in wire index order; position i is student index i.
    pub students: Vec<Uuid>,
    /// Topic ids in wire group order.
    pub topics: Vec<Uuid>,
    /// Each student's ranked topic order as of compilation, index-
    /// aligned with `students`; empty when the student submitted no
    /// ranking. Rank reporting reads this snapshot, so a preference
    /// edit while the job is in flight never shifts the stored ranks.
    pub topic_orders: Vec<Vec<Uuid>>,
    pub request: SolverRequest,
}
