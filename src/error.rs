use thiserror::Error;
use uuid::Uuid;

/// Domain errors for the assignment orchestration core. Compilation
/// and precondition failures surface synchronously to the caller; job
/// and materialization failures are recorded as state on the job.
#[derive(Error, Debug)]
pub enum AssignError {
    #[error("ratio must be within [0, 100], got {value}")]
    InvalidRatio { value: f64 },

    #[error("{field} must be a non-negative integer, got {value}")]
    NegativeBound { field: &'static str, value: i32 },

    #[error("group sizes sum to {actual} but the period has {expected} students with data")]
    GroupSizeMismatch { expected: usize, actual: usize },

    #[error("topic '{topic}' has no group size entry for this run")]
    MissingGroupSize { topic: String },

    #[error("no student has submitted a preference or answer for this period")]
    EmptyRoster,

    #[error("{} student(s) have incomplete questionnaires: {}", students.len(), fmt_ids(students))]
    IncompleteQuestionnaires { students: Vec<Uuid> },

    #[error("period is {status}, expected closed (use the override to force)")]
    PeriodNotClosed { status: String },

    #[error("a pending assignment job already exists for period {period_id}")]
    JobAlreadyPending { period_id: Uuid },

    #[error("invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("solver result is malformed: {0}")]
    MalformedResult(String),

    #[error("solver result references student index {index} outside the compiled roster")]
    UnknownStudentIndex { index: usize },

    #[error("student {student} appears more than once in the solver result")]
    DuplicateStudent { student: Uuid },

    #[error("{} compiled student(s) are missing from the solver result: {}", students.len(), fmt_ids(students))]
    MissingStudents { students: Vec<Uuid> },
}

fn fmt_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
