use std::collections::{BTreeMap, BTreeSet, HashMap};

use uuid::Uuid;

use crate::error::AssignError;
use crate::models::{
    CompiledRequest, ConstraintDef, Period, Preference, Question, SolverRequest, StudentAnswer,
    Topic, WireCriterion, WireGroup,
};

pub const MIN_SOLVER_SECONDS: u32 = 15;
pub const MAX_SOLVER_SECONDS: u32 = 540;

/// Everything `compile` reads. All slices are snapshots for one
/// period; compilation never touches stored state, so it is safe to
/// call repeatedly for preview or estimation.
pub struct CompileInput<'a> {
    pub period: &'a Period,
    /// Wire group order follows this slice.
    pub topics: &'a [Topic],
    pub constraints_by_topic: &'a HashMap<Uuid, Vec<ConstraintDef>>,
    pub questions: &'a [Question],
    pub preferences: &'a [Preference],
    pub answers: &'a [StudentAnswer],
    /// Target size per topic, supplied per-run.
    pub group_sizes: &'a HashMap<Uuid, usize>,
    /// Explicit must-not-share pairs.
    pub exclusions: &'a [(Uuid, Uuid)],
    pub ranking_percentage: Option<f64>,
    pub max_time_seconds: Option<u32>,
}

/// Compile a period snapshot into a solver request. Fails with a
/// domain error before any job could be created when group sizes do
/// not cover the roster.
pub fn compile(input: &CompileInput<'_>) -> Result<CompiledRequest, AssignError> {
    let students = roster(input.preferences, input.answers, input.period.id);
    if students.is_empty() {
        return Err(AssignError::EmptyRoster);
    }

    let mut sizes = Vec::with_capacity(input.topics.len());
    for topic in input.topics {
        let size = input
            .group_sizes
            .get(&topic.id)
            .copied()
            .ok_or_else(|| AssignError::MissingGroupSize {
                topic: topic.title.clone(),
            })?;
        sizes.push(size);
    }

    let total: usize = sizes.iter().sum();
    if total != students.len() {
        return Err(AssignError::GroupSizeMismatch {
            expected: students.len(),
            actual: total,
        });
    }

    let index_of: HashMap<Uuid, usize> = students
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    // Rank reporting at materialization time reads this snapshot, not
    // live preferences, so edits while the job is in flight cannot
    // shift the stored ranks.
    let topic_orders: Vec<Vec<Uuid>> = students
        .iter()
        .map(|id| {
            input
                .preferences
                .iter()
                .find(|p| p.student_id == *id && p.period_id == input.period.id)
                .map(|p| p.topic_order.clone())
                .unwrap_or_default()
        })
        .collect();

    let groups = input
        .topics
        .iter()
        .zip(sizes)
        .enumerate()
        .map(|(id, (topic, size))| WireGroup {
            id,
            size,
            criteria: resolve_criteria(
                input
                    .constraints_by_topic
                    .get(&topic.id)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]),
                input.questions,
            ),
        })
        .collect();

    let mut exclude = Vec::new();
    for (a, b) in input.exclusions {
        if let (Some(&ia), Some(&ib)) = (index_of.get(a), index_of.get(b)) {
            if ia != ib {
                exclude.push([ia, ib]);
            }
        }
        // Pairs naming students outside the roster have no seat to
        // exclude and are dropped.
    }

    // 0 tells the solver to ignore rankings outright, so when no topic
    // participates in preference weighting the field is omitted, not
    // defaulted.
    let ranking_active = input.topics.iter().any(|t| t.enabled_for_ranking);
    let ranking_percentage = if ranking_active {
        input.ranking_percentage
    } else {
        None
    };

    let request = SolverRequest {
        num_students: students.len(),
        num_groups: input.topics.len(),
        groups,
        exclude,
        ranking_percentage,
        max_time_in_seconds: input
            .max_time_seconds
            .map(|s| s.clamp(MIN_SOLVER_SECONDS, MAX_SOLVER_SECONDS)),
    };

    Ok(CompiledRequest {
        period_id: input.period.id,
        students,
        topics: input.topics.iter().map(|t| t.id).collect(),
        topic_orders,
        request,
    })
}

/// Roster = every student with at least one preference or answer for
/// the period, in sorted order so wire indices are deterministic.
pub fn roster(preferences: &[Preference], answers: &[StudentAnswer], period_id: Uuid) -> Vec<Uuid> {
    let mut ids: BTreeSet<Uuid> = BTreeSet::new();
    for pref in preferences.iter().filter(|p| p.period_id == period_id) {
        ids.insert(pref.student_id);
    }
    for answer in answers.iter().filter(|a| a.period_id == period_id) {
        ids.insert(answer.student_id);
    }
    ids.into_iter().collect()
}

/// Join constraint definitions to the questionnaire: a criterion
/// reaches the wire only when a question links to it by name, since
/// the trait is otherwise unobservable in the student population.
/// Constraints with no criterion type are inert category labels and
/// never compile.
fn resolve_criteria(
    constraints: &[ConstraintDef],
    questions: &[Question],
) -> BTreeMap<String, Vec<WireCriterion>> {
    let linked: BTreeSet<&str> = questions
        .iter()
        .filter_map(|q| q.constraint_name.as_deref())
        .collect();

    let mut criteria: BTreeMap<String, Vec<WireCriterion>> = BTreeMap::new();
    for def in constraints {
        let Some(kind) = def.criterion_type else {
            continue;
        };
        if !linked.contains(def.name.as_str()) {
            tracing::warn!(
                constraint = %def.name,
                "constraint has no linked question, skipping"
            );
            continue;
        }
        criteria.entry(def.name.clone()).or_default().push(WireCriterion {
            kind,
            min_ratio: def.min_ratio,
            min_students: def.min_students,
            max_students: def.max_students,
        });
    }
    criteria
}
