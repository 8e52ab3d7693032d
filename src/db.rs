use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::constraints;
use crate::error::AssignError;
use crate::models::{
    Assignment, CompiledRequest, ConstraintDef, CriterionType, DeferredJob, JobStatus, Period,
    Preference, Question, RawAnswer, Student, StudentAnswer, Topic,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---- periods / topics ----

fn period_from_row(row: &PgRow) -> Period {
    Period {
        id: row.get("id"),
        name: row.get("name"),
        opens_at: row.get("opens_at"),
        closes_at: row.get("closes_at"),
    }
}

pub async fn fetch_period(pool: &PgPool, name: &str) -> anyhow::Result<Period> {
    let row = sqlx::query(
        "SELECT id, name, opens_at, closes_at FROM topic_assignment.periods WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no period named '{name}'"))?;
    Ok(period_from_row(&row))
}

/// Periods whose window has closed but which have never seen a job or
/// a batch: the time-based trigger path fires once per period.
pub async fn periods_due_for_assignment(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<Period>> {
    let rows = sqlx::query(
        r#"
        SELECT p.id, p.name, p.opens_at, p.closes_at
        FROM topic_assignment.periods p
        WHERE p.closes_at <= $1
          AND NOT EXISTS (
              SELECT 1 FROM topic_assignment.deferred_jobs j WHERE j.period_id = p.id
          )
          AND NOT EXISTS (
              SELECT 1 FROM topic_assignment.assignments a WHERE a.period_id = p.id
          )
        ORDER BY p.closes_at
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(period_from_row).collect())
}

pub async fn fetch_topics(pool: &PgPool, period_id: Uuid) -> anyhow::Result<Vec<Topic>> {
    let rows = sqlx::query(
        "SELECT id, period_id, title, enabled_for_ranking \
         FROM topic_assignment.topics WHERE period_id = $1 ORDER BY title",
    )
    .bind(period_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Topic {
            id: row.get("id"),
            period_id: row.get("period_id"),
            title: row.get("title"),
            enabled_for_ranking: row.get("enabled_for_ranking"),
        })
        .collect())
}

// ---- constraints ----

fn constraint_from_row(row: &PgRow) -> ConstraintDef {
    let criterion: Option<String> = row.get("criterion_type");
    ConstraintDef {
        id: row.get("id"),
        name: row.get("name"),
        criterion_type: criterion.as_deref().and_then(CriterionType::parse),
        min_ratio: row.get("min_ratio"),
        min_students: row.get("min_students"),
        max_students: row.get("max_students"),
    }
}

pub async fn fetch_constraints_by_topic(
    pool: &PgPool,
    period_id: Uuid,
) -> anyhow::Result<HashMap<Uuid, Vec<ConstraintDef>>> {
    let rows = sqlx::query(
        r#"
        SELECT tc.topic_id, c.id, c.name, c.criterion_type,
               c.min_ratio, c.min_students, c.max_students
        FROM topic_assignment.topic_constraints tc
        JOIN topic_assignment.constraints c ON c.id = tc.constraint_id
        JOIN topic_assignment.topics t ON t.id = tc.topic_id
        WHERE t.period_id = $1
        "#,
    )
    .bind(period_id)
    .fetch_all(pool)
    .await?;

    let mut by_topic: HashMap<Uuid, Vec<ConstraintDef>> = HashMap::new();
    for row in &rows {
        by_topic
            .entry(row.get("topic_id"))
            .or_default()
            .push(constraint_from_row(row));
    }
    Ok(by_topic)
}

/// Create or update a constraint. Validation and the percentage-to-
/// ratio conversion happen here, on the single shared write path.
pub async fn upsert_constraint(pool: &PgPool, mut def: ConstraintDef) -> anyhow::Result<Uuid> {
    constraints::normalize_for_write(&mut def)?;

    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO topic_assignment.constraints
        (id, name, criterion_type, min_ratio, min_students, max_students)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (name) DO UPDATE
        SET criterion_type = EXCLUDED.criterion_type,
            min_ratio = EXCLUDED.min_ratio,
            min_students = EXCLUDED.min_students,
            max_students = EXCLUDED.max_students
        RETURNING id
        "#,
    )
    .bind(def.id)
    .bind(&def.name)
    .bind(def.criterion_type.map(CriterionType::as_str))
    .bind(def.min_ratio)
    .bind(def.min_students)
    .bind(def.max_students)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

/// Deleting a constraint unlinks any questions that reference it by
/// name; deletion is never blocked by references.
pub async fn delete_constraint(pool: &PgPool, name: &str) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE topic_assignment.questions SET constraint_name = NULL WHERE constraint_name = $1",
    )
    .bind(name)
    .execute(&mut *tx)
    .await?;
    let deleted = sqlx::query("DELETE FROM topic_assignment.constraints WHERE name = $1")
        .bind(name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

// ---- questionnaire ----

pub async fn fetch_questions(pool: &PgPool, period_id: Uuid) -> anyhow::Result<Vec<Question>> {
    let rows = sqlx::query(
        "SELECT id, period_id, prompt, constraint_name, max_scale, required \
         FROM topic_assignment.questions WHERE period_id = $1 ORDER BY prompt",
    )
    .bind(period_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Question {
            id: row.get("id"),
            period_id: row.get("period_id"),
            prompt: row.get("prompt"),
            constraint_name: row.get("constraint_name"),
            max_scale: row.get("max_scale"),
            required: row.get("required"),
        })
        .collect())
}

pub async fn fetch_preferences(pool: &PgPool, period_id: Uuid) -> anyhow::Result<Vec<Preference>> {
    let rows = sqlx::query(
        "SELECT student_id, period_id, topic_order, last_updated \
         FROM topic_assignment.preferences WHERE period_id = $1",
    )
    .bind(period_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Preference {
            student_id: row.get("student_id"),
            period_id: row.get("period_id"),
            topic_order: row.get("topic_order"),
            last_updated: row.get("last_updated"),
        })
        .collect())
}

pub async fn upsert_preference(
    pool: &PgPool,
    student_id: Uuid,
    period_id: Uuid,
    topic_order: &[Uuid],
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO topic_assignment.preferences (student_id, period_id, topic_order, last_updated)
        VALUES ($1, $2, $3, now())
        ON CONFLICT (student_id, period_id) DO UPDATE
        SET topic_order = EXCLUDED.topic_order, last_updated = now()
        "#,
    )
    .bind(student_id)
    .bind(period_id)
    .bind(topic_order)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_answers(pool: &PgPool, period_id: Uuid) -> anyhow::Result<Vec<StudentAnswer>> {
    let rows = sqlx::query(
        "SELECT student_id, period_id, question_id, raw_bool, raw_scale, normalized_answer \
         FROM topic_assignment.student_answers WHERE period_id = $1",
    )
    .bind(period_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let raw_bool: Option<bool> = row.get("raw_bool");
            let raw_scale: Option<i32> = row.get("raw_scale");
            StudentAnswer {
                student_id: row.get("student_id"),
                period_id: row.get("period_id"),
                question_id: row.get("question_id"),
                raw_answer: match (raw_bool, raw_scale) {
                    (Some(b), _) => RawAnswer::Bool(b),
                    (None, Some(s)) => RawAnswer::Scale(s),
                    (None, None) => RawAnswer::Scale(0),
                },
                normalized_answer: row.get("normalized_answer"),
            }
        })
        .collect())
}

/// One answer per (student, period, question); later writes overwrite,
/// never duplicate.
pub async fn upsert_answer(
    pool: &PgPool,
    student_id: Uuid,
    period_id: Uuid,
    question_id: Uuid,
    raw: RawAnswer,
    max_scale: i32,
) -> anyhow::Result<()> {
    let normalized = constraints::normalize_answer(raw, max_scale);
    let (raw_bool, raw_scale) = match raw {
        RawAnswer::Bool(b) => (Some(b), None),
        RawAnswer::Scale(s) => (None, Some(s)),
    };

    sqlx::query(
        r#"
        INSERT INTO topic_assignment.student_answers
        (student_id, period_id, question_id, raw_bool, raw_scale, normalized_answer)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_id, period_id, question_id) DO UPDATE
        SET raw_bool = EXCLUDED.raw_bool,
            raw_scale = EXCLUDED.raw_scale,
            normalized_answer = EXCLUDED.normalized_answer
        "#,
    )
    .bind(student_id)
    .bind(period_id)
    .bind(question_id)
    .bind(raw_bool)
    .bind(raw_scale)
    .bind(normalized)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_exclusions(
    pool: &PgPool,
    period_id: Uuid,
) -> anyhow::Result<Vec<(Uuid, Uuid)>> {
    let rows = sqlx::query(
        "SELECT student_a, student_b FROM topic_assignment.exclusions WHERE period_id = $1",
    )
    .bind(period_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("student_a"), row.get("student_b")))
        .collect())
}

// ---- students ----

pub async fn upsert_student(pool: &PgPool, full_name: &str, email: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO topic_assignment.students (id, full_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

pub async fn fetch_students(pool: &PgPool) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query("SELECT id, full_name, email FROM topic_assignment.students")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| Student {
            id: row.get("id"),
            full_name: row.get("full_name"),
            email: row.get("email"),
        })
        .collect())
}

// ---- deferred jobs ----

fn job_from_row(row: &PgRow) -> anyhow::Result<DeferredJob> {
    let status: String = row.get("status");
    Ok(DeferredJob {
        id: row.get("id"),
        period_id: row.get("period_id"),
        kind: row.get("kind"),
        request: row.get("request"),
        status: JobStatus::parse(&status)
            .with_context(|| format!("unknown job status '{status}'"))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        evaluation_id: row.get("evaluation_id"),
        result_data: row.get("result_data"),
        result_hash: row.get("result_hash"),
        error: row.get("error"),
        batch_id: row.get("batch_id"),
    })
}

const JOB_COLUMNS: &str = "id, period_id, kind, request, status, created_at, updated_at, \
                           evaluation_id, result_data, result_hash, error, batch_id";

/// Insert a new pending job. The partial unique index on (period_id)
/// WHERE status = 'pending' backstops the at-most-one-pending
/// invariant even across concurrent handlers.
pub async fn insert_job(
    pool: &PgPool,
    period_id: Uuid,
    kind: &str,
    compiled: &CompiledRequest,
) -> anyhow::Result<DeferredJob> {
    let request = serde_json::to_value(compiled)?;
    let row = sqlx::query(&format!(
        "INSERT INTO topic_assignment.deferred_jobs (id, period_id, kind, request) \
         VALUES ($1, $2, $3, $4) RETURNING {JOB_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(period_id)
    .bind(kind)
    .bind(request)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return anyhow::Error::from(AssignError::JobAlreadyPending { period_id });
            }
        }
        anyhow::Error::from(e)
    })?;
    job_from_row(&row)
}

pub async fn fetch_job(pool: &PgPool, job_id: Uuid) -> anyhow::Result<DeferredJob> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM topic_assignment.deferred_jobs WHERE id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no job with id {job_id}"))?;
    job_from_row(&row)
}

pub async fn pending_job(pool: &PgPool, period_id: Uuid) -> anyhow::Result<Option<DeferredJob>> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM topic_assignment.deferred_jobs \
         WHERE period_id = $1 AND status = 'pending'"
    ))
    .bind(period_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(job_from_row).transpose()
}

/// Guarded terminal transitions: only a pending job can move, so a
/// duplicate or stale callback is a silent no-op. Returns whether the
/// transition was applied.
pub async fn complete_job(
    pool: &PgPool,
    job_id: Uuid,
    evaluation_id: &str,
    data: &serde_json::Value,
    data_hash: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE topic_assignment.deferred_jobs
        SET status = 'completed', evaluation_id = $2, result_data = $3,
            result_hash = $4, updated_at = now()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(job_id)
    .bind(evaluation_id)
    .bind(data)
    .bind(data_hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fail_job(pool: &PgPool, job_id: Uuid, error: &str) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE topic_assignment.deferred_jobs
        SET status = 'failed', error = $2, updated_at = now()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(job_id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn abandon_job(pool: &PgPool, job_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE topic_assignment.deferred_jobs
        SET status = 'abandoned', updated_at = now()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ---- assignments ----

/// The current batch is derived: latest batch_id by materialization
/// time, never a stored foreign key on the period.
pub async fn current_batch_id(pool: &PgPool, period_id: Uuid) -> anyhow::Result<Option<String>> {
    let row = sqlx::query(
        "SELECT batch_id FROM topic_assignment.assignments \
         WHERE period_id = $1 ORDER BY assigned_at DESC, batch_id DESC LIMIT 1",
    )
    .bind(period_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.get("batch_id")))
}

pub async fn fetch_batch(
    pool: &PgPool,
    period_id: Uuid,
    batch_id: &str,
) -> anyhow::Result<Vec<Assignment>> {
    let rows = sqlx::query(
        "SELECT period_id, batch_id, student_id, topic_id, assigned_at, original_rank \
         FROM topic_assignment.assignments WHERE period_id = $1 AND batch_id = $2",
    )
    .bind(period_id)
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Assignment {
            period_id: row.get("period_id"),
            batch_id: row.get("batch_id"),
            student_id: row.get("student_id"),
            topic_id: row.get("topic_id"),
            assigned_at: row.get("assigned_at"),
            original_rank: row.get("original_rank"),
        })
        .collect())
}

/// All-or-nothing batch write. Prior batches stay in place for audit;
/// readers pick up the new batch_id only once the transaction commits.
/// The producing job is stamped with the batch in the same
/// transaction, so a completed job without a stamp never had its
/// result applied.
pub async fn insert_assignment_batch(
    pool: &PgPool,
    job_id: Uuid,
    assignments: &[Assignment],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for assignment in assignments {
        sqlx::query(
            r#"
            INSERT INTO topic_assignment.assignments
            (period_id, batch_id, student_id, topic_id, assigned_at, original_rank)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(assignment.period_id)
        .bind(&assignment.batch_id)
        .bind(assignment.student_id)
        .bind(assignment.topic_id)
        .bind(assignment.assigned_at)
        .bind(assignment.original_rank)
        .execute(&mut *tx)
        .await?;
    }
    if let Some(first) = assignments.first() {
        sqlx::query("UPDATE topic_assignment.deferred_jobs SET batch_id = $2 WHERE id = $1")
            .bind(job_id)
            .bind(&first.batch_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

// ---- csv ingest ----

/// Import ranked preferences: one row per student, topics listed in
/// rank order separated by semicolons. Unknown topic titles fail the
/// import rather than silently dropping a rank.
pub async fn import_preferences_csv(
    pool: &PgPool,
    period_id: Uuid,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        topic_order: String,
    }

    let topics = fetch_topics(pool, period_id).await?;
    let by_title: HashMap<&str, Uuid> = topics
        .iter()
        .map(|t| (t.title.as_str(), t.id))
        .collect();

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let student_id = upsert_student(pool, &row.full_name, &row.email).await?;

        let mut order = Vec::new();
        for title in row.topic_order.split(';').map(str::trim) {
            let topic_id = by_title
                .get(title)
                .with_context(|| format!("unknown topic '{title}' for {}", row.email))?;
            if !order.contains(topic_id) {
                order.push(*topic_id);
            }
        }

        upsert_preference(pool, student_id, period_id, &order).await?;
        imported += 1;
    }

    Ok(imported)
}

/// Boolean answers accept exactly true/false (any case, surrounding
/// whitespace ignored). Anything else fails the import; "yes" or a
/// typo must not silently land as false.
fn parse_bool_answer(value: &str) -> anyhow::Result<bool> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        anyhow::bail!("bad boolean answer '{value}', expected true or false")
    }
}

/// Import questionnaire answers: one row per (student, question).
/// Boolean questions accept true/false, scale questions a number.
pub async fn import_answers_csv(
    pool: &PgPool,
    period_id: Uuid,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        question: String,
        answer: String,
    }

    let questions = fetch_questions(pool, period_id).await?;
    let by_prompt: HashMap<&str, &Question> =
        questions.iter().map(|q| (q.prompt.as_str(), q)).collect();

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let question = by_prompt
            .get(row.question.as_str())
            .with_context(|| format!("unknown question '{}'", row.question))?;
        let student_id = upsert_student(pool, &row.full_name, &row.email).await?;

        let raw = if question.max_scale <= 0 {
            RawAnswer::Bool(
                parse_bool_answer(&row.answer)
                    .with_context(|| format!("answer for {}", row.email))?,
            )
        } else {
            RawAnswer::Scale(
                row.answer
                    .trim()
                    .parse()
                    .with_context(|| format!("bad scale answer '{}'", row.answer))?,
            )
        };

        upsert_answer(pool, student_id, period_id, question.id, raw, question.max_scale).await?;
        imported += 1;
    }

    Ok(imported)
}

// ---- seed ----

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let period_id = Uuid::parse_str("7f1530f2-55b1-4f6f-9a0e-3c9d2b6f8a01")?;
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO topic_assignment.periods (id, name, opens_at, closes_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO UPDATE
        SET opens_at = EXCLUDED.opens_at, closes_at = EXCLUDED.closes_at
        "#,
    )
    .bind(period_id)
    .bind("spring-2026")
    .bind(now - Duration::days(14))
    .bind(now - Duration::days(1))
    .execute(pool)
    .await?;

    let topics = vec![
        (
            Uuid::parse_str("9a3a2a61-4a25-4d9e-8f2e-6d1f0b2c7e10")?,
            "Data Commons",
        ),
        (
            Uuid::parse_str("b4c8e7f0-1d2a-43b5-9c6e-8f0a1b2c3d4e")?,
            "Robotics Lab",
        ),
    ];
    for (id, title) in &topics {
        sqlx::query(
            r#"
            INSERT INTO topic_assignment.topics (id, period_id, title)
            VALUES ($1, $2, $3)
            ON CONFLICT (period_id, title) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(period_id)
        .bind(title)
        .execute(pool)
        .await?;
    }

    let constraint_id = upsert_constraint(
        pool,
        ConstraintDef {
            id: Uuid::parse_str("c1d2e3f4-0a1b-4c2d-8e3f-5a6b7c8d9e0f")?,
            name: "prior-coursework".to_string(),
            criterion_type: Some(CriterionType::Prerequisite),
            // Percentage-style input; stored as 0.5.
            min_ratio: Some(50.0),
            min_students: None,
            max_students: None,
        },
    )
    .await?;
    sqlx::query(
        r#"
        INSERT INTO topic_assignment.topic_constraints (topic_id, constraint_id)
        VALUES ($1, $2) ON CONFLICT DO NOTHING
        "#,
    )
    .bind(topics[1].0)
    .bind(constraint_id)
    .execute(pool)
    .await?;

    let question_id = Uuid::parse_str("d9e8f7a6-5b4c-4d3e-9f2a-1b0c9d8e7f6a")?;
    sqlx::query(
        r#"
        INSERT INTO topic_assignment.questions
        (id, period_id, prompt, constraint_name, max_scale, required)
        VALUES ($1, $2, $3, $4, 0, TRUE)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(question_id)
    .bind(period_id)
    .bind("Completed the robotics prerequisite course?")
    .bind("prior-coursework")
    .execute(pool)
    .await?;

    let students = vec![
        ("Avery Lee", "avery.lee@groupscholar.com", true),
        ("Jules Moreno", "jules.moreno@groupscholar.com", false),
        ("Kiara Patel", "kiara.patel@groupscholar.com", true),
        ("Sam Okafor", "sam.okafor@groupscholar.com", true),
        ("Noa Fischer", "noa.fischer@groupscholar.com", false),
        ("Teo Ramirez", "teo.ramirez@groupscholar.com", true),
    ];
    let topic_ids: Vec<Uuid> = topics.iter().map(|(id, _)| *id).collect();

    for (i, (name, email, took_course)) in students.iter().enumerate() {
        let student_id = upsert_student(pool, name, email).await?;

        // Alternate first choices so neither topic is universally
        // preferred.
        let order = if i % 2 == 0 {
            vec![topic_ids[1], topic_ids[0]]
        } else {
            vec![topic_ids[0], topic_ids[1]]
        };
        upsert_preference(pool, student_id, period_id, &order).await?;
        upsert_answer(
            pool,
            student_id,
            period_id,
            question_id,
            RawAnswer::Bool(*took_course),
            0,
        )
        .await?;
    }

    Ok(())
}
