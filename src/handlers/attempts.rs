// src/handlers/attempts.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, types::Json as SqlJson};

use crate::{
    config::Config,
    error::AppError,
    handlers::exams::{fetch_exam, fetch_questions},
    models::{
        attempt::{
            Attempt, AttemptAnswer, AttemptResult, AttemptSession, AttemptStatus, AttemptSummary,
            QuestionResult, SaveAnswerRequest, SubmitAttemptRequest,
        },
        exam::Exam,
        question::{PublicQuestion, Question},
    },
    services::{
        answer_key::QuestionData,
        eligibility::{AttemptWindow, Eligibility, answers_revealed, attempt_deadline, can_start_attempt},
        scoring::{GradingItem, score_attempt},
    },
    utils::jwt::Claims,
};

pub(crate) const ATTEMPT_COLUMNS: &str =
    "id, user_id, exam_id, status, score, max_score, percentage, passed, started_at, completed_at";

/// Same columns, qualified for joins against `attempts a`.
pub(crate) const ATTEMPT_COLUMNS_A: &str = "a.id AS id, a.user_id AS user_id, a.exam_id AS exam_id, a.status AS status, \
     a.score AS score, a.max_score AS max_score, a.percentage AS percentage, a.passed AS passed, \
     a.started_at AS started_at, a.completed_at AS completed_at";

async fn fetch_attempt<'e, E>(executor: E, id: i64) -> Result<Attempt, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Attempt>(&format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

/// Loads an attempt the caller owns. Other users' attempts look missing.
async fn fetch_own_attempt(pool: &SqlitePool, id: i64, claims: &Claims) -> Result<Attempt, AppError> {
    let attempt = fetch_attempt(pool, id).await?;
    if attempt.user_id != claims.user_id()? {
        return Err(AppError::NotFound("Attempt not found".to_string()));
    }
    Ok(attempt)
}

async fn load_answers<'e, E>(executor: E, attempt_id: i64) -> Result<Vec<AttemptAnswer>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, AttemptAnswer>(
        "SELECT attempt_id, question_id, answer_data, is_correct, points_earned, answered_at \
         FROM attempt_answers WHERE attempt_id = ?",
    )
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

fn answers_by_question(rows: Vec<AttemptAnswer>) -> HashMap<i64, Value> {
    rows.into_iter()
        .map(|row| (row.question_id, row.answer_data.0))
        .collect()
}

/// Parses every question's answer key. A question whose stored data is
/// unusable is logged and left out of grading rather than blocking the
/// submission.
fn gradable(questions: &[Question]) -> Vec<(i64, i64, QuestionData)> {
    questions
        .iter()
        .filter_map(|q| match q.data() {
            Ok(data) => Some((q.id, q.points, data)),
            Err(e) => {
                tracing::error!("Question {} has unusable question_data: {}", q.id, e);
                None
            }
        })
        .collect()
}

fn public_questions(questions: &[Question]) -> Result<Vec<PublicQuestion>, AppError> {
    questions
        .iter()
        .map(|q| {
            q.to_public().map_err(|e| {
                AppError::InternalServerError(format!("question {} is malformed: {}", q.id, e))
            })
        })
        .collect()
}

/// Grades `answers`, stores them with their correctness, and closes the
/// attempt with `status`.
async fn finalize_attempt(
    conn: &mut SqliteConnection,
    exam: &Exam,
    attempt_id: i64,
    questions: &[Question],
    answers: &HashMap<i64, Value>,
    status: AttemptStatus,
    now: DateTime<Utc>,
) -> Result<Attempt, AppError> {
    let parsed = gradable(questions);
    let result = score_attempt(
        parsed.iter().map(|(question_id, points, data)| GradingItem {
            question_id: *question_id,
            points: *points,
            data,
        }),
        answers,
    );

    for graded in &result.questions {
        let Some(answer) = answers.get(&graded.question_id) else {
            continue;
        };
        sqlx::query(
            r#"
            INSERT INTO attempt_answers (attempt_id, question_id, answer_data, is_correct, points_earned, answered_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(attempt_id, question_id) DO UPDATE SET
                answer_data = excluded.answer_data,
                is_correct = excluded.is_correct,
                points_earned = excluded.points_earned,
                answered_at = CASE
                    WHEN attempt_answers.answer_data = excluded.answer_data THEN attempt_answers.answered_at
                    ELSE excluded.answered_at
                END
            "#,
        )
        .bind(attempt_id)
        .bind(graded.question_id)
        .bind(SqlJson(answer))
        .bind(graded.is_correct)
        .bind(graded.points_earned)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    let passed = result.passed(exam.passing_score);
    let attempt = sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts SET status = ?, score = ?, max_score = ?, percentage = ?, passed = ?, completed_at = ? \
         WHERE id = ? RETURNING {ATTEMPT_COLUMNS}"
    ))
    .bind(status)
    .bind(result.score)
    .bind(result.max_score)
    .bind(result.percentage)
    .bind(passed)
    .bind(now)
    .bind(attempt_id)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        "Attempt {} closed as {:?}: {}/{} ({:.1}%)",
        attempt_id,
        status,
        result.score,
        result.max_score,
        result.percentage
    );

    Ok(attempt)
}

async fn user_attempts(pool: &SqlitePool, user_id: i64, exam_id: i64) -> Result<Vec<Attempt>, AppError> {
    let attempts = sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE user_id = ? AND exam_id = ? ORDER BY started_at DESC"
    ))
    .bind(user_id)
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    Ok(attempts)
}

/// Reports whether the caller may start (or resume) the exam now, without
/// changing anything.
pub async fn check_eligibility(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = fetch_exam(&pool, exam_id).await?;
    let attempts = user_attempts(&pool, claims.user_id()?, exam_id).await?;

    let window = AttemptWindow::new(config.resume_window_minutes, config.submit_grace_seconds);
    Ok(Json(can_start_attempt(&exam, &attempts, Utc::now(), window)))
}

/// Starts a new attempt or resumes the running one.
///
/// * 403 when the eligibility check denies the start.
/// * 200 with the running attempt when it can be resumed.
/// * 201 with a new attempt otherwise; abandoned attempts are first closed
///   as `ended`, graded on what they saved.
pub async fn start_attempt(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let exam = fetch_exam(&pool, exam_id).await?;
    let attempts = user_attempts(&pool, user_id, exam_id).await?;
    let now = Utc::now();

    let window = AttemptWindow::new(config.resume_window_minutes, config.submit_grace_seconds);
    let questions = fetch_questions(&pool, exam_id).await?;

    let (attempt, resumed) = match can_start_attempt(&exam, &attempts, now, window) {
        Eligibility::Denied(reason) => {
            tracing::info!("User {} denied exam {}: {:?}", user_id, exam_id, reason);
            return Err(AppError::Forbidden(reason.message()));
        }
        Eligibility::Resume { attempt_id } => (fetch_attempt(&pool, attempt_id).await?, true),
        Eligibility::StartNew { stale_attempt_ids } => {
            let mut tx = pool.begin().await?;

            for stale_id in stale_attempt_ids {
                let saved = answers_by_question(load_answers(&mut *tx, stale_id).await?);
                finalize_attempt(&mut tx, &exam, stale_id, &questions, &saved, AttemptStatus::Ended, now)
                    .await?;
            }

            let attempt = sqlx::query_as::<_, Attempt>(&format!(
                "INSERT INTO attempts (user_id, exam_id, status, started_at) VALUES (?, ?, ?, ?) RETURNING {ATTEMPT_COLUMNS}"
            ))
            .bind(user_id)
            .bind(exam_id)
            .bind(AttemptStatus::InProgress)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to start attempt: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;

            tx.commit().await?;
            tracing::info!("User {} started attempt {} on exam {}", user_id, attempt.id, exam_id);
            (attempt, false)
        }
    };

    let saved_answers = answers_by_question(load_answers(&pool, attempt.id).await?);
    let session = AttemptSession {
        deadline: attempt_deadline(&exam, attempt.started_at),
        questions: public_questions(&questions)?,
        saved_answers,
        resumed,
        attempt,
    };

    let status = if resumed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(session)))
}

/// Fails with 409 unless the attempt is still running and within its time.
fn ensure_open(
    attempt: &Attempt,
    exam: &Exam,
    now: DateTime<Utc>,
    grace_seconds: i64,
) -> Result<bool, AppError> {
    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::Conflict("Attempt is no longer in progress".to_string()));
    }
    let deadline = attempt_deadline(exam, attempt.started_at) + chrono::Duration::seconds(grace_seconds);
    Ok(now <= deadline)
}

/// Saves one answer while the attempt is running (autosave).
pub async fn save_answer(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_own_attempt(&pool, attempt_id, &claims).await?;
    let exam = fetch_exam(&pool, attempt.exam_id).await?;
    let now = Utc::now();

    if !ensure_open(&attempt, &exam, now, config.submit_grace_seconds)? {
        return Err(AppError::Conflict("Time is up for this attempt".to_string()));
    }

    let belongs = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions WHERE id = ? AND exam_id = ?")
        .bind(payload.question_id)
        .bind(attempt.exam_id)
        .fetch_one(&pool)
        .await?;
    if belongs == 0 {
        return Err(AppError::BadRequest(
            "Question does not belong to this exam".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO attempt_answers (attempt_id, question_id, answer_data, answered_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(attempt_id, question_id) DO UPDATE SET
            answer_data = excluded.answer_data,
            answered_at = excluded.answered_at
        "#,
    )
    .bind(attempt_id)
    .bind(payload.question_id)
    .bind(SqlJson(&payload.answer))
    .bind(now)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to save answer: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Submits an attempt and grades it.
///
/// On time, the submitted answers override saved ones and the attempt is
/// `completed`. Past the deadline (plus grace) the payload is ignored, the
/// saved answers are graded and the attempt is `ended`.
pub async fn submit_attempt(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_own_attempt(&pool, attempt_id, &claims).await?;
    let exam = fetch_exam(&pool, attempt.exam_id).await?;
    let now = Utc::now();
    let on_time = ensure_open(&attempt, &exam, now, config.submit_grace_seconds)?;

    let questions = fetch_questions(&pool, exam.id).await?;

    let mut tx = pool.begin().await?;

    // Re-read inside the transaction so a concurrent submit cannot grade twice.
    let current = fetch_attempt(&mut *tx, attempt_id).await?;
    if current.status != AttemptStatus::InProgress {
        return Err(AppError::Conflict("Attempt is no longer in progress".to_string()));
    }

    let mut answers = answers_by_question(load_answers(&mut *tx, attempt_id).await?);
    let status = if on_time {
        answers.extend(
            payload
                .answers
                .into_iter()
                .filter(|(question_id, _)| questions.iter().any(|q| q.id == *question_id)),
        );
        AttemptStatus::Completed
    } else {
        tracing::warn!("Attempt {} submitted after its deadline", attempt_id);
        AttemptStatus::Ended
    };

    let attempt = finalize_attempt(&mut tx, &exam, attempt_id, &questions, &answers, status, now).await?;
    tx.commit().await?;

    let result = build_result(&pool, &config, &claims, attempt).await?;
    Ok(Json(result))
}

/// Per-question results. Owner or admin.
pub async fn get_results(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = if claims.is_admin() {
        fetch_attempt(&pool, attempt_id).await?
    } else {
        fetch_own_attempt(&pool, attempt_id, &claims).await?
    };

    Ok(Json(build_result(&pool, &config, &claims, attempt).await?))
}

/// The caller's attempts across all exams, newest first.
pub async fn list_my_attempts(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = sqlx::query_as::<_, AttemptSummary>(&format!(
        r#"
        SELECT {ATTEMPT_COLUMNS_A}, e.title AS exam_title
        FROM attempts a
        JOIN exams e ON e.id = a.exam_id
        WHERE a.user_id = ?
        ORDER BY a.started_at DESC, a.id DESC
        "#
    ))
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list attempts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(attempts))
}

/// Assembles the results view. Admins always see correct answers; students
/// only once [`answers_revealed`] allows it.
async fn build_result(
    pool: &SqlitePool,
    config: &Config,
    claims: &Claims,
    attempt: Attempt,
) -> Result<AttemptResult, AppError> {
    let exam = fetch_exam(pool, attempt.exam_id).await?;
    let questions = fetch_questions(pool, exam.id).await?;
    let rows: HashMap<i64, AttemptAnswer> = load_answers(pool, attempt.id)
        .await?
        .into_iter()
        .map(|row| (row.question_id, row))
        .collect();

    let reveal = if claims.is_admin() {
        true
    } else {
        let attempts = user_attempts(pool, attempt.user_id, exam.id).await?;
        let window = AttemptWindow::new(config.resume_window_minutes, config.submit_grace_seconds);
        answers_revealed(&exam, &attempt, &attempts, Utc::now(), window)
    };

    let results: Vec<QuestionResult> = questions
        .iter()
        .map(|q| {
            let row = rows.get(&q.id);
            QuestionResult {
                question_id: q.id,
                question_text: q.question_text.clone(),
                submitted: row.map(|r| r.answer_data.0.clone()),
                is_correct: row.and_then(|r| r.is_correct).unwrap_or(false),
                points_earned: row.and_then(|r| r.points_earned).unwrap_or(0),
                points_possible: q.points,
                correct_answer: if reveal {
                    q.data().ok().map(|data| data.key_value())
                } else {
                    None
                },
            }
        })
        .collect();

    Ok(AttemptResult {
        correct_count: results.iter().filter(|r| r.is_correct).count(),
        total_questions: results.len(),
        exam_title: exam.title,
        passing_score: exam.passing_score,
        questions: results,
        attempt,
    })
}
