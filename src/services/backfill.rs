// src/services/backfill.rs

use serde::Serialize;
use sqlx::{SqlitePool, types::Json};

use crate::models::question::Question;

#[derive(Debug, Default, Serialize)]
pub struct BackfillReport {
    pub examined: usize,
    pub updated: usize,
    /// Questions whose `question_data` could not be normalized. Left untouched.
    pub failed: Vec<i64>,
}

/// Rewrites every question's `question_data` into the standardized answer
/// fields (`correctAnswer`, `correctAnswers`, `correctMappings`, ...).
///
/// Rows that already match are not written. A row that fails to normalize is
/// logged and skipped; the rest of the table is still processed.
pub async fn standardize_all_questions(pool: &SqlitePool) -> Result<BackfillReport, sqlx::Error> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, exam_id, question_type, question_text, question_data, points, position, created_at
        FROM questions
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut report = BackfillReport::default();
    let mut tx = pool.begin().await?;

    for question in &questions {
        report.examined += 1;

        let standardized = match question.data() {
            Ok(data) => data.to_value(),
            Err(e) => {
                tracing::warn!(
                    "Skipping question {} ({}): {}",
                    question.id,
                    question.question_type,
                    e
                );
                report.failed.push(question.id);
                continue;
            }
        };

        if standardized == question.question_data.0 {
            continue;
        }

        sqlx::query("UPDATE questions SET question_data = ? WHERE id = ?")
            .bind(Json(&standardized))
            .bind(question.id)
            .execute(&mut *tx)
            .await?;
        report.updated += 1;
    }

    tx.commit().await?;

    tracing::info!(
        "Answer key backfill: examined {}, updated {}, failed {}",
        report.examined,
        report.updated,
        report.failed.len()
    );

    Ok(report)
}
