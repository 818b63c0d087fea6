// src/bin/standardize_answer_keys.rs

use anyhow::Context;
use exam_portal::{config::Config, db, services::backfill::standardize_all_questions, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let _guard = telemetry::init(&config.rust_log, "standardize-answer-keys.log");

    let pool = db::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    db::migrate(&pool)
        .await
        .context("failed to run database migrations")?;

    let report = standardize_all_questions(&pool).await?;

    println!(
        "Examined {} questions, updated {}, failed {}",
        report.examined,
        report.updated,
        report.failed.len()
    );
    for id in &report.failed {
        println!("    Could not standardize question {}", id);
    }

    if !report.failed.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
