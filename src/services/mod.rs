// src/services/mod.rs

pub mod answer_key;
pub mod backfill;
pub mod eligibility;
pub mod invite_codes;
pub mod question_format;
pub mod scoring;
