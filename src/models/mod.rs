// src/models/mod.rs

pub mod attempt;
pub mod exam;
pub mod invite_code;
pub mod question;
pub mod user;
