//! Core data models for the file hosting service.
//!
//! These entities map cleanly to database tables via `sqlx::FromRow` and
//! serialize naturally for template rendering via `serde`.

pub mod file_record;
