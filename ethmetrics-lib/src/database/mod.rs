//! Idempotent storage of metric records.

pub mod handler;
pub mod record;
pub mod statement;
