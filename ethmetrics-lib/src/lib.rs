#![allow(clippy::new_without_default)]

pub mod api;
pub mod collector;
pub mod config;
pub mod database;
pub mod error;
pub mod model;
pub mod parser;
pub mod retry;
pub mod scheduler;
