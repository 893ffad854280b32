//! # EntoLab Common Library
//!
//! Shared code for the EntoLab forensic entomology services including:
//! - Database pool, schema, and row models
//! - Event types (EntoEvent enum) and EventBus
//! - Configuration loading
//! - Bounded annotation history (undo/redo)
//! - PMI thermal-summation core

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod history;
pub mod pmi;

pub use error::{Error, Result};
pub use history::History;
pub use pmi::{LifeStage, PmiError, PmiEstimate, Species};
