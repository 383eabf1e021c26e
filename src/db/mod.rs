//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: typed entities passed into and out of repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `vcomics::db` — we re-export the
//! repository API and commonly used models for convenience.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{ClaimedJob, NewJob};
