//! Repair-candidate generation.
//!
//! Transforms are learned from (before, after) training pairs or written by
//! hand as template rules. A [`search::SearchSpace`] applies them to a defect
//! site and yields type-checked candidate fragments. [`localize`] ranks the
//! source lines worth trying from failing-test stack traces.
pub mod adapter;
pub mod config;
pub mod error;
pub mod generator;
pub mod localize;
pub mod oracle;
pub mod project;
pub mod schema;
pub mod search;
pub mod site;
pub mod staging;
pub mod templates;
pub mod transform;
pub mod tree;
pub mod util;

pub use error::{Error, Result};
