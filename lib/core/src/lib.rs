//! Core types shared by the nodeflow crates.
//!
//! This crate provides the error-handling foundation and the strongly typed
//! identifiers used throughout the workflow engine.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{JobId, ParseIdError};
