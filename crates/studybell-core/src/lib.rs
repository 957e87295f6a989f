//! Shared foundation for studybell: configuration and the error taxonomy.

pub mod config;
pub mod error;
