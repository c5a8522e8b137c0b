//! Business logic services

pub mod conflicts;
pub mod finalize;
pub mod job_processor;
pub mod pipeline;
pub mod resolution;
pub mod storage;
pub mod validation;
