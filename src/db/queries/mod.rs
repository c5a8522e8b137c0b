//! Database queries, one module per entity.
//!
//! Every function takes an explicit executor (`&mut PgConnection`), so the
//! caller decides transaction boundaries. Pipeline stages run their
//! delete/rebuild work inside a single transaction; request handlers open
//! one per call.

pub mod contact;
pub mod issue;
pub mod job;
pub mod row;
