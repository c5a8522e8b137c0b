//! Type definitions

pub mod contact;
pub mod issue;
pub mod job;
pub mod messages;
pub mod row;

pub use contact::*;
pub use issue::*;
pub use job::*;
pub use messages::*;
pub use row::*;
