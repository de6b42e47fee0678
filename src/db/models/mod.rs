//! Database models split into separate files.
//! This module re-exports individual model modules so call sites can use
//! `crate::db::models::*`.

pub mod category;
pub mod recurring_task;
pub mod reminder;
pub mod task;

pub use self::category::*;
pub use self::recurring_task::*;
pub use self::reminder::*;
pub use self::task::*;
