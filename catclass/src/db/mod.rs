//! Database access for catclass
//!
//! Query helpers for the three tables the classifier touches. Schema creation
//! lives in `catclass_common::db::init`.

pub mod categories;
pub mod products;
pub mod runs;

pub use catclass_common::db::init::{init_database, init_memory_database};
