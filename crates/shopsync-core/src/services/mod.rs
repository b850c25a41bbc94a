//! Services shared by every interface

mod database;

pub use database::DatabaseService;
