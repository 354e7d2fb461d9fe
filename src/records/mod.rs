//! Example record persistence.
//!
//! The [`store::RecordStore`] trait defines the CRUD interface;
//! [`memory::MemoryRecordStore`] and [`sqlite::SqliteRecordStore`]
//! implement it.

pub mod memory;
pub mod sqlite;
pub mod store;
