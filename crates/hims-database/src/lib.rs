//! # HIMS Database
//!
//! 存储接口的PostgreSQL实现。所有条件更新以
//! `UPDATE ... WHERE status = ...` 的受影响行数判定成败，
//! 提供与内存实现等价的原子比较写入语义。

pub mod connection;
pub mod models;
pub mod queries;

pub use connection::DatabasePool;
pub use queries::{create_tables, PgAdmissionLedger, PgBedRegistry};
