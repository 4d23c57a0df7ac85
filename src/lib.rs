//! # HIMS
//!
//! 医院信息管理系统的床位分配与住院生命周期核心。
//! 根包聚合各子crate并承载演示程序，业务逻辑位于 `crates/` 下。

pub use hims_allocation as allocation;
pub use hims_core as core;
pub use hims_integration as integration;
pub use hims_registry as registry;
