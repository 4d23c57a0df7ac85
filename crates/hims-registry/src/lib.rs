//! # HIMS Registry
//!
//! 床位登记处与住院台账。对外只暴露原子的条件更新原语，
//! 所有跨记录不变式在写入时校验，绝不提供"发后不理"式的更新。

pub mod admission_ledger;
pub mod bed_registry;
pub mod store;

pub use admission_ledger::MemoryAdmissionLedger;
pub use bed_registry::MemoryBedRegistry;
pub use store::{AdmissionStore, BedStore, NewAdmission};
