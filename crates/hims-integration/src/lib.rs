//! # HIMS Integration
//!
//! 外部协作方接入：患者目录、员工目录与计费系统通知。
//! 核心只消费这些接口，不拥有其背后的数据。

pub mod billing;
pub mod directory;

pub use billing::{BillingNotifier, DischargeNotice};
pub use directory::{
    AllowAllPatientDirectory, AllowAllStaffDirectory, DirectoryConfig, HttpPatientDirectory,
    HttpStaffDirectory, InMemoryPatientDirectory, InMemoryStaffDirectory, PatientDirectory,
    StaffDirectory, StaffRole,
};
