//! # HIMS分配服务模块
//!
//! 提供床位与住院生命周期的完整状态管理功能，包括：
//! - 床位状态机：管理床位的合法状态转换
//! - 分配服务：入院、出院、转床的原子事务与补偿回滚
//! - 锁管理器：按床位/患者/住院记录粒度串行化写操作
//! - 责任医护分配：在院期间的医生/护士变更
//! - 生命体征记录：只追加的体征历史

pub mod care_team;
pub mod locks;
pub mod service;
pub mod state_machine;
pub mod vitals;

// 重新导出主要类型
pub use care_team::CareTeamService;
pub use locks::{LockGuard, LockKey, LockManager};
pub use service::AllocationService;
pub use state_machine::{BedEvent, BedStateMachine};
pub use vitals::VitalsRecorder;
