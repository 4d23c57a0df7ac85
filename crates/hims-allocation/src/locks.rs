//! 锁管理器
//!
//! 按资源id粒度串行化状态变更：同一床位或同一患者上的操作
//! 互斥，不同资源上的操作完全并行。多把锁按固定顺序获取，
//! 重叠的键集合不会死锁。获取有界等待，超时以 `ResourceBusy`
//! 返回而不是无限挂起。

use hims_core::{HimsError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// 锁键：每个键对应一把独立的互斥锁
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Bed(Uuid),
    Patient(Uuid),
    Admission(Uuid),
}

/// 持有的锁集合，释放即drop
pub struct LockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

/// 锁管理器
pub struct LockManager {
    locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
    acquire_timeout: Duration,
}

impl LockManager {
    /// 创建锁管理器，`acquire_timeout` 为单把锁的最长等待时间
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            acquire_timeout,
        }
    }

    /// 获取一组锁。键先排序去重再依次获取，全部拿到后返回守卫；
    /// 任何一把超时则释放已持有的锁并返回 `ResourceBusy`
    pub async fn acquire(&self, keys: &[LockKey]) -> Result<LockGuard> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let mutex = {
                let mut locks = self.locks.lock().await;
                locks
                    .entry(key)
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            };

            let guard = tokio::time::timeout(self.acquire_timeout, mutex.lock_owned())
                .await
                .map_err(|_| {
                    tracing::warn!("Lock wait timed out for {:?}", key);
                    HimsError::ResourceBusy(format!("lock wait timed out for {:?}", key))
                })?;
            guards.push(guard);
        }

        Ok(LockGuard { _guards: guards })
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
