//! 床位状态机
//!
//! 管理床位的合法状态转换：
//! Vacant -> Occupied -> Vacant 为一次入住周期；
//! Maintenance/Reserved 是只能从 Vacant 进入、只能回到 Vacant 的侧态。

use hims_core::{BedStatus, HimsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 床位状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BedEvent {
    Admit,
    Discharge,
    StartMaintenance,
    Reserve,
    ReturnToService,
}

/// 床位状态机
#[derive(Debug)]
pub struct BedStateMachine {
    transitions: HashMap<(BedStatus, BedEvent), BedStatus>,
}

impl BedStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert((BedStatus::Vacant, BedEvent::Admit), BedStatus::Occupied);
        transitions.insert((BedStatus::Occupied, BedEvent::Discharge), BedStatus::Vacant);
        transitions.insert((BedStatus::Vacant, BedEvent::StartMaintenance), BedStatus::Maintenance);
        transitions.insert((BedStatus::Vacant, BedEvent::Reserve), BedStatus::Reserved);
        transitions.insert((BedStatus::Maintenance, BedEvent::ReturnToService), BedStatus::Vacant);
        transitions.insert((BedStatus::Reserved, BedEvent::ReturnToService), BedStatus::Vacant);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: BedStatus, event: BedEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: BedStatus, event: BedEvent) -> Result<BedStatus> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(HimsError::InvalidStateTransition {
                from: from.to_string(),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取所有可能的状态
    pub fn get_all_states() -> Vec<BedStatus> {
        vec![
            BedStatus::Vacant,
            BedStatus::Occupied,
            BedStatus::Maintenance,
            BedStatus::Reserved,
        ]
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: BedStatus) -> Vec<BedEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for BedStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = BedStateMachine::new();

        assert!(sm.can_transition(BedStatus::Vacant, BedEvent::Admit));
        assert!(sm.can_transition(BedStatus::Occupied, BedEvent::Discharge));
        assert!(sm.can_transition(BedStatus::Vacant, BedEvent::StartMaintenance));
        assert!(sm.can_transition(BedStatus::Reserved, BedEvent::ReturnToService));
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = BedStateMachine::new();

        // 占用中的床位不能停用或预留
        assert!(!sm.can_transition(BedStatus::Occupied, BedEvent::StartMaintenance));
        assert!(!sm.can_transition(BedStatus::Occupied, BedEvent::Reserve));
        // 侧态不能直接入住
        assert!(!sm.can_transition(BedStatus::Maintenance, BedEvent::Admit));
        assert!(!sm.can_transition(BedStatus::Reserved, BedEvent::Admit));
        // 空闲床位没有可出院的占用
        assert!(!sm.can_transition(BedStatus::Vacant, BedEvent::Discharge));
    }

    #[test]
    fn test_state_execution() {
        let sm = BedStateMachine::new();

        let result = sm.transition(BedStatus::Vacant, BedEvent::Admit);
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), BedStatus::Occupied);

        let result = sm.transition(BedStatus::Maintenance, BedEvent::Admit);
        assert!(result.is_err());
    }

    #[test]
    fn test_possible_events_from_vacant() {
        let sm = BedStateMachine::new();
        let mut events = sm.get_possible_events(BedStatus::Vacant);
        events.sort_by_key(|e| format!("{:?}", e));
        assert_eq!(
            events,
            vec![BedEvent::Admit, BedEvent::Reserve, BedEvent::StartMaintenance]
        );
    }
}
