//! 生命体征记录器
//!
//! 向在院记录追加带时间戳的体征条目。只做格式与数值良构性
//! 校验，不做临床合理性判断。条目一经追加不再修改或删除，
//! 更正以追加新条目并附说明的方式进行，保留完整历史。

use chrono::Utc;
use hims_core::{Admission, HimsError, Result, VitalsEntry, VitalsInput};
use hims_integration::{StaffDirectory, StaffRole};
use hims_registry::AdmissionStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::locks::{LockKey, LockManager};

// 每分钟计数类指标（脉搏、呼吸）的上限。良构性而非临床判断：
// 超出该值的读数必然是录入错误，也保证落库时的整型表示安全
const MAX_COUNT_PER_MINUTE: u32 = 1000;

/// 生命体征记录器
pub struct VitalsRecorder {
    admissions: Arc<dyn AdmissionStore>,
    staff: Arc<dyn StaffDirectory>,
    locks: Arc<LockManager>,
}

impl VitalsRecorder {
    /// 创建记录器
    pub fn new(
        admissions: Arc<dyn AdmissionStore>,
        staff: Arc<dyn StaffDirectory>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            admissions,
            staff,
            locks,
        }
    }

    /// 记录一次体征测量；时间戳与记录护士由本方法补全
    pub async fn record_vitals(
        &self,
        admission_id: Uuid,
        nurse_id: Uuid,
        input: VitalsInput,
    ) -> Result<Admission> {
        Self::validate(&input)?;

        if !self.staff.has_role(nurse_id, StaffRole::Nurse).await? {
            return Err(HimsError::NotFound(format!(
                "staff {} not found or not a nurse",
                nurse_id
            )));
        }

        // 同一住院记录的追加互相串行，保证插入顺序即时间顺序；
        // 不与床位锁交互，不同记录的追加互不阻塞
        let _guard = self
            .locks
            .acquire(&[LockKey::Admission(admission_id)])
            .await?;

        let entry = VitalsEntry {
            timestamp: Utc::now(),
            recorded_by_nurse_id: nurse_id,
            blood_pressure: input.blood_pressure,
            temperature: input.temperature,
            pulse: input.pulse,
            respiratory_rate: input.respiratory_rate,
            oxygen_saturation: input.oxygen_saturation,
            weight: input.weight,
            notes: input.notes,
        };

        let updated = match self.admissions.append_vitals(admission_id, entry).await {
            Ok(updated) => updated,
            Err(HimsError::Conflict(_)) => {
                return Err(HimsError::AdmissionClosed { admission_id })
            }
            Err(e) => return Err(e),
        };

        info!(
            "Recorded vitals #{} for admission {} by nurse {}",
            updated.vitals_history.len(),
            admission_id,
            nurse_id
        );
        Ok(updated)
    }

    /// 良构性校验：血压为"收缩压/舒张压"两个正整数，其余数值
    /// 有限且为正，血氧在 (0, 100] 区间
    fn validate(input: &VitalsInput) -> Result<()> {
        Self::parse_blood_pressure(&input.blood_pressure)?;

        if !input.temperature.is_finite() || input.temperature <= 0.0 {
            return Err(HimsError::Validation(format!(
                "temperature must be a positive number, got {}",
                input.temperature
            )));
        }
        if input.pulse == 0 || input.pulse > MAX_COUNT_PER_MINUTE {
            return Err(HimsError::Validation(format!(
                "pulse must be in 1..={}, got {}",
                MAX_COUNT_PER_MINUTE, input.pulse
            )));
        }
        if input.respiratory_rate == 0 || input.respiratory_rate > MAX_COUNT_PER_MINUTE {
            return Err(HimsError::Validation(format!(
                "respiratory_rate must be in 1..={}, got {}",
                MAX_COUNT_PER_MINUTE, input.respiratory_rate
            )));
        }
        if !input.oxygen_saturation.is_finite()
            || input.oxygen_saturation <= 0.0
            || input.oxygen_saturation > 100.0
        {
            return Err(HimsError::Validation(format!(
                "oxygen_saturation must be in (0, 100], got {}",
                input.oxygen_saturation
            )));
        }
        if let Some(weight) = input.weight {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(HimsError::Validation(format!(
                    "weight must be a positive number, got {}",
                    weight
                )));
            }
        }
        Ok(())
    }

    /// 解析血压字段，返回 (收缩压, 舒张压)
    fn parse_blood_pressure(value: &str) -> Result<(u32, u32)> {
        let invalid = || {
            HimsError::Validation(format!(
                "blood_pressure must be \"systolic/diastolic\", got {:?}",
                value
            ))
        };

        let (systolic, diastolic) = value.split_once('/').ok_or_else(invalid)?;
        let systolic: u32 = systolic.trim().parse().map_err(|_| invalid())?;
        let diastolic: u32 = diastolic.trim().parse().map_err(|_| invalid())?;
        if systolic == 0 || diastolic == 0 {
            return Err(invalid());
        }
        Ok((systolic, diastolic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hims_core::AdmissionType;
    use hims_integration::InMemoryStaffDirectory;
    use hims_registry::{MemoryAdmissionLedger, NewAdmission};
    use std::time::Duration;

    struct TestContext {
        recorder: VitalsRecorder,
        admissions: Arc<MemoryAdmissionLedger>,
        nurse: Uuid,
    }

    async fn setup() -> TestContext {
        let admissions = Arc::new(MemoryAdmissionLedger::new());
        let staff = Arc::new(InMemoryStaffDirectory::new());
        let nurse = Uuid::new_v4();
        staff.register(nurse, StaffRole::Nurse).await;

        let recorder = VitalsRecorder::new(
            admissions.clone(),
            staff,
            Arc::new(LockManager::new(Duration::from_secs(1))),
        );
        TestContext {
            recorder,
            admissions,
            nurse,
        }
    }

    async fn active_admission(ctx: &TestContext) -> Admission {
        ctx.admissions
            .create_admission(NewAdmission {
                patient_id: Uuid::new_v4(),
                bed_id: Uuid::new_v4(),
                admitting_doctor_id: Uuid::new_v4(),
                assigned_nurse_id: Some(ctx.nurse),
                admission_type: AdmissionType::Scheduled,
                reason_for_admission: "肺部感染".to_string(),
                provisional_diagnosis: "社区获得性肺炎".to_string(),
                treatment_plan: "抗感染治疗".to_string(),
                admission_date: Utc::now(),
            })
            .await
            .unwrap()
    }

    fn sample_input() -> VitalsInput {
        VitalsInput {
            blood_pressure: "120/80".to_string(),
            temperature: 36.8,
            pulse: 72,
            respiratory_rate: 16,
            oxygen_saturation: 98.0,
            weight: Some(65.5),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_record_vitals_appends_in_order() {
        let ctx = setup().await;
        let admission = active_admission(&ctx).await;

        for i in 0..4 {
            let mut input = sample_input();
            input.pulse = 70 + i;
            ctx.recorder
                .record_vitals(admission.id, ctx.nurse, input)
                .await
                .unwrap();
        }

        let current = ctx.admissions.get_admission(admission.id).await.unwrap();
        assert_eq!(current.vitals_history.len(), 4);
        let pulses: Vec<u32> = current.vitals_history.iter().map(|v| v.pulse).collect();
        assert_eq!(pulses, vec![70, 71, 72, 73]);
        assert!(current
            .vitals_history
            .iter()
            .all(|v| v.recorded_by_nurse_id == ctx.nurse));
    }

    #[tokio::test]
    async fn test_record_vitals_on_discharged_admission_fails() {
        let ctx = setup().await;
        let admission = active_admission(&ctx).await;
        ctx.recorder
            .record_vitals(admission.id, ctx.nurse, sample_input())
            .await
            .unwrap();

        ctx.admissions
            .close_admission(admission.id, Utc::now())
            .await
            .unwrap();

        let result = ctx
            .recorder
            .record_vitals(admission.id, ctx.nurse, sample_input())
            .await;
        assert!(matches!(result, Err(HimsError::AdmissionClosed { .. })));

        // 历史保持不变
        let closed = ctx.admissions.get_admission(admission.id).await.unwrap();
        assert_eq!(closed.vitals_history.len(), 1);
    }

    #[tokio::test]
    async fn test_record_vitals_rejects_unknown_nurse() {
        let ctx = setup().await;
        let admission = active_admission(&ctx).await;

        let result = ctx
            .recorder
            .record_vitals(admission.id, Uuid::new_v4(), sample_input())
            .await;
        assert!(matches!(result, Err(HimsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_validate_rejects_malformed_input() {
        let cases = [
            VitalsInput {
                blood_pressure: "120".to_string(),
                ..sample_input()
            },
            VitalsInput {
                blood_pressure: "abc/80".to_string(),
                ..sample_input()
            },
            VitalsInput {
                blood_pressure: "0/80".to_string(),
                ..sample_input()
            },
            VitalsInput {
                temperature: f64::NAN,
                ..sample_input()
            },
            VitalsInput {
                pulse: 0,
                ..sample_input()
            },
            VitalsInput {
                pulse: u32::MAX,
                ..sample_input()
            },
            VitalsInput {
                respiratory_rate: MAX_COUNT_PER_MINUTE + 1,
                ..sample_input()
            },
            VitalsInput {
                oxygen_saturation: 120.0,
                ..sample_input()
            },
            VitalsInput {
                weight: Some(-1.0),
                ..sample_input()
            },
        ];

        for input in cases {
            assert!(
                matches!(VitalsRecorder::validate(&input), Err(HimsError::Validation(_))),
                "input should be rejected: {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_blood_pressure() {
        assert_eq!(
            VitalsRecorder::parse_blood_pressure("120/80").unwrap(),
            (120, 80)
        );
        assert_eq!(
            VitalsRecorder::parse_blood_pressure(" 135 / 85 ").unwrap(),
            (135, 85)
        );
        assert!(VitalsRecorder::parse_blood_pressure("120-80").is_err());
    }
}
