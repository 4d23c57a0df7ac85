//! 责任医护分配
//!
//! 维护在院记录的责任医生与责任护士。医生在入院时确定，可经
//! 显式操作转移；护士可在院期间随时改派。只作用于 Active 的
//! 住院记录，不触碰床位登记处。

use hims_core::{Admission, HimsError, Result};
use hims_integration::{StaffDirectory, StaffRole};
use hims_registry::AdmissionStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::locks::{LockKey, LockManager};

/// 责任医护分配服务
pub struct CareTeamService {
    admissions: Arc<dyn AdmissionStore>,
    staff: Arc<dyn StaffDirectory>,
    locks: Arc<LockManager>,
}

impl CareTeamService {
    /// 创建医护指派服务
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

    /// 转移责任医生
    pub async fn assign_doctor(&self, admission_id: Uuid, doctor_id: Uuid) -> Result<Admission> {
        self.assign(admission_id, Some(doctor_id), None, StaffRole::Doctor, doctor_id)
            .await
    }

    /// 改派责任护士
    pub async fn assign_nurse(&self, admission_id: Uuid, nurse_id: Uuid) -> Result<Admission> {
        self.assign(admission_id, None, Some(nurse_id), StaffRole::Nurse, nurse_id)
            .await
    }

    async fn assign(
        &self,
        admission_id: Uuid,
        doctor_id: Option<Uuid>,
        nurse_id: Option<Uuid>,
        role: StaffRole,
        staff_id: Uuid,
    ) -> Result<Admission> {
        if !self.staff.has_role(staff_id, role).await? {
            return Err(HimsError::NotFound(format!(
                "staff {} not found or not a {}",
                staff_id,
                role.as_str()
            )));
        }

        // 同一住院记录上的改派互相串行
        let _guard = self
            .locks
            .acquire(&[LockKey::Admission(admission_id)])
            .await?;

        let updated = match self
            .admissions
            .update_care_team(admission_id, doctor_id, nurse_id)
            .await
        {
            Ok(updated) => updated,
            Err(HimsError::Conflict(_)) => {
                return Err(HimsError::AdmissionClosed { admission_id })
            }
            Err(e) => return Err(e),
        };

        info!(
            "Assigned {} {} to admission {}",
            role.as_str(),
            staff_id,
            admission_id
        );
        Ok(updated)
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
        care_team: CareTeamService,
        admissions: Arc<MemoryAdmissionLedger>,
        staff: Arc<InMemoryStaffDirectory>,
    }

    fn setup() -> TestContext {
        let admissions = Arc::new(MemoryAdmissionLedger::new());
        let staff = Arc::new(InMemoryStaffDirectory::new());
        let care_team = CareTeamService::new(
            admissions.clone(),
            staff.clone(),
            Arc::new(LockManager::new(Duration::from_secs(1))),
        );
        TestContext {
            care_team,
            admissions,
            staff,
        }
    }

    async fn active_admission(ctx: &TestContext) -> Admission {
        ctx.admissions
            .create_admission(NewAdmission {
                patient_id: Uuid::new_v4(),
                bed_id: Uuid::new_v4(),
                admitting_doctor_id: Uuid::new_v4(),
                assigned_nurse_id: None,
                admission_type: AdmissionType::Emergency,
                reason_for_admission: "车祸外伤".to_string(),
                provisional_diagnosis: "多发性骨折".to_string(),
                treatment_plan: "急诊手术".to_string(),
                admission_date: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_assign_doctor_and_nurse() {
        let ctx = setup();
        let admission = active_admission(&ctx).await;

        let doctor = Uuid::new_v4();
        let nurse = Uuid::new_v4();
        ctx.staff.register(doctor, StaffRole::Doctor).await;
        ctx.staff.register(nurse, StaffRole::Nurse).await;

        let updated = ctx.care_team.assign_doctor(admission.id, doctor).await.unwrap();
        assert_eq!(updated.admitting_doctor_id, doctor);

        let updated = ctx.care_team.assign_nurse(admission.id, nurse).await.unwrap();
        assert_eq!(updated.assigned_nurse_id, Some(nurse));
        // 医生改派不影响护士，反之亦然
        assert_eq!(updated.admitting_doctor_id, doctor);
    }

    #[tokio::test]
    async fn test_assign_rejects_wrong_role() {
        let ctx = setup();
        let admission = active_admission(&ctx).await;

        let nurse = Uuid::new_v4();
        ctx.staff.register(nurse, StaffRole::Nurse).await;

        let result = ctx.care_team.assign_doctor(admission.id, nurse).await;
        assert!(matches!(result, Err(HimsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_assign_on_discharged_admission_fails() {
        let ctx = setup();
        let admission = active_admission(&ctx).await;
        ctx.admissions
            .close_admission(admission.id, Utc::now())
            .await
            .unwrap();

        let doctor = Uuid::new_v4();
        ctx.staff.register(doctor, StaffRole::Doctor).await;

        let result = ctx.care_team.assign_doctor(admission.id, doctor).await;
        assert!(matches!(result, Err(HimsError::AdmissionClosed { .. })));
    }
}
