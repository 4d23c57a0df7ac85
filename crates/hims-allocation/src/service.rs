//! 分配服务
//!
//! 床位与住院状态变更的唯一入口。每个写操作在对应的锁集合内
//! 执行"先校验、后写入"的短事务：要么登记处与台账同时反映新
//! 状态，要么通过补偿回滚恢复原状，绝不留下半写状态。
//! 登记处/台账抛出的 `Conflict` 一律在本层翻译为具体错误，
//! 不向调用方泄漏。

use chrono::{DateTime, Utc};
use hims_core::{
    utils::is_blank, Admission, AdmitRequest, Bed, BedFilter, HimsError, Result,
};
use hims_integration::{
    BillingNotifier, DischargeNotice, PatientDirectory, StaffDirectory, StaffRole,
};
use hims_registry::{AdmissionStore, BedStore, NewAdmission};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::locks::{LockGuard, LockKey, LockManager};
use crate::state_machine::{BedEvent, BedStateMachine};

// 住院记录在读快照与加锁之间被转床时的重试上限
const LOCK_SNAPSHOT_RETRIES: usize = 3;

/// 分配服务
pub struct AllocationService {
    beds: Arc<dyn BedStore>,
    admissions: Arc<dyn AdmissionStore>,
    locks: Arc<LockManager>,
    state_machine: BedStateMachine,
    patients: Arc<dyn PatientDirectory>,
    staff: Arc<dyn StaffDirectory>,
    billing: Option<Arc<BillingNotifier>>,
}

impl AllocationService {
    /// 创建分配服务
    pub fn new(
        beds: Arc<dyn BedStore>,
        admissions: Arc<dyn AdmissionStore>,
        locks: Arc<LockManager>,
        patients: Arc<dyn PatientDirectory>,
        staff: Arc<dyn StaffDirectory>,
        billing: Option<Arc<BillingNotifier>>,
    ) -> Self {
        Self {
            beds,
            admissions,
            locks,
            state_machine: BedStateMachine::new(),
            patients,
            staff,
            billing,
        }
    }

    /// 入院：为患者分配一张空闲床位并建立在院记录
    pub async fn admit_patient(&self, request: AdmitRequest) -> Result<Admission> {
        // 写入前完成全部校验
        Self::validate_admit_request(&request)?;
        self.verify_patient(request.patient_id).await?;
        self.verify_staff(request.admitting_doctor_id, StaffRole::Doctor)
            .await?;
        if let Some(nurse_id) = request.assigned_nurse_id {
            self.verify_staff(nurse_id, StaffRole::Nurse).await?;
        }

        let _guard = self
            .locks
            .acquire(&[
                LockKey::Bed(request.bed_id),
                LockKey::Patient(request.patient_id),
            ])
            .await?;

        let bed = self.beds.get_bed(request.bed_id).await?;
        if !self.state_machine.can_transition(bed.status, BedEvent::Admit) {
            return Err(HimsError::BedUnavailable {
                bed_id: bed.id,
                reason: format!("bed is {}", bed.status),
            });
        }

        if let Some(active) = self
            .admissions
            .get_active_admission_by_patient(request.patient_id)
            .await?
        {
            return Err(HimsError::AlreadyAdmitted {
                patient_id: request.patient_id,
                admission_id: active.id,
            });
        }

        let admission = match self
            .admissions
            .create_admission(NewAdmission {
                patient_id: request.patient_id,
                bed_id: request.bed_id,
                admitting_doctor_id: request.admitting_doctor_id,
                assigned_nurse_id: request.assigned_nurse_id,
                admission_type: request.admission_type,
                reason_for_admission: request.reason_for_admission,
                provisional_diagnosis: request.provisional_diagnosis,
                treatment_plan: request.treatment_plan,
                admission_date: Utc::now(),
            })
            .await
        {
            Ok(admission) => admission,
            Err(HimsError::Conflict(_)) => {
                return Err(self.translate_patient_conflict(request.patient_id).await);
            }
            Err(e) => return Err(e),
        };

        if let Err(occupy_err) = self.beds.mark_occupied(request.bed_id, admission.id).await {
            // 占床失败，撤销刚建立的在院记录
            warn!(
                "Bed {} occupation failed for admission {}, rolling back: {}",
                request.bed_id, admission.id, occupy_err
            );
            if let Err(rollback_err) = self.admissions.remove_admission(admission.id).await {
                error!(
                    "Rollback of admission {} failed after bed conflict: {} (original: {})",
                    admission.id, rollback_err, occupy_err
                );
                return Err(HimsError::InternalInconsistency(format!(
                    "admission {} persisted without bed {}: rollback failed: {}",
                    admission.id, request.bed_id, rollback_err
                )));
            }
            return Err(match occupy_err {
                HimsError::Conflict(reason) => HimsError::BedUnavailable {
                    bed_id: request.bed_id,
                    reason,
                },
                other => other,
            });
        }

        info!(
            "Admitted patient {} to bed {} (admission {})",
            request.patient_id, request.bed_id, admission.id
        );
        Ok(admission)
    }

    /// 出院：关闭在院记录并释放其床位
    pub async fn discharge_patient(
        &self,
        admission_id: Uuid,
        discharge_date: DateTime<Utc>,
    ) -> Result<Admission> {
        let (_guard, admission) = self.lock_for_admission(admission_id, &[]).await?;

        if !admission.is_active() {
            return Err(HimsError::AlreadyDischarged { admission_id });
        }

        // 出账通知需要床位费率，在写入前取床位快照
        let bed = self.beds.get_bed(admission.bed_id).await?;

        let closed = match self
            .admissions
            .close_admission(admission_id, discharge_date)
            .await
        {
            Ok(closed) => closed,
            Err(HimsError::Conflict(_)) => {
                return Err(HimsError::AlreadyDischarged { admission_id })
            }
            Err(e) => return Err(e),
        };

        if let Err(release_err) = self.beds.mark_vacant(admission.bed_id, admission_id).await {
            // 床位占用与本住院记录不一致，撤销关闭
            error!(
                "Bed {} release failed for admission {}: {}",
                admission.bed_id, admission_id, release_err
            );
            if let Err(rollback_err) = self.admissions.reopen_admission(admission_id).await {
                error!(
                    "Rollback (reopen) of admission {} failed: {} (original: {})",
                    admission_id, rollback_err, release_err
                );
                return Err(HimsError::InternalInconsistency(format!(
                    "admission {} closed but bed {} not released: rollback failed: {}",
                    admission_id, admission.bed_id, rollback_err
                )));
            }
            return Err(HimsError::Internal(format!(
                "bed {} occupancy does not match admission {}: {}",
                admission.bed_id, admission_id, release_err
            )));
        }

        // 尽力而为的计费通知，不影响出院结果
        if let Some(billing) = &self.billing {
            billing.notify_discharge(DischargeNotice {
                admission_id: closed.id,
                bed_id: bed.id,
                daily_charge: bed.daily_charge,
                admission_date: closed.admission_date,
                discharge_date,
            });
        }

        info!(
            "Discharged admission {} (patient {}, bed {} released)",
            admission_id, closed.patient_id, admission.bed_id
        );
        Ok(closed)
    }

    /// 转床：同一在院记录换到另一张空闲床位，旧床释放与新床占用
    /// 作为一个事务完成，新床不可用则整体失败
    pub async fn transfer_bed(&self, admission_id: Uuid, new_bed_id: Uuid) -> Result<Admission> {
        let (_guard, admission) = self
            .lock_for_admission(admission_id, &[LockKey::Bed(new_bed_id)])
            .await?;

        if !admission.is_active() {
            return Err(HimsError::AdmissionClosed { admission_id });
        }
        let old_bed_id = admission.bed_id;
        if old_bed_id == new_bed_id {
            return Err(HimsError::Validation(format!(
                "admission {} already occupies bed {}",
                admission_id, new_bed_id
            )));
        }

        let new_bed = self.beds.get_bed(new_bed_id).await?;
        if !self
            .state_machine
            .can_transition(new_bed.status, BedEvent::Admit)
        {
            return Err(HimsError::BedUnavailable {
                bed_id: new_bed_id,
                reason: format!("bed is {}", new_bed.status),
            });
        }

        if let Err(e) = self.beds.mark_occupied(new_bed_id, admission_id).await {
            return Err(match e {
                HimsError::Conflict(reason) => HimsError::BedUnavailable {
                    bed_id: new_bed_id,
                    reason,
                },
                other => other,
            });
        }

        let moved = match self.admissions.set_bed(admission_id, new_bed_id).await {
            Ok(moved) => moved,
            Err(set_err) => {
                warn!(
                    "Bed swap on admission {} failed, rolling back new bed {}: {}",
                    admission_id, new_bed_id, set_err
                );
                if let Err(rollback_err) =
                    self.beds.mark_vacant(new_bed_id, admission_id).await
                {
                    error!(
                        "Rollback of new bed {} failed: {} (original: {})",
                        new_bed_id, rollback_err, set_err
                    );
                    return Err(HimsError::InternalInconsistency(format!(
                        "new bed {} occupied without admission link: rollback failed: {}",
                        new_bed_id, rollback_err
                    )));
                }
                return Err(match set_err {
                    HimsError::Conflict(_) => HimsError::AdmissionClosed { admission_id },
                    other => other,
                });
            }
        };

        if let Err(release_err) = self.beds.mark_vacant(old_bed_id, admission_id).await {
            // 旧床释放失败，撤销床位互换
            error!(
                "Old bed {} release failed during transfer of admission {}: {}",
                old_bed_id, admission_id, release_err
            );
            let swap_back = self.admissions.set_bed(admission_id, old_bed_id).await;
            let free_new = self.beds.mark_vacant(new_bed_id, admission_id).await;
            if swap_back.is_err() || free_new.is_err() {
                error!(
                    "Rollback of transfer {} failed (swap_back: {:?}, free_new: {:?})",
                    admission_id,
                    swap_back.err(),
                    free_new.err()
                );
                return Err(HimsError::InternalInconsistency(format!(
                    "transfer of admission {} left beds {} and {} inconsistent",
                    admission_id, old_bed_id, new_bed_id
                )));
            }
            return Err(HimsError::Internal(format!(
                "bed {} occupancy does not match admission {}: {}",
                old_bed_id, admission_id, release_err
            )));
        }

        info!(
            "Transferred admission {} from bed {} to bed {}",
            admission_id, old_bed_id, new_bed_id
        );
        Ok(moved)
    }

    /// 床位转入维护
    pub async fn set_bed_maintenance(&self, bed_id: Uuid) -> Result<Bed> {
        self.set_bed_side_state(bed_id, BedEvent::StartMaintenance)
            .await
    }

    /// 床位转入预留
    pub async fn set_bed_reserved(&self, bed_id: Uuid) -> Result<Bed> {
        self.set_bed_side_state(bed_id, BedEvent::Reserve).await
    }

    /// 床位维护/预留结束，回到空闲
    pub async fn return_bed_to_service(&self, bed_id: Uuid) -> Result<Bed> {
        self.set_bed_side_state(bed_id, BedEvent::ReturnToService)
            .await
    }

    /// 按id查询床位（无锁读）
    pub async fn get_bed(&self, bed_id: Uuid) -> Result<Bed> {
        self.beds.get_bed(bed_id).await
    }

    /// 查询空闲床位（无锁读，结果仅供参考）
    pub async fn list_available_beds(&self, filter: &BedFilter) -> Result<Vec<Bed>> {
        self.beds.list_available_beds(filter).await
    }

    /// 按id查询住院记录（无锁读）
    pub async fn get_admission(&self, admission_id: Uuid) -> Result<Admission> {
        self.admissions.get_admission(admission_id).await
    }

    /// 查询患者当前在院记录（无锁读）
    pub async fn get_active_admission_by_patient(&self, patient_id: Uuid) -> Result<Admission> {
        self.admissions
            .get_active_admission_by_patient(patient_id)
            .await?
            .ok_or_else(|| {
                HimsError::NotFound(format!("patient {} has no active admission", patient_id))
            })
    }

    /// 患者住院史（无锁读）
    pub async fn list_admissions_by_patient(&self, patient_id: Uuid) -> Result<Vec<Admission>> {
        self.admissions.list_admissions_by_patient(patient_id).await
    }

    fn validate_admit_request(request: &AdmitRequest) -> Result<()> {
        if is_blank(&request.reason_for_admission) {
            return Err(HimsError::Validation(
                "reason_for_admission is required".to_string(),
            ));
        }
        if is_blank(&request.provisional_diagnosis) {
            return Err(HimsError::Validation(
                "provisional_diagnosis is required".to_string(),
            ));
        }
        if is_blank(&request.treatment_plan) {
            return Err(HimsError::Validation(
                "treatment_plan is required".to_string(),
            ));
        }
        Ok(())
    }

    async fn verify_patient(&self, patient_id: Uuid) -> Result<()> {
        if self.patients.patient_exists(patient_id).await? {
            Ok(())
        } else {
            Err(HimsError::NotFound(format!(
                "patient {} not found in directory",
                patient_id
            )))
        }
    }

    async fn verify_staff(&self, staff_id: Uuid, role: StaffRole) -> Result<()> {
        if self.staff.has_role(staff_id, role).await? {
            Ok(())
        } else {
            Err(HimsError::NotFound(format!(
                "staff {} not found or not a {}",
                staff_id,
                role.as_str()
            )))
        }
    }

    /// 建档冲突时重查在院记录，翻译为 `AlreadyAdmitted`
    async fn translate_patient_conflict(&self, patient_id: Uuid) -> HimsError {
        match self
            .admissions
            .get_active_admission_by_patient(patient_id)
            .await
        {
            Ok(Some(active)) => HimsError::AlreadyAdmitted {
                patient_id,
                admission_id: active.id,
            },
            _ => HimsError::Internal(format!(
                "admission creation conflicted for patient {} without active record",
                patient_id
            )),
        }
    }

    /// 锁定一条住院记录涉及的床位与患者。读快照与加锁之间记录
    /// 可能被转床，此时所持床位锁已失效，换新床位重试
    async fn lock_for_admission(
        &self,
        admission_id: Uuid,
        extra_keys: &[LockKey],
    ) -> Result<(LockGuard, Admission)> {
        for _ in 0..LOCK_SNAPSHOT_RETRIES {
            let snapshot = self.admissions.get_admission(admission_id).await?;

            let mut keys = vec![
                LockKey::Bed(snapshot.bed_id),
                LockKey::Patient(snapshot.patient_id),
            ];
            keys.extend_from_slice(extra_keys);
            let guard = self.locks.acquire(&keys).await?;

            let current = self.admissions.get_admission(admission_id).await?;
            if current.bed_id == snapshot.bed_id {
                return Ok((guard, current));
            }
            warn!(
                "Admission {} moved from bed {} to {} while locking, retrying",
                admission_id, snapshot.bed_id, current.bed_id
            );
        }
        Err(HimsError::ResourceBusy(format!(
            "admission {} kept moving between beds",
            admission_id
        )))
    }

    async fn set_bed_side_state(&self, bed_id: Uuid, event: BedEvent) -> Result<Bed> {
        let _guard = self.locks.acquire(&[LockKey::Bed(bed_id)]).await?;

        let bed = self.beds.get_bed(bed_id).await?;
        if !self.state_machine.can_transition(bed.status, event) {
            return Err(HimsError::BedUnavailable {
                bed_id,
                reason: format!("bed is {}, cannot apply {:?}", bed.status, event),
            });
        }

        let result = match event {
            BedEvent::StartMaintenance => self.beds.set_maintenance(bed_id).await,
            BedEvent::Reserve => self.beds.set_reserved(bed_id).await,
            BedEvent::ReturnToService => self.beds.return_to_service(bed_id).await,
            _ => Err(HimsError::InvalidStateTransition {
                from: bed.status.to_string(),
                event: format!("{:?}", event),
            }),
        };

        result.map_err(|e| match e {
            HimsError::Conflict(reason) => HimsError::BedUnavailable { bed_id, reason },
            other => other,
        })
    }
}
