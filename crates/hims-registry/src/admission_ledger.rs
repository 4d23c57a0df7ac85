//! 住院台账
//!
//! 住院记录的存储与唯一性约束。"每患者至多一条在院记录"由
//! 写锁内的活动索引在建档时强制，而不是依赖读取方自觉。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hims_core::{
    utils::{generate_admission_number, is_blank},
    Admission, AdmissionStatus, HimsError, Result, VitalsEntry,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{AdmissionStore, NewAdmission};

#[derive(Debug, Default)]
struct LedgerState {
    admissions: HashMap<Uuid, Admission>,
    // patient_id -> 在院记录id 的活动索引，与主表同锁维护
    active_by_patient: HashMap<Uuid, Uuid>,
}

/// 内存住院台账
#[derive(Debug, Default)]
pub struct MemoryAdmissionLedger {
    state: RwLock<LedgerState>,
}

impl MemoryAdmissionLedger {
    /// 创建空台账
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
        }
    }

    fn validate(data: &NewAdmission) -> Result<()> {
        if is_blank(&data.reason_for_admission) {
            return Err(HimsError::Validation(
                "reason_for_admission is required".to_string(),
            ));
        }
        if is_blank(&data.provisional_diagnosis) {
            return Err(HimsError::Validation(
                "provisional_diagnosis is required".to_string(),
            ));
        }
        if is_blank(&data.treatment_plan) {
            return Err(HimsError::Validation(
                "treatment_plan is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AdmissionStore for MemoryAdmissionLedger {
    async fn create_admission(&self, data: NewAdmission) -> Result<Admission> {
        Self::validate(&data)?;

        let mut state = self.state.write().await;

        if let Some(active_id) = state.active_by_patient.get(&data.patient_id) {
            return Err(HimsError::Conflict(format!(
                "patient {} already has active admission {}",
                data.patient_id, active_id
            )));
        }

        let now = Utc::now();
        let admission = Admission {
            id: Uuid::new_v4(),
            admission_number: generate_admission_number(),
            patient_id: data.patient_id,
            bed_id: data.bed_id,
            admitting_doctor_id: data.admitting_doctor_id,
            assigned_nurse_id: data.assigned_nurse_id,
            admission_type: data.admission_type,
            reason_for_admission: data.reason_for_admission,
            provisional_diagnosis: data.provisional_diagnosis,
            treatment_plan: data.treatment_plan,
            admission_date: data.admission_date,
            discharge_date: None,
            status: AdmissionStatus::Active,
            vitals_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        state
            .active_by_patient
            .insert(admission.patient_id, admission.id);
        state.admissions.insert(admission.id, admission.clone());

        tracing::info!(
            "Created admission {} for patient {} on bed {}",
            admission.id,
            admission.patient_id,
            admission.bed_id
        );
        Ok(admission)
    }

    async fn get_admission(&self, admission_id: Uuid) -> Result<Admission> {
        let state = self.state.read().await;
        state
            .admissions
            .get(&admission_id)
            .cloned()
            .ok_or_else(|| HimsError::NotFound(format!("Admission {} not found", admission_id)))
    }

    async fn get_active_admission_by_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<Admission>> {
        let state = self.state.read().await;
        Ok(state
            .active_by_patient
            .get(&patient_id)
            .and_then(|id| state.admissions.get(id))
            .cloned())
    }

    async fn list_admissions_by_patient(&self, patient_id: Uuid) -> Result<Vec<Admission>> {
        let state = self.state.read().await;
        let mut history: Vec<Admission> = state
            .admissions
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        history.sort_by_key(|a| a.admission_date);
        Ok(history)
    }

    async fn close_admission(
        &self,
        admission_id: Uuid,
        discharge_date: DateTime<Utc>,
    ) -> Result<Admission> {
        let mut state = self.state.write().await;
        let admission = state
            .admissions
            .get_mut(&admission_id)
            .ok_or_else(|| HimsError::NotFound(format!("Admission {} not found", admission_id)))?;

        if admission.status != AdmissionStatus::Active {
            return Err(HimsError::Conflict(format!(
                "admission {} is already discharged",
                admission_id
            )));
        }

        admission.status = AdmissionStatus::Discharged;
        admission.discharge_date = Some(discharge_date);
        admission.updated_at = Utc::now();
        let closed = admission.clone();

        state.active_by_patient.remove(&closed.patient_id);

        tracing::info!("Closed admission {} for patient {}", admission_id, closed.patient_id);
        Ok(closed)
    }

    async fn append_vitals(&self, admission_id: Uuid, entry: VitalsEntry) -> Result<Admission> {
        let mut state = self.state.write().await;
        let admission = state
            .admissions
            .get_mut(&admission_id)
            .ok_or_else(|| HimsError::NotFound(format!("Admission {} not found", admission_id)))?;

        if admission.status != AdmissionStatus::Active {
            return Err(HimsError::Conflict(format!(
                "admission {} is not active, vitals rejected",
                admission_id
            )));
        }

        admission.vitals_history.push(entry);
        admission.updated_at = Utc::now();

        tracing::debug!(
            "Appended vitals entry #{} to admission {}",
            admission.vitals_history.len(),
            admission_id
        );
        Ok(admission.clone())
    }

    async fn update_care_team(
        &self,
        admission_id: Uuid,
        doctor_id: Option<Uuid>,
        nurse_id: Option<Uuid>,
    ) -> Result<Admission> {
        let mut state = self.state.write().await;
        let admission = state
            .admissions
            .get_mut(&admission_id)
            .ok_or_else(|| HimsError::NotFound(format!("Admission {} not found", admission_id)))?;

        if admission.status != AdmissionStatus::Active {
            return Err(HimsError::Conflict(format!(
                "admission {} is not active, care team is frozen",
                admission_id
            )));
        }

        if let Some(doctor_id) = doctor_id {
            admission.admitting_doctor_id = doctor_id;
        }
        if let Some(nurse_id) = nurse_id {
            admission.assigned_nurse_id = Some(nurse_id);
        }
        admission.updated_at = Utc::now();

        tracing::info!(
            "Updated care team of admission {} (doctor: {:?}, nurse: {:?})",
            admission_id,
            doctor_id,
            nurse_id
        );
        Ok(admission.clone())
    }

    async fn set_bed(&self, admission_id: Uuid, new_bed_id: Uuid) -> Result<Admission> {
        let mut state = self.state.write().await;
        let admission = state
            .admissions
            .get_mut(&admission_id)
            .ok_or_else(|| HimsError::NotFound(format!("Admission {} not found", admission_id)))?;

        if admission.status != AdmissionStatus::Active {
            return Err(HimsError::Conflict(format!(
                "admission {} is not active, bed cannot change",
                admission_id
            )));
        }

        let old_bed_id = admission.bed_id;
        admission.bed_id = new_bed_id;
        admission.updated_at = Utc::now();

        tracing::info!(
            "Admission {} moved from bed {} to bed {}",
            admission_id,
            old_bed_id,
            new_bed_id
        );
        Ok(admission.clone())
    }

    async fn remove_admission(&self, admission_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let admission = state.admissions.remove(&admission_id).ok_or_else(|| {
            HimsError::NotFound(format!("Admission {} not found", admission_id))
        })?;

        if state.active_by_patient.get(&admission.patient_id) == Some(&admission_id) {
            state.active_by_patient.remove(&admission.patient_id);
        }

        tracing::warn!("Rolled back admission {} (compensation)", admission_id);
        Ok(())
    }

    async fn reopen_admission(&self, admission_id: Uuid) -> Result<Admission> {
        let mut state = self.state.write().await;

        // 患者在关闭与回滚之间不应出现新的在院记录，出现则拒绝回滚
        let patient_id = state
            .admissions
            .get(&admission_id)
            .map(|a| a.patient_id)
            .ok_or_else(|| HimsError::NotFound(format!("Admission {} not found", admission_id)))?;
        if let Some(other) = state.active_by_patient.get(&patient_id) {
            if *other != admission_id {
                return Err(HimsError::Conflict(format!(
                    "patient {} acquired active admission {} during rollback",
                    patient_id, other
                )));
            }
        }

        let admission = state
            .admissions
            .get_mut(&admission_id)
            .ok_or_else(|| HimsError::NotFound(format!("Admission {} not found", admission_id)))?;

        if admission.status != AdmissionStatus::Discharged {
            return Err(HimsError::Conflict(format!(
                "admission {} is not discharged, nothing to reopen",
                admission_id
            )));
        }

        admission.status = AdmissionStatus::Active;
        admission.discharge_date = None;
        admission.updated_at = Utc::now();
        let reopened = admission.clone();

        state.active_by_patient.insert(patient_id, admission_id);

        tracing::warn!("Reopened admission {} (compensation)", admission_id);
        Ok(reopened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hims_core::AdmissionType;

    fn sample_admission(patient_id: Uuid, bed_id: Uuid) -> NewAdmission {
        NewAdmission {
            patient_id,
            bed_id,
            admitting_doctor_id: Uuid::new_v4(),
            assigned_nurse_id: None,
            admission_type: AdmissionType::Scheduled,
            reason_for_admission: "腹痛待查".to_string(),
            provisional_diagnosis: "急性阑尾炎".to_string(),
            treatment_plan: "术前检查，择期手术".to_string(),
            admission_date: Utc::now(),
        }
    }

    fn sample_vitals(nurse_id: Uuid) -> VitalsEntry {
        VitalsEntry {
            timestamp: Utc::now(),
            recorded_by_nurse_id: nurse_id,
            blood_pressure: "120/80".to_string(),
            temperature: 36.8,
            pulse: 72,
            respiratory_rate: 16,
            oxygen_saturation: 98.0,
            weight: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_admission_requires_fields() {
        let ledger = MemoryAdmissionLedger::new();
        let mut data = sample_admission(Uuid::new_v4(), Uuid::new_v4());
        data.reason_for_admission = "  ".to_string();

        let result = ledger.create_admission(data).await;
        assert!(matches!(result, Err(HimsError::Validation(_))));
    }

    #[tokio::test]
    async fn test_one_active_admission_per_patient() {
        let ledger = MemoryAdmissionLedger::new();
        let patient = Uuid::new_v4();

        let first = ledger
            .create_admission(sample_admission(patient, Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(first.status, AdmissionStatus::Active);

        let second = ledger
            .create_admission(sample_admission(patient, Uuid::new_v4()))
            .await;
        assert!(matches!(second, Err(HimsError::Conflict(_))));

        // 出院后可以再次建档
        ledger.close_admission(first.id, Utc::now()).await.unwrap();
        let third = ledger
            .create_admission(sample_admission(patient, Uuid::new_v4()))
            .await
            .unwrap();
        assert_ne!(third.id, first.id);
    }

    #[tokio::test]
    async fn test_close_admission_twice_conflicts() {
        let ledger = MemoryAdmissionLedger::new();
        let admission = ledger
            .create_admission(sample_admission(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        let closed = ledger.close_admission(admission.id, Utc::now()).await.unwrap();
        assert_eq!(closed.status, AdmissionStatus::Discharged);
        assert!(closed.discharge_date.is_some());

        let again = ledger.close_admission(admission.id, Utc::now()).await;
        assert!(matches!(again, Err(HimsError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_vitals_append_only_and_ordered() {
        let ledger = MemoryAdmissionLedger::new();
        let admission = ledger
            .create_admission(sample_admission(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
        let nurse = Uuid::new_v4();

        for i in 0..3 {
            let mut entry = sample_vitals(nurse);
            entry.pulse = 70 + i;
            ledger.append_vitals(admission.id, entry).await.unwrap();
        }

        let current = ledger.get_admission(admission.id).await.unwrap();
        assert_eq!(current.vitals_history.len(), 3);
        let pulses: Vec<u32> = current.vitals_history.iter().map(|v| v.pulse).collect();
        assert_eq!(pulses, vec![70, 71, 72]);

        // 出院后拒绝写入，历史保持不变
        ledger.close_admission(admission.id, Utc::now()).await.unwrap();
        let rejected = ledger.append_vitals(admission.id, sample_vitals(nurse)).await;
        assert!(matches!(rejected, Err(HimsError::Conflict(_))));
        let closed = ledger.get_admission(admission.id).await.unwrap();
        assert_eq!(closed.vitals_history.len(), 3);
    }

    #[tokio::test]
    async fn test_update_care_team_only_while_active() {
        let ledger = MemoryAdmissionLedger::new();
        let admission = ledger
            .create_admission(sample_admission(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        let doctor = Uuid::new_v4();
        let nurse = Uuid::new_v4();
        let updated = ledger
            .update_care_team(admission.id, Some(doctor), Some(nurse))
            .await
            .unwrap();
        assert_eq!(updated.admitting_doctor_id, doctor);
        assert_eq!(updated.assigned_nurse_id, Some(nurse));

        ledger.close_admission(admission.id, Utc::now()).await.unwrap();
        let rejected = ledger
            .update_care_team(admission.id, None, Some(Uuid::new_v4()))
            .await;
        assert!(matches!(rejected, Err(HimsError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_remove_admission_clears_active_index() {
        let ledger = MemoryAdmissionLedger::new();
        let patient = Uuid::new_v4();
        let admission = ledger
            .create_admission(sample_admission(patient, Uuid::new_v4()))
            .await
            .unwrap();

        ledger.remove_admission(admission.id).await.unwrap();
        assert!(ledger
            .get_active_admission_by_patient(patient)
            .await
            .unwrap()
            .is_none());

        // 回滚后患者可重新入院
        ledger
            .create_admission(sample_admission(patient, Uuid::new_v4()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reopen_admission_restores_active() {
        let ledger = MemoryAdmissionLedger::new();
        let patient = Uuid::new_v4();
        let admission = ledger
            .create_admission(sample_admission(patient, Uuid::new_v4()))
            .await
            .unwrap();

        ledger.close_admission(admission.id, Utc::now()).await.unwrap();
        let reopened = ledger.reopen_admission(admission.id).await.unwrap();
        assert_eq!(reopened.status, AdmissionStatus::Active);
        assert!(reopened.discharge_date.is_none());

        let active = ledger
            .get_active_admission_by_patient(patient)
            .await
            .unwrap();
        assert_eq!(active.map(|a| a.id), Some(admission.id));
    }

    #[tokio::test]
    async fn test_list_admissions_by_patient_sorted() {
        let ledger = MemoryAdmissionLedger::new();
        let patient = Uuid::new_v4();

        let mut first = sample_admission(patient, Uuid::new_v4());
        first.admission_date = Utc::now() - chrono::Duration::days(10);
        let first = ledger.create_admission(first).await.unwrap();
        ledger.close_admission(first.id, Utc::now()).await.unwrap();

        let second = ledger
            .create_admission(sample_admission(patient, Uuid::new_v4()))
            .await
            .unwrap();

        let history = ledger.list_admissions_by_patient(patient).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[1].id, second.id);
    }
}
