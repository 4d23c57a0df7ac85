//! 数据库模型

use chrono::{DateTime, Utc};
use hims_core::models::*;
use sqlx::FromRow;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库床位表
#[derive(Debug, FromRow)]
pub struct DbBed {
    pub id: Uuid,
    pub bed_number: String,
    pub ward_number: String,
    pub floor: i32,
    pub bed_type: String, // 存储为字符串，转换为BedType枚举
    pub daily_charge: f64,
    pub status: String, // 存储为字符串，转换为BedStatus枚举
    pub current_admission_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbBed> for Bed {
    fn from(db_bed: DbBed) -> Self {
        Bed {
            id: db_bed.id,
            bed_number: db_bed.bed_number,
            ward_number: db_bed.ward_number,
            floor: db_bed.floor,
            bed_type: bed_type_from_str(&db_bed.bed_type),
            daily_charge: db_bed.daily_charge,
            status: bed_status_from_str(&db_bed.status),
            current_admission_id: db_bed.current_admission_id,
            created_at: db_bed.created_at,
            updated_at: db_bed.updated_at,
        }
    }
}

/// 数据库住院记录表（体征历史另表存储，读取时组装）
#[derive(Debug, FromRow)]
pub struct DbAdmission {
    pub id: Uuid,
    pub admission_number: String,
    pub patient_id: Uuid,
    pub bed_id: Uuid,
    pub admitting_doctor_id: Uuid,
    pub assigned_nurse_id: Option<Uuid>,
    pub admission_type: String,
    pub reason_for_admission: String,
    pub provisional_diagnosis: String,
    pub treatment_plan: String,
    pub admission_date: DateTime<Utc>,
    pub discharge_date: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbAdmission {
    /// 组装为领域模型
    pub fn into_admission(self, vitals_history: Vec<VitalsEntry>) -> Admission {
        Admission {
            id: self.id,
            admission_number: self.admission_number,
            patient_id: self.patient_id,
            bed_id: self.bed_id,
            admitting_doctor_id: self.admitting_doctor_id,
            assigned_nurse_id: self.assigned_nurse_id,
            admission_type: admission_type_from_str(&self.admission_type),
            reason_for_admission: self.reason_for_admission,
            provisional_diagnosis: self.provisional_diagnosis,
            treatment_plan: self.treatment_plan,
            admission_date: self.admission_date,
            discharge_date: self.discharge_date,
            status: admission_status_from_str(&self.status),
            vitals_history,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 数据库体征条目表
#[derive(Debug, FromRow)]
pub struct DbVitalsEntry {
    pub timestamp: DateTime<Utc>,
    pub recorded_by_nurse_id: Uuid,
    pub blood_pressure: String,
    pub temperature: f64,
    pub pulse: i32,
    pub respiratory_rate: i32,
    pub oxygen_saturation: f64,
    pub weight: Option<f64>,
    pub notes: Option<String>,
}

impl From<DbVitalsEntry> for VitalsEntry {
    fn from(db_entry: DbVitalsEntry) -> Self {
        VitalsEntry {
            timestamp: db_entry.timestamp,
            recorded_by_nurse_id: db_entry.recorded_by_nurse_id,
            blood_pressure: db_entry.blood_pressure,
            temperature: db_entry.temperature,
            pulse: db_entry.pulse.max(0) as u32,
            respiratory_rate: db_entry.respiratory_rate.max(0) as u32,
            oxygen_saturation: db_entry.oxygen_saturation,
            weight: db_entry.weight,
            notes: db_entry.notes,
        }
    }
}

// 枚举与存储字符串的转换

pub fn bed_status_as_str(status: BedStatus) -> &'static str {
    match status {
        BedStatus::Vacant => "vacant",
        BedStatus::Occupied => "occupied",
        BedStatus::Maintenance => "maintenance",
        BedStatus::Reserved => "reserved",
    }
}

pub fn bed_status_from_str(value: &str) -> BedStatus {
    match value {
        "vacant" => BedStatus::Vacant,
        "occupied" => BedStatus::Occupied,
        "maintenance" => BedStatus::Maintenance,
        "reserved" => BedStatus::Reserved,
        other => {
            // 行内容损坏时不中断读取，但要留下痕迹
            tracing::warn!("Unrecognized bed status '{}', treating as vacant", other);
            BedStatus::Vacant
        }
    }
}

pub fn bed_type_as_str(bed_type: BedType) -> &'static str {
    match bed_type {
        BedType::General => "general",
        BedType::SemiPrivate => "semi_private",
        BedType::Private => "private",
        BedType::Icu => "icu",
        BedType::Emergency => "emergency",
    }
}

pub fn bed_type_from_str(value: &str) -> BedType {
    match value {
        "semi_private" => BedType::SemiPrivate,
        "private" => BedType::Private,
        "icu" => BedType::Icu,
        "emergency" => BedType::Emergency,
        _ => BedType::General, // 默认类型
    }
}

pub fn admission_type_as_str(admission_type: AdmissionType) -> &'static str {
    match admission_type {
        AdmissionType::Scheduled => "scheduled",
        AdmissionType::Emergency => "emergency",
        AdmissionType::Transfer => "transfer",
    }
}

pub fn admission_type_from_str(value: &str) -> AdmissionType {
    match value {
        "emergency" => AdmissionType::Emergency,
        "transfer" => AdmissionType::Transfer,
        _ => AdmissionType::Scheduled, // 默认类型
    }
}

pub fn admission_status_as_str(status: AdmissionStatus) -> &'static str {
    match status {
        AdmissionStatus::Active => "active",
        AdmissionStatus::Discharged => "discharged",
    }
}

pub fn admission_status_from_str(value: &str) -> AdmissionStatus {
    match value {
        "active" => AdmissionStatus::Active,
        "discharged" => AdmissionStatus::Discharged,
        other => {
            tracing::warn!(
                "Unrecognized admission status '{}', treating as active",
                other
            );
            AdmissionStatus::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_falls_back() {
        assert_eq!(bed_status_from_str("corrupted"), BedStatus::Vacant);
        assert_eq!(admission_status_from_str("corrupted"), AdmissionStatus::Active);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            BedStatus::Vacant,
            BedStatus::Occupied,
            BedStatus::Maintenance,
            BedStatus::Reserved,
        ] {
            assert_eq!(bed_status_from_str(bed_status_as_str(status)), status);
        }
        for status in [AdmissionStatus::Active, AdmissionStatus::Discharged] {
            assert_eq!(
                admission_status_from_str(admission_status_as_str(status)),
                status
            );
        }
    }
}
