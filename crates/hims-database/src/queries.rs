//! 数据库查询操作
//!
//! 所有状态变更都是带前置条件的单语句更新，受影响行数为0时
//! 再行区分 `NotFound` 与 `Conflict`，与内存实现语义一致。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hims_core::{
    utils::{generate_admission_number, is_blank},
    Admission, Bed, BedFilter, BedStatus, HimsError, NewBed, Result, VitalsEntry,
};
use hims_registry::{AdmissionStore, BedStore, NewAdmission};
use uuid::Uuid;

use crate::connection::DatabasePool;
use crate::models::*;

/// 创建数据库表与索引
pub async fn create_tables(pool: &DatabasePool) -> Result<()> {
    let pool = pool.pool();

    // 创建床位表
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS beds (
            id UUID PRIMARY KEY,
            bed_number VARCHAR(32) NOT NULL,
            ward_number VARCHAR(32) NOT NULL,
            floor INTEGER NOT NULL,
            bed_type VARCHAR(16) NOT NULL,
            daily_charge DOUBLE PRECISION NOT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'vacant',
            current_admission_id UUID,
            created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
            updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
            UNIQUE (ward_number, bed_number)
        )
    "#).execute(pool).await.map_err(|e| HimsError::Database(e.to_string()))?;

    // 创建住院记录表
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS admissions (
            id UUID PRIMARY KEY,
            admission_number VARCHAR(32) NOT NULL,
            patient_id UUID NOT NULL,
            bed_id UUID NOT NULL,
            admitting_doctor_id UUID NOT NULL,
            assigned_nurse_id UUID,
            admission_type VARCHAR(16) NOT NULL,
            reason_for_admission TEXT NOT NULL,
            provisional_diagnosis TEXT NOT NULL,
            treatment_plan TEXT NOT NULL,
            admission_date TIMESTAMP WITH TIME ZONE NOT NULL,
            discharge_date TIMESTAMP WITH TIME ZONE,
            status VARCHAR(16) NOT NULL DEFAULT 'active',
            created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
            updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
        )
    "#).execute(pool).await.map_err(|e| HimsError::Database(e.to_string()))?;

    // 创建体征条目表
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS vitals_entries (
            id BIGSERIAL PRIMARY KEY,
            admission_id UUID NOT NULL REFERENCES admissions(id),
            timestamp TIMESTAMP WITH TIME ZONE NOT NULL,
            recorded_by_nurse_id UUID NOT NULL,
            blood_pressure VARCHAR(16) NOT NULL,
            temperature DOUBLE PRECISION NOT NULL,
            pulse INTEGER NOT NULL,
            respiratory_rate INTEGER NOT NULL,
            oxygen_saturation DOUBLE PRECISION NOT NULL,
            weight DOUBLE PRECISION,
            notes TEXT
        )
    "#).execute(pool).await.map_err(|e| HimsError::Database(e.to_string()))?;

    create_indexes(pool).await?;

    tracing::info!("Database tables created successfully");
    Ok(())
}

/// 创建数据库索引；部分唯一索引在数据库层兜底"每患者/每床位
/// 至多一条在院记录"的不变式
async fn create_indexes(pool: &sqlx::PgPool) -> Result<()> {
    let indexes = vec![
        "CREATE INDEX IF NOT EXISTS idx_beds_status ON beds(status)",
        "CREATE INDEX IF NOT EXISTS idx_beds_ward ON beds(ward_number)",
        "CREATE INDEX IF NOT EXISTS idx_admissions_patient_id ON admissions(patient_id)",
        "CREATE INDEX IF NOT EXISTS idx_admissions_bed_id ON admissions(bed_id)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_admissions_active_patient \
         ON admissions(patient_id) WHERE status = 'active'",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_admissions_active_bed \
         ON admissions(bed_id) WHERE status = 'active'",
        "CREATE INDEX IF NOT EXISTS idx_vitals_admission_id ON vitals_entries(admission_id)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql)
            .execute(pool)
            .await
            .map_err(|e| HimsError::Database(e.to_string()))?;
    }

    tracing::info!("Database indexes created successfully");
    Ok(())
}

// ========== 床位登记处 ==========

/// PostgreSQL床位登记处
pub struct PgBedRegistry {
    pool: DatabasePool,
}

impl PgBedRegistry {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 条件更新失败后区分 NotFound 与 Conflict
    async fn conflict_or_not_found(&self, bed_id: Uuid, expected: &str) -> HimsError {
        match self.get_bed(bed_id).await {
            Ok(bed) => HimsError::Conflict(format!(
                "bed {} is {}, expected {}",
                bed_id, bed.status, expected
            )),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl BedStore for PgBedRegistry {
    async fn register_bed(&self, new_bed: NewBed) -> Result<Bed> {
        if is_blank(&new_bed.bed_number) {
            return Err(HimsError::Validation("bed_number is required".to_string()));
        }
        if is_blank(&new_bed.ward_number) {
            return Err(HimsError::Validation("ward_number is required".to_string()));
        }
        if !new_bed.daily_charge.is_finite() || new_bed.daily_charge < 0.0 {
            return Err(HimsError::Validation(format!(
                "daily_charge must be non-negative, got {}",
                new_bed.daily_charge
            )));
        }

        let id = Uuid::new_v4();
        let affected = sqlx::query(r#"
            INSERT INTO beds (id, bed_number, ward_number, floor, bed_type, daily_charge, status)
            SELECT $1, $2, $3, $4, $5, $6, 'vacant'
            WHERE NOT EXISTS (
                SELECT 1 FROM beds WHERE ward_number = $3 AND bed_number = $2
            )
        "#)
        .bind(id)
        .bind(&new_bed.bed_number)
        .bind(&new_bed.ward_number)
        .bind(new_bed.floor)
        .bind(bed_type_as_str(new_bed.bed_type))
        .bind(new_bed.daily_charge)
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(HimsError::Conflict(format!(
                "bed {} already exists in ward {}",
                new_bed.bed_number, new_bed.ward_number
            )));
        }

        tracing::info!("Registered bed {} ({}/{})", id, new_bed.ward_number, new_bed.bed_number);
        self.get_bed(id).await
    }

    async fn get_bed(&self, bed_id: Uuid) -> Result<Bed> {
        sqlx::query_as::<_, DbBed>("SELECT * FROM beds WHERE id = $1")
            .bind(bed_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| HimsError::Database(e.to_string()))?
            .map(Bed::from)
            .ok_or_else(|| HimsError::NotFound(format!("Bed {} not found", bed_id)))
    }

    async fn list_available_beds(&self, filter: &BedFilter) -> Result<Vec<Bed>> {
        let results = sqlx::query_as::<_, DbBed>(r#"
            SELECT * FROM beds
            WHERE status = 'vacant'
              AND ($1::varchar IS NULL OR bed_type = $1)
              AND ($2::integer IS NULL OR floor = $2)
            ORDER BY ward_number, bed_number
        "#)
        .bind(filter.bed_type.map(bed_type_as_str))
        .bind(filter.floor)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Bed::from).collect())
    }

    async fn mark_occupied(&self, bed_id: Uuid, admission_id: Uuid) -> Result<Bed> {
        let affected = sqlx::query(r#"
            UPDATE beds
            SET status = 'occupied', current_admission_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'vacant'
        "#)
        .bind(bed_id)
        .bind(admission_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(self.conflict_or_not_found(bed_id, "vacant").await);
        }

        tracing::info!("Bed {} marked occupied by admission {}", bed_id, admission_id);
        self.get_bed(bed_id).await
    }

    async fn mark_vacant(&self, bed_id: Uuid, expected_admission_id: Uuid) -> Result<Bed> {
        let affected = sqlx::query(r#"
            UPDATE beds
            SET status = 'vacant', current_admission_id = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'occupied' AND current_admission_id = $2
        "#)
        .bind(bed_id)
        .bind(expected_admission_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(match self.get_bed(bed_id).await {
                Ok(bed) => HimsError::Conflict(format!(
                    "bed {} is {} with admission {:?}, expected occupied by {}",
                    bed_id, bed.status, bed.current_admission_id, expected_admission_id
                )),
                Err(e) => e,
            });
        }

        tracing::info!("Bed {} marked vacant (was admission {})", bed_id, expected_admission_id);
        self.get_bed(bed_id).await
    }

    async fn set_maintenance(&self, bed_id: Uuid) -> Result<Bed> {
        self.set_side_state(bed_id, BedStatus::Maintenance).await
    }

    async fn set_reserved(&self, bed_id: Uuid) -> Result<Bed> {
        self.set_side_state(bed_id, BedStatus::Reserved).await
    }

    async fn return_to_service(&self, bed_id: Uuid) -> Result<Bed> {
        let affected = sqlx::query(r#"
            UPDATE beds
            SET status = 'vacant', updated_at = NOW()
            WHERE id = $1 AND status IN ('maintenance', 'reserved')
        "#)
        .bind(bed_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(self
                .conflict_or_not_found(bed_id, "maintenance or reserved")
                .await);
        }

        tracing::info!("Bed {} returned to service", bed_id);
        self.get_bed(bed_id).await
    }

    async fn remove_bed(&self, bed_id: Uuid) -> Result<()> {
        let affected = sqlx::query("DELETE FROM beds WHERE id = $1 AND status <> 'occupied'")
            .bind(bed_id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| HimsError::Database(e.to_string()))?
            .rows_affected();

        if affected == 0 {
            return Err(match self.get_bed(bed_id).await {
                Ok(_) => HimsError::Conflict(format!(
                    "bed {} is occupied and cannot be removed",
                    bed_id
                )),
                Err(e) => e,
            });
        }

        tracing::info!("Removed bed {}", bed_id);
        Ok(())
    }
}

impl PgBedRegistry {
    async fn set_side_state(&self, bed_id: Uuid, target: BedStatus) -> Result<Bed> {
        let affected = sqlx::query(r#"
            UPDATE beds
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'vacant'
        "#)
        .bind(bed_id)
        .bind(bed_status_as_str(target))
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(self.conflict_or_not_found(bed_id, "vacant").await);
        }

        tracing::info!("Bed {} set to {}", bed_id, target);
        self.get_bed(bed_id).await
    }
}

// ========== 住院台账 ==========

/// PostgreSQL住院台账
pub struct PgAdmissionLedger {
    pool: DatabasePool,
}

impl PgAdmissionLedger {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch_admission(&self, admission_id: Uuid) -> Result<Option<Admission>> {
        let row = sqlx::query_as::<_, DbAdmission>("SELECT * FROM admissions WHERE id = $1")
            .bind(admission_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| HimsError::Database(e.to_string()))?;

        match row {
            Some(row) => {
                let vitals = self.fetch_vitals(admission_id).await?;
                Ok(Some(row.into_admission(vitals)))
            }
            None => Ok(None),
        }
    }

    /// 按插入顺序读取体征历史
    async fn fetch_vitals(&self, admission_id: Uuid) -> Result<Vec<VitalsEntry>> {
        let rows = sqlx::query_as::<_, DbVitalsEntry>(
            "SELECT * FROM vitals_entries WHERE admission_id = $1 ORDER BY id",
        )
        .bind(admission_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(VitalsEntry::from).collect())
    }

    /// 条件更新失败后区分 NotFound 与 Conflict
    async fn conflict_or_not_found(&self, admission_id: Uuid, reason: &str) -> HimsError {
        match self.fetch_admission(admission_id).await {
            Ok(Some(_)) => HimsError::Conflict(format!("admission {} {}", admission_id, reason)),
            Ok(None) => HimsError::NotFound(format!("Admission {} not found", admission_id)),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl AdmissionStore for PgAdmissionLedger {
    async fn create_admission(&self, data: NewAdmission) -> Result<Admission> {
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

        let id = Uuid::new_v4();
        let affected = sqlx::query(r#"
            INSERT INTO admissions (
                id, admission_number, patient_id, bed_id, admitting_doctor_id,
                assigned_nurse_id, admission_type, reason_for_admission,
                provisional_diagnosis, treatment_plan, admission_date, status
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'active'
            WHERE NOT EXISTS (
                SELECT 1 FROM admissions WHERE patient_id = $3 AND status = 'active'
            )
        "#)
        .bind(id)
        .bind(generate_admission_number())
        .bind(data.patient_id)
        .bind(data.bed_id)
        .bind(data.admitting_doctor_id)
        .bind(data.assigned_nurse_id)
        .bind(admission_type_as_str(data.admission_type))
        .bind(&data.reason_for_admission)
        .bind(&data.provisional_diagnosis)
        .bind(&data.treatment_plan)
        .bind(data.admission_date)
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(HimsError::Conflict(format!(
                "patient {} already has an active admission",
                data.patient_id
            )));
        }

        tracing::info!(
            "Created admission {} for patient {} on bed {}",
            id,
            data.patient_id,
            data.bed_id
        );
        self.get_admission(id).await
    }

    async fn get_admission(&self, admission_id: Uuid) -> Result<Admission> {
        self.fetch_admission(admission_id)
            .await?
            .ok_or_else(|| HimsError::NotFound(format!("Admission {} not found", admission_id)))
    }

    async fn get_active_admission_by_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<Admission>> {
        let row = sqlx::query_as::<_, DbAdmission>(
            "SELECT * FROM admissions WHERE patient_id = $1 AND status = 'active'",
        )
        .bind(patient_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?;

        match row {
            Some(row) => {
                let vitals = self.fetch_vitals(row.id).await?;
                Ok(Some(row.into_admission(vitals)))
            }
            None => Ok(None),
        }
    }

    async fn list_admissions_by_patient(&self, patient_id: Uuid) -> Result<Vec<Admission>> {
        let rows = sqlx::query_as::<_, DbAdmission>(
            "SELECT * FROM admissions WHERE patient_id = $1 ORDER BY admission_date",
        )
        .bind(patient_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?;

        let mut admissions = Vec::with_capacity(rows.len());
        for row in rows {
            let vitals = self.fetch_vitals(row.id).await?;
            admissions.push(row.into_admission(vitals));
        }
        Ok(admissions)
    }

    async fn close_admission(
        &self,
        admission_id: Uuid,
        discharge_date: DateTime<Utc>,
    ) -> Result<Admission> {
        let affected = sqlx::query(r#"
            UPDATE admissions
            SET status = 'discharged', discharge_date = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'active'
        "#)
        .bind(admission_id)
        .bind(discharge_date)
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(self
                .conflict_or_not_found(admission_id, "is already discharged")
                .await);
        }

        tracing::info!("Closed admission {}", admission_id);
        self.get_admission(admission_id).await
    }

    async fn append_vitals(&self, admission_id: Uuid, entry: VitalsEntry) -> Result<Admission> {
        // 截断转换会让超界计数落库为负值，这里显式拒绝
        let pulse = i32::try_from(entry.pulse)
            .map_err(|_| HimsError::Validation(format!("pulse {} out of range", entry.pulse)))?;
        let respiratory_rate = i32::try_from(entry.respiratory_rate).map_err(|_| {
            HimsError::Validation(format!(
                "respiratory_rate {} out of range",
                entry.respiratory_rate
            ))
        })?;

        let affected = sqlx::query(r#"
            INSERT INTO vitals_entries (
                admission_id, timestamp, recorded_by_nurse_id, blood_pressure,
                temperature, pulse, respiratory_rate, oxygen_saturation, weight, notes
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
            WHERE EXISTS (
                SELECT 1 FROM admissions WHERE id = $1 AND status = 'active'
            )
        "#)
        .bind(admission_id)
        .bind(entry.timestamp)
        .bind(entry.recorded_by_nurse_id)
        .bind(&entry.blood_pressure)
        .bind(entry.temperature)
        .bind(pulse)
        .bind(respiratory_rate)
        .bind(entry.oxygen_saturation)
        .bind(entry.weight)
        .bind(&entry.notes)
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(self
                .conflict_or_not_found(admission_id, "is not active, vitals rejected")
                .await);
        }

        sqlx::query("UPDATE admissions SET updated_at = NOW() WHERE id = $1")
            .bind(admission_id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| HimsError::Database(e.to_string()))?;

        self.get_admission(admission_id).await
    }

    async fn update_care_team(
        &self,
        admission_id: Uuid,
        doctor_id: Option<Uuid>,
        nurse_id: Option<Uuid>,
    ) -> Result<Admission> {
        let affected = sqlx::query(r#"
            UPDATE admissions
            SET admitting_doctor_id = COALESCE($2, admitting_doctor_id),
                assigned_nurse_id = COALESCE($3, assigned_nurse_id),
                updated_at = NOW()
            WHERE id = $1 AND status = 'active'
        "#)
        .bind(admission_id)
        .bind(doctor_id)
        .bind(nurse_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(self
                .conflict_or_not_found(admission_id, "is not active, care team is frozen")
                .await);
        }

        self.get_admission(admission_id).await
    }

    async fn set_bed(&self, admission_id: Uuid, new_bed_id: Uuid) -> Result<Admission> {
        let affected = sqlx::query(r#"
            UPDATE admissions
            SET bed_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'active'
        "#)
        .bind(admission_id)
        .bind(new_bed_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(self
                .conflict_or_not_found(admission_id, "is not active, bed cannot change")
                .await);
        }

        self.get_admission(admission_id).await
    }

    async fn remove_admission(&self, admission_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM vitals_entries WHERE admission_id = $1")
            .bind(admission_id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| HimsError::Database(e.to_string()))?;

        let affected = sqlx::query("DELETE FROM admissions WHERE id = $1")
            .bind(admission_id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| HimsError::Database(e.to_string()))?
            .rows_affected();

        if affected == 0 {
            return Err(HimsError::NotFound(format!(
                "Admission {} not found",
                admission_id
            )));
        }

        tracing::warn!("Rolled back admission {} (compensation)", admission_id);
        Ok(())
    }

    async fn reopen_admission(&self, admission_id: Uuid) -> Result<Admission> {
        // 患者在关闭与回滚之间出现新的在院记录时拒绝回滚
        let affected = sqlx::query(r#"
            UPDATE admissions
            SET status = 'active', discharge_date = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'discharged'
              AND NOT EXISTS (
                  SELECT 1 FROM admissions other
                  WHERE other.patient_id = admissions.patient_id
                    AND other.status = 'active'
              )
        "#)
        .bind(admission_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| HimsError::Database(e.to_string()))?
        .rows_affected();

        if affected == 0 {
            return Err(self
                .conflict_or_not_found(admission_id, "cannot be reopened")
                .await);
        }

        tracing::warn!("Reopened admission {} (compensation)", admission_id);
        self.get_admission(admission_id).await
    }
}
