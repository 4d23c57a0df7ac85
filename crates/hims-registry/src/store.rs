//! 存储接口定义
//!
//! 床位与住院记录的存储抽象。实现方必须保证每个方法是一次
//! 原子的条件更新：先比较期望状态，不符则以 `Conflict` 失败，
//! 任何情况下不得留下半写状态。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hims_core::{Admission, AdmissionType, Bed, BedFilter, NewBed, Result, VitalsEntry};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 台账建档数据（由分配服务在校验通过后提交）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAdmission {
    pub patient_id: Uuid,
    pub bed_id: Uuid,
    pub admitting_doctor_id: Uuid,
    pub assigned_nurse_id: Option<Uuid>,
    pub admission_type: AdmissionType,
    pub reason_for_admission: String,
    pub provisional_diagnosis: String,
    pub treatment_plan: String,
    pub admission_date: DateTime<Utc>,
}

/// 床位登记处存储接口
#[async_trait]
pub trait BedStore: Send + Sync {
    /// 行政建床；床位编号在病区内唯一，日床位费非负
    async fn register_bed(&self, new_bed: NewBed) -> Result<Bed>;

    /// 按id查询床位
    async fn get_bed(&self, bed_id: Uuid) -> Result<Bed>;

    /// 查询空闲床位，过滤条件可选且同时生效；结果仅供参考，
    /// 入院必须依赖 `mark_occupied` 的原子检查
    async fn list_available_beds(&self, filter: &BedFilter) -> Result<Vec<Bed>>;

    /// 占用床位：要求当前状态为 Vacant，否则 `Conflict`；
    /// 同一步写入 status=Occupied 与 current_admission_id
    async fn mark_occupied(&self, bed_id: Uuid, admission_id: Uuid) -> Result<Bed>;

    /// 释放床位：要求当前状态为 Occupied 且 current_admission_id
    /// 等于期望值，否则 `Conflict`
    async fn mark_vacant(&self, bed_id: Uuid, expected_admission_id: Uuid) -> Result<Bed>;

    /// 转入维护；占用中的床位不可停用
    async fn set_maintenance(&self, bed_id: Uuid) -> Result<Bed>;

    /// 转入预留；占用中的床位不可预留
    async fn set_reserved(&self, bed_id: Uuid) -> Result<Bed>;

    /// 维护/预留结束，回到空闲；仅这两个侧态可回到 Vacant
    async fn return_to_service(&self, bed_id: Uuid) -> Result<Bed>;

    /// 删除床位；占用中的床位不可删除
    async fn remove_bed(&self, bed_id: Uuid) -> Result<()>;
}

/// 住院台账存储接口
#[async_trait]
pub trait AdmissionStore: Send + Sync {
    /// 建档为 Active；必填字段缺失以 `Validation` 失败，
    /// 患者已有在院记录以 `Conflict` 失败（写入时强制，而非仅读取时）
    async fn create_admission(&self, data: NewAdmission) -> Result<Admission>;

    /// 按id查询住院记录
    async fn get_admission(&self, admission_id: Uuid) -> Result<Admission>;

    /// 查询患者当前在院记录
    async fn get_active_admission_by_patient(&self, patient_id: Uuid)
        -> Result<Option<Admission>>;

    /// 患者住院史，按入院时间排序
    async fn list_admissions_by_patient(&self, patient_id: Uuid) -> Result<Vec<Admission>>;

    /// 关闭住院记录：置 status=Discharged 并写入出院时间；
    /// 已出院则 `Conflict`
    async fn close_admission(
        &self,
        admission_id: Uuid,
        discharge_date: DateTime<Utc>,
    ) -> Result<Admission>;

    /// 追加生命体征条目；非 Active 则 `Conflict`
    async fn append_vitals(&self, admission_id: Uuid, entry: VitalsEntry) -> Result<Admission>;

    /// 更新责任医护；非 Active 则 `Conflict`
    async fn update_care_team(
        &self,
        admission_id: Uuid,
        doctor_id: Option<Uuid>,
        nurse_id: Option<Uuid>,
    ) -> Result<Admission>;

    /// 换床（仅改 bed_id，记录保持 Active）；非 Active 则 `Conflict`
    async fn set_bed(&self, admission_id: Uuid, new_bed_id: Uuid) -> Result<Admission>;

    /// 撤销建档。仅供分配服务在占床失败后的补偿回滚使用
    async fn remove_admission(&self, admission_id: Uuid) -> Result<()>;

    /// 撤销关闭，恢复为 Active。仅供分配服务在释床失败后的补偿回滚使用
    async fn reopen_admission(&self, admission_id: Uuid) -> Result<Admission>;
}
