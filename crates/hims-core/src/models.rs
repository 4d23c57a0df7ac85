//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 床位类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BedType {
    General,     // 普通床位
    SemiPrivate, // 双人间
    Private,     // 单人间
    Icu,         // 重症监护
    Emergency,   // 急诊观察
}

/// 床位状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BedStatus {
    Vacant,      // 空闲
    Occupied,    // 占用
    Maintenance, // 维护中
    Reserved,    // 预留
}

/// 物理床位
///
/// 不变式: `status == Occupied` 当且仅当 `current_admission_id` 指向一条
/// `status == Active` 且 `bed_id` 为本床位的住院记录；
/// `status == Vacant` 当且仅当 `current_admission_id` 为空。
/// 状态只能经由分配服务的原子原语变更。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bed {
    pub id: Uuid,
    pub bed_number: String,  // 床位编号，病区内唯一
    pub ward_number: String, // 病区编号
    pub floor: i32,
    pub bed_type: BedType,
    pub daily_charge: f64, // 每日床位费，非负
    pub status: BedStatus,
    pub current_admission_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 床位登记请求（行政建床）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBed {
    pub bed_number: String,
    pub ward_number: String,
    pub floor: i32,
    pub bed_type: BedType,
    pub daily_charge: f64,
}

/// 空闲床位查询过滤器，条件为可选且同时生效
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BedFilter {
    pub bed_type: Option<BedType>,
    pub floor: Option<i32>,
}

/// 入院类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionType {
    Scheduled, // 计划入院
    Emergency, // 急诊入院
    Transfer,  // 转院
}

/// 住院记录状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Active,     // 在院
    Discharged, // 已出院
}

/// 住院记录
///
/// 一次连续住院，从入院到出院。同一患者、同一床位任一时刻至多
/// 存在一条 Active 记录。出院后除历史读取外不再接受任何写入。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    pub id: Uuid,
    pub admission_number: String, // 住院流水号，用于单据展示
    pub patient_id: Uuid,
    pub bed_id: Uuid,
    pub admitting_doctor_id: Uuid,
    pub assigned_nurse_id: Option<Uuid>,
    pub admission_type: AdmissionType,
    pub reason_for_admission: String,
    pub provisional_diagnosis: String,
    pub treatment_plan: String,
    pub admission_date: DateTime<Utc>,
    pub discharge_date: Option<DateTime<Utc>>,
    pub status: AdmissionStatus,
    pub vitals_history: Vec<VitalsEntry>, // 只追加，插入顺序即时间顺序
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Admission {
    /// 是否在院
    pub fn is_active(&self) -> bool {
        self.status == AdmissionStatus::Active
    }
}

/// 生命体征记录条目
///
/// 归属于其所在的住院记录，插入后不再修改；更正以追加新条目
/// 并在 `notes` 中说明的方式进行，保留完整历史。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalsEntry {
    pub timestamp: DateTime<Utc>,
    pub recorded_by_nurse_id: Uuid,
    pub blood_pressure: String, // "收缩压/舒张压"，如 "120/80"
    pub temperature: f64,
    pub pulse: u32,
    pub respiratory_rate: u32,
    pub oxygen_saturation: f64,
    pub weight: Option<f64>,
    pub notes: Option<String>,
}

/// 入院申请
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitRequest {
    pub patient_id: Uuid,
    pub bed_id: Uuid,
    pub admitting_doctor_id: Uuid,
    pub assigned_nurse_id: Option<Uuid>,
    pub admission_type: AdmissionType,
    pub reason_for_admission: String,
    pub provisional_diagnosis: String,
    pub treatment_plan: String,
}

/// 生命体征录入数据（由护士提交，时间戳与护士id由记录器补全）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalsInput {
    pub blood_pressure: String,
    pub temperature: f64,
    pub pulse: u32,
    pub respiratory_rate: u32,
    pub oxygen_saturation: f64,
    pub weight: Option<f64>,
    pub notes: Option<String>,
}

impl std::fmt::Display for BedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Vacant => "vacant",
            Self::Occupied => "occupied",
            Self::Maintenance => "maintenance",
            Self::Reserved => "reserved",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Discharged => "discharged",
        };
        write!(f, "{}", s)
    }
}
