//! 患者/员工目录连接器
//!
//! 患者与医护人员的主数据由院内目录服务拥有，本模块只做
//! 存在性与角色校验。提供HTTP连接器与测试用内存实现。

use async_trait::async_trait;
use hims_core::{HimsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// 员工角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Doctor,
    Nurse,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::Nurse => "nurse",
        }
    }
}

/// 患者目录接口
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    /// 校验患者是否存在
    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool>;
}

/// 员工目录接口
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    /// 校验员工存在且持有指定角色
    async fn has_role(&self, staff_id: Uuid, role: StaffRole) -> Result<bool>;
}

/// 目录连接器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

/// HTTP患者目录连接器
pub struct HttpPatientDirectory {
    client: reqwest::Client,
    config: DirectoryConfig,
}

impl HttpPatientDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PatientDirectory for HttpPatientDirectory {
    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool> {
        let url = format!("{}/patients/{}", self.config.endpoint, patient_id);
        let response = send_with_auth(&self.client, &url, &self.config).await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => {
                warn!("Patient directory returned {} for {}", status, patient_id);
                Err(HimsError::Internal(format!(
                    "patient directory returned {}",
                    status
                )))
            }
        }
    }
}

/// HTTP员工目录连接器
pub struct HttpStaffDirectory {
    client: reqwest::Client,
    config: DirectoryConfig,
}

impl HttpStaffDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl StaffDirectory for HttpStaffDirectory {
    async fn has_role(&self, staff_id: Uuid, role: StaffRole) -> Result<bool> {
        let url = format!(
            "{}/staff/{}?role={}",
            self.config.endpoint,
            staff_id,
            role.as_str()
        );
        let response = send_with_auth(&self.client, &url, &self.config).await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => {
                warn!("Staff directory returned {} for {}", status, staff_id);
                Err(HimsError::Internal(format!(
                    "staff directory returned {}",
                    status
                )))
            }
        }
    }
}

async fn send_with_auth(
    client: &reqwest::Client,
    url: &str,
    config: &DirectoryConfig,
) -> Result<reqwest::Response> {
    debug!("Directory lookup: {}", url);
    let mut request = client.get(url);
    if let Some(api_key) = &config.api_key {
        request = request.header("X-Api-Key", api_key);
    }
    request
        .send()
        .await
        .map_err(|e| HimsError::Internal(format!("directory request failed: {}", e)))
}

/// 放行所有患者的目录（未接入目录服务的部署用）
#[derive(Debug, Default)]
pub struct AllowAllPatientDirectory;

#[async_trait]
impl PatientDirectory for AllowAllPatientDirectory {
    async fn patient_exists(&self, _patient_id: Uuid) -> Result<bool> {
        Ok(true)
    }
}

/// 放行所有员工角色的目录（未接入目录服务的部署用）
#[derive(Debug, Default)]
pub struct AllowAllStaffDirectory;

#[async_trait]
impl StaffDirectory for AllowAllStaffDirectory {
    async fn has_role(&self, _staff_id: Uuid, _role: StaffRole) -> Result<bool> {
        Ok(true)
    }
}

/// 内存患者目录（测试与演示用）
#[derive(Debug, Default)]
pub struct InMemoryPatientDirectory {
    patients: RwLock<HashSet<Uuid>>,
}

impl InMemoryPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, patient_id: Uuid) {
        self.patients.write().await.insert(patient_id);
    }
}

#[async_trait]
impl PatientDirectory for InMemoryPatientDirectory {
    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool> {
        Ok(self.patients.read().await.contains(&patient_id))
    }
}

/// 内存员工目录（测试与演示用）
#[derive(Debug, Default)]
pub struct InMemoryStaffDirectory {
    staff: RwLock<HashMap<Uuid, StaffRole>>,
}

impl InMemoryStaffDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, staff_id: Uuid, role: StaffRole) {
        self.staff.write().await.insert(staff_id, role);
    }
}

#[async_trait]
impl StaffDirectory for InMemoryStaffDirectory {
    async fn has_role(&self, staff_id: Uuid, role: StaffRole) -> Result<bool> {
        Ok(self.staff.read().await.get(&staff_id) == Some(&role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_patient_directory() {
        let directory = InMemoryPatientDirectory::new();
        let patient = Uuid::new_v4();

        assert!(!directory.patient_exists(patient).await.unwrap());
        directory.register(patient).await;
        assert!(directory.patient_exists(patient).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_staff_directory_checks_role() {
        let directory = InMemoryStaffDirectory::new();
        let doctor = Uuid::new_v4();
        directory.register(doctor, StaffRole::Doctor).await;

        assert!(directory.has_role(doctor, StaffRole::Doctor).await.unwrap());
        assert!(!directory.has_role(doctor, StaffRole::Nurse).await.unwrap());
        assert!(!directory
            .has_role(Uuid::new_v4(), StaffRole::Doctor)
            .await
            .unwrap());
    }
}
