//! 床位登记处
//!
//! 床位身份与状态的唯一事实来源。内存实现：整张表位于一把
//! `RwLock` 之后，每个条件更新在写锁内完成比较与写入，
//! 对外等价于文档级原子更新。

use async_trait::async_trait;
use chrono::Utc;
use hims_core::{Bed, BedFilter, BedStatus, HimsError, NewBed, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::BedStore;

/// 内存床位登记处
#[derive(Debug, Default)]
pub struct MemoryBedRegistry {
    beds: RwLock<HashMap<Uuid, Bed>>,
}

impl MemoryBedRegistry {
    /// 创建空登记处
    pub fn new() -> Self {
        Self {
            beds: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl BedStore for MemoryBedRegistry {
    async fn register_bed(&self, new_bed: NewBed) -> Result<Bed> {
        if hims_core::utils::is_blank(&new_bed.bed_number) {
            return Err(HimsError::Validation("bed_number is required".to_string()));
        }
        if hims_core::utils::is_blank(&new_bed.ward_number) {
            return Err(HimsError::Validation("ward_number is required".to_string()));
        }
        if !new_bed.daily_charge.is_finite() || new_bed.daily_charge < 0.0 {
            return Err(HimsError::Validation(format!(
                "daily_charge must be non-negative, got {}",
                new_bed.daily_charge
            )));
        }

        let mut beds = self.beds.write().await;

        // 床位编号在病区内唯一
        if beds.values().any(|bed| {
            bed.ward_number == new_bed.ward_number && bed.bed_number == new_bed.bed_number
        }) {
            return Err(HimsError::Conflict(format!(
                "bed {} already exists in ward {}",
                new_bed.bed_number, new_bed.ward_number
            )));
        }

        let now = Utc::now();
        let bed = Bed {
            id: Uuid::new_v4(),
            bed_number: new_bed.bed_number,
            ward_number: new_bed.ward_number,
            floor: new_bed.floor,
            bed_type: new_bed.bed_type,
            daily_charge: new_bed.daily_charge,
            status: BedStatus::Vacant,
            current_admission_id: None,
            created_at: now,
            updated_at: now,
        };
        beds.insert(bed.id, bed.clone());

        tracing::info!("Registered bed {} ({}/{})", bed.id, bed.ward_number, bed.bed_number);
        Ok(bed)
    }

    async fn get_bed(&self, bed_id: Uuid) -> Result<Bed> {
        let beds = self.beds.read().await;
        beds.get(&bed_id)
            .cloned()
            .ok_or_else(|| HimsError::NotFound(format!("Bed {} not found", bed_id)))
    }

    async fn list_available_beds(&self, filter: &BedFilter) -> Result<Vec<Bed>> {
        let beds = self.beds.read().await;
        let mut available: Vec<Bed> = beds
            .values()
            .filter(|bed| bed.status == BedStatus::Vacant)
            .filter(|bed| filter.bed_type.map_or(true, |t| bed.bed_type == t))
            .filter(|bed| filter.floor.map_or(true, |f| bed.floor == f))
            .cloned()
            .collect();

        // 病区+编号排序，输出稳定
        available.sort_by(|a, b| {
            (&a.ward_number, &a.bed_number).cmp(&(&b.ward_number, &b.bed_number))
        });
        Ok(available)
    }

    async fn mark_occupied(&self, bed_id: Uuid, admission_id: Uuid) -> Result<Bed> {
        let mut beds = self.beds.write().await;
        let bed = beds
            .get_mut(&bed_id)
            .ok_or_else(|| HimsError::NotFound(format!("Bed {} not found", bed_id)))?;

        if bed.status != BedStatus::Vacant {
            return Err(HimsError::Conflict(format!(
                "bed {} is {}, expected vacant",
                bed_id, bed.status
            )));
        }

        bed.status = BedStatus::Occupied;
        bed.current_admission_id = Some(admission_id);
        bed.updated_at = Utc::now();

        tracing::info!("Bed {} marked occupied by admission {}", bed_id, admission_id);
        Ok(bed.clone())
    }

    async fn mark_vacant(&self, bed_id: Uuid, expected_admission_id: Uuid) -> Result<Bed> {
        let mut beds = self.beds.write().await;
        let bed = beds
            .get_mut(&bed_id)
            .ok_or_else(|| HimsError::NotFound(format!("Bed {} not found", bed_id)))?;

        if bed.status != BedStatus::Occupied
            || bed.current_admission_id != Some(expected_admission_id)
        {
            return Err(HimsError::Conflict(format!(
                "bed {} is {} with admission {:?}, expected occupied by {}",
                bed_id, bed.status, bed.current_admission_id, expected_admission_id
            )));
        }

        bed.status = BedStatus::Vacant;
        bed.current_admission_id = None;
        bed.updated_at = Utc::now();

        tracing::info!("Bed {} marked vacant (was admission {})", bed_id, expected_admission_id);
        Ok(bed.clone())
    }

    async fn set_maintenance(&self, bed_id: Uuid) -> Result<Bed> {
        self.set_side_state(bed_id, BedStatus::Maintenance).await
    }

    async fn set_reserved(&self, bed_id: Uuid) -> Result<Bed> {
        self.set_side_state(bed_id, BedStatus::Reserved).await
    }

    async fn return_to_service(&self, bed_id: Uuid) -> Result<Bed> {
        let mut beds = self.beds.write().await;
        let bed = beds
            .get_mut(&bed_id)
            .ok_or_else(|| HimsError::NotFound(format!("Bed {} not found", bed_id)))?;

        if !matches!(bed.status, BedStatus::Maintenance | BedStatus::Reserved) {
            return Err(HimsError::Conflict(format!(
                "bed {} is {}, expected maintenance or reserved",
                bed_id, bed.status
            )));
        }

        bed.status = BedStatus::Vacant;
        bed.updated_at = Utc::now();

        tracing::info!("Bed {} returned to service", bed_id);
        Ok(bed.clone())
    }

    async fn remove_bed(&self, bed_id: Uuid) -> Result<()> {
        let mut beds = self.beds.write().await;
        let bed = beds
            .get(&bed_id)
            .ok_or_else(|| HimsError::NotFound(format!("Bed {} not found", bed_id)))?;

        if bed.status == BedStatus::Occupied {
            return Err(HimsError::Conflict(format!(
                "bed {} is occupied and cannot be removed",
                bed_id
            )));
        }

        beds.remove(&bed_id);
        tracing::info!("Removed bed {}", bed_id);
        Ok(())
    }
}

impl MemoryBedRegistry {
    /// 侧态（维护/预留）只能从 Vacant 进入
    async fn set_side_state(&self, bed_id: Uuid, target: BedStatus) -> Result<Bed> {
        let mut beds = self.beds.write().await;
        let bed = beds
            .get_mut(&bed_id)
            .ok_or_else(|| HimsError::NotFound(format!("Bed {} not found", bed_id)))?;

        if bed.status != BedStatus::Vacant {
            return Err(HimsError::Conflict(format!(
                "bed {} is {}, expected vacant",
                bed_id, bed.status
            )));
        }

        bed.status = target;
        bed.updated_at = Utc::now();

        tracing::info!("Bed {} set to {}", bed_id, target);
        Ok(bed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hims_core::BedType;

    fn sample_bed(number: &str) -> NewBed {
        NewBed {
            bed_number: number.to_string(),
            ward_number: "W3".to_string(),
            floor: 3,
            bed_type: BedType::General,
            daily_charge: 150.0,
        }
    }

    #[tokio::test]
    async fn test_register_and_get_bed() {
        let registry = MemoryBedRegistry::new();
        let bed = registry.register_bed(sample_bed("B1")).await.unwrap();
        assert_eq!(bed.status, BedStatus::Vacant);
        assert!(bed.current_admission_id.is_none());

        let fetched = registry.get_bed(bed.id).await.unwrap();
        assert_eq!(fetched.bed_number, "B1");
    }

    #[tokio::test]
    async fn test_register_rejects_negative_charge() {
        let registry = MemoryBedRegistry::new();
        let mut bed = sample_bed("B1");
        bed.daily_charge = -10.0;
        let result = registry.register_bed(bed).await;
        assert!(matches!(result, Err(HimsError::Validation(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_number_in_ward() {
        let registry = MemoryBedRegistry::new();
        registry.register_bed(sample_bed("B1")).await.unwrap();
        let result = registry.register_bed(sample_bed("B1")).await;
        assert!(matches!(result, Err(HimsError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_mark_occupied_requires_vacant() {
        let registry = MemoryBedRegistry::new();
        let bed = registry.register_bed(sample_bed("B1")).await.unwrap();
        let admission_a = Uuid::new_v4();
        let admission_b = Uuid::new_v4();

        registry.mark_occupied(bed.id, admission_a).await.unwrap();
        let result = registry.mark_occupied(bed.id, admission_b).await;
        assert!(matches!(result, Err(HimsError::Conflict(_))));

        // 第一条占用不受影响
        let current = registry.get_bed(bed.id).await.unwrap();
        assert_eq!(current.current_admission_id, Some(admission_a));
    }

    #[tokio::test]
    async fn test_mark_vacant_checks_expected_admission() {
        let registry = MemoryBedRegistry::new();
        let bed = registry.register_bed(sample_bed("B1")).await.unwrap();
        let admission = Uuid::new_v4();
        registry.mark_occupied(bed.id, admission).await.unwrap();

        let wrong = registry.mark_vacant(bed.id, Uuid::new_v4()).await;
        assert!(matches!(wrong, Err(HimsError::Conflict(_))));

        let released = registry.mark_vacant(bed.id, admission).await.unwrap();
        assert_eq!(released.status, BedStatus::Vacant);
        assert!(released.current_admission_id.is_none());

        // 已空闲的床位不能再次释放
        let again = registry.mark_vacant(bed.id, admission).await;
        assert!(matches!(again, Err(HimsError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_side_states_only_from_vacant() {
        let registry = MemoryBedRegistry::new();
        let bed = registry.register_bed(sample_bed("B1")).await.unwrap();
        registry.mark_occupied(bed.id, Uuid::new_v4()).await.unwrap();

        assert!(matches!(
            registry.set_maintenance(bed.id).await,
            Err(HimsError::Conflict(_))
        ));
        assert!(matches!(
            registry.set_reserved(bed.id).await,
            Err(HimsError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_return_to_service_cycle() {
        let registry = MemoryBedRegistry::new();
        let bed = registry.register_bed(sample_bed("B1")).await.unwrap();

        registry.set_maintenance(bed.id).await.unwrap();
        let back = registry.return_to_service(bed.id).await.unwrap();
        assert_eq!(back.status, BedStatus::Vacant);

        // 空闲床位没有可结束的侧态
        let result = registry.return_to_service(bed.id).await;
        assert!(matches!(result, Err(HimsError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_remove_bed_refuses_occupied() {
        let registry = MemoryBedRegistry::new();
        let bed = registry.register_bed(sample_bed("B1")).await.unwrap();
        registry.mark_occupied(bed.id, Uuid::new_v4()).await.unwrap();

        assert!(matches!(
            registry.remove_bed(bed.id).await,
            Err(HimsError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_list_available_beds_filters() {
        let registry = MemoryBedRegistry::new();
        registry.register_bed(sample_bed("B1")).await.unwrap();

        let mut icu = sample_bed("ICU-1");
        icu.bed_type = BedType::Icu;
        icu.floor = 5;
        let icu = registry.register_bed(icu).await.unwrap();

        let occupied = registry.register_bed(sample_bed("B2")).await.unwrap();
        registry
            .mark_occupied(occupied.id, Uuid::new_v4())
            .await
            .unwrap();

        let all = registry
            .list_available_beds(&BedFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let filter = BedFilter {
            bed_type: Some(BedType::Icu),
            floor: Some(5),
        };
        let icu_only = registry.list_available_beds(&filter).await.unwrap();
        assert_eq!(icu_only.len(), 1);
        assert_eq!(icu_only[0].id, icu.id);

        let filter = BedFilter {
            bed_type: Some(BedType::Icu),
            floor: Some(3),
        };
        assert!(registry.list_available_beds(&filter).await.unwrap().is_empty());
    }
}
