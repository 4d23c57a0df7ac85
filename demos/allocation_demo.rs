//! 床位分配演示程序
//!
//! 展示床位分配服务的核心功能，包括入院、体征记录、转床与出院

use hims_allocation::{AllocationService, CareTeamService, LockManager, VitalsRecorder};
use hims_core::{AdmissionType, AdmitRequest, BedFilter, BedType, NewBed, VitalsInput};
use hims_integration::{InMemoryPatientDirectory, InMemoryStaffDirectory, StaffRole};
use hims_registry::{BedStore, MemoryAdmissionLedger, MemoryBedRegistry};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🏥 HIMS 床位分配演示\n");

    // 1. 搭建服务
    let beds = Arc::new(MemoryBedRegistry::new());
    let admissions = Arc::new(MemoryAdmissionLedger::new());
    let locks = Arc::new(LockManager::default());

    let patients = Arc::new(InMemoryPatientDirectory::new());
    let staff = Arc::new(InMemoryStaffDirectory::new());

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let nurse_id = Uuid::new_v4();
    patients.register(patient_id).await;
    staff.register(doctor_id, StaffRole::Doctor).await;
    staff.register(nurse_id, StaffRole::Nurse).await;

    let allocation = AllocationService::new(
        beds.clone(),
        admissions.clone(),
        locks.clone(),
        patients.clone(),
        staff.clone(),
        None,
    );
    let care_team = CareTeamService::new(admissions.clone(), staff.clone(), locks.clone());
    let vitals = VitalsRecorder::new(admissions.clone(), staff.clone(), locks.clone());
    println!("✅ 服务初始化完成");

    // 2. 登记床位
    let bed_a = beds
        .register_bed(NewBed {
            bed_number: "01".to_string(),
            ward_number: "W3".to_string(),
            floor: 3,
            bed_type: BedType::General,
            daily_charge: 280.0,
        })
        .await?;
    let bed_b = beds
        .register_bed(NewBed {
            bed_number: "02".to_string(),
            ward_number: "W3".to_string(),
            floor: 3,
            bed_type: BedType::Private,
            daily_charge: 680.0,
        })
        .await?;
    println!("✅ 登记了 2 张床位 (W3-01 普通, W3-02 单人间)");

    let available = allocation.list_available_beds(&BedFilter::default()).await?;
    println!("📋 当前空闲床位: {}", available.len());

    // 3. 办理入院
    let admission = allocation
        .admit_patient(AdmitRequest {
            patient_id,
            bed_id: bed_a.id,
            admitting_doctor_id: doctor_id,
            assigned_nurse_id: None,
            admission_type: AdmissionType::Scheduled,
            reason_for_admission: "择期手术".to_string(),
            provisional_diagnosis: "胆囊结石".to_string(),
            treatment_plan: "腹腔镜胆囊切除术".to_string(),
        })
        .await?;
    println!(
        "\n🛏️  患者入院: 住院号 {} 床位 W3-{}",
        admission.admission_number, bed_a.bed_number
    );

    // 4. 指派责任护士
    let admission_with_nurse = care_team.assign_nurse(admission.id, nurse_id).await?;
    println!(
        "👩‍⚕️ 指派责任护士: {:?}",
        admission_with_nurse.assigned_nurse_id
    );

    // 5. 录入生命体征
    let updated = vitals
        .record_vitals(
            admission.id,
            nurse_id,
            VitalsInput {
                blood_pressure: "120/80".to_string(),
                temperature: 36.8,
                pulse: 72,
                respiratory_rate: 16,
                oxygen_saturation: 98.0,
                weight: Some(65.5),
                notes: Some("术前常规监测".to_string()),
            },
        )
        .await?;
    println!("🩺 已录入体征 {} 条", updated.vitals_history.len());

    // 6. 转床到单人间
    let transferred = allocation.transfer_bed(admission.id, bed_b.id).await?;
    println!(
        "\n🔄 转床完成: W3-{} -> W3-{}",
        bed_a.bed_number, bed_b.bed_number
    );
    assert_eq!(transferred.bed_id, bed_b.id);

    let old_bed = allocation.get_bed(bed_a.id).await?;
    println!("   原床位状态: {}", old_bed.status);

    // 7. 旧床位转入维护再恢复
    allocation.set_bed_maintenance(bed_a.id).await?;
    println!("🔧 原床位转入维护");
    allocation.return_bed_to_service(bed_a.id).await?;
    println!("✅ 原床位恢复可用");

    // 8. 办理出院
    let closed = allocation
        .discharge_patient(admission.id, chrono::Utc::now())
        .await?;
    println!(
        "\n🚪 患者出院: 住院号 {} 状态 {}",
        closed.id, closed.status
    );

    // 9. 出院后可再次入院
    let readmission = allocation
        .admit_patient(AdmitRequest {
            patient_id,
            bed_id: bed_a.id,
            admitting_doctor_id: doctor_id,
            assigned_nurse_id: Some(nurse_id),
            admission_type: AdmissionType::Emergency,
            reason_for_admission: "术后腹痛加重".to_string(),
            provisional_diagnosis: "术后并发症待查".to_string(),
            treatment_plan: "留观并复查腹部CT".to_string(),
        })
        .await?;
    println!("🛏️  再次入院: 住院号 {}", readmission.admission_number);

    let history = allocation.list_admissions_by_patient(patient_id).await?;
    println!("\n📊 患者住院历史: {} 条记录", history.len());
    for record in &history {
        println!(
            "   - {} [{}] {}",
            record.id, record.status, record.reason_for_admission
        );
    }

    println!("\n🎉 演示完成!");
    Ok(())
}
