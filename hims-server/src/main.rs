//! HIMS服务器主程序

mod config;
mod http;

use clap::Parser;
use hims_allocation::{AllocationService, CareTeamService, LockManager, VitalsRecorder};
use hims_core::Result;
use hims_database::{create_tables, DatabasePool, PgAdmissionLedger, PgBedRegistry};
use hims_integration::{
    AllowAllPatientDirectory, AllowAllStaffDirectory, BillingNotifier, DirectoryConfig,
    HttpPatientDirectory, HttpStaffDirectory, PatientDirectory, StaffDirectory,
};
use hims_registry::{AdmissionStore, BedStore, MemoryAdmissionLedger, MemoryBedRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::HimsConfig;
use crate::http::{ApiServer, ApiState};

/// HIMS服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "hims-server")]
#[command(about = "HIMS (Hospital Information Management System) 床位分配服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别（覆盖配置文件）
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = HimsConfig::load(args.config.as_deref())?;
    let log_level = args.log_level.unwrap_or_else(|| config.logging.level.clone());

    // 初始化日志
    tracing_subscriber::fmt().with_env_filter(&log_level).init();

    info!("启动HIMS服务器...");
    info!("HIMS服务器配置:");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  锁等待超时: {}ms", config.locks.acquire_timeout_ms);
    info!(
        "  存储后端: {}",
        if config.database.url.is_some() {
            "postgresql"
        } else {
            "memory"
        }
    );

    let (beds, admissions) = build_stores(&config).await?;
    let locks = Arc::new(LockManager::new(Duration::from_millis(
        config.locks.acquire_timeout_ms,
    )));

    let patients = build_patient_directory(&config);
    let staff = build_staff_directory(&config);
    let billing = config.integration.billing_endpoint.clone().map(|endpoint| {
        info!("  计费通知端点: {}", endpoint);
        Arc::new(BillingNotifier::new(
            endpoint,
            config.integration.billing_secret.clone(),
        ))
    });

    let allocation = Arc::new(AllocationService::new(
        beds.clone(),
        admissions.clone(),
        locks.clone(),
        patients,
        staff.clone(),
        billing,
    ));
    let care_team = Arc::new(CareTeamService::new(
        admissions.clone(),
        staff.clone(),
        locks.clone(),
    ));
    let vitals = Arc::new(VitalsRecorder::new(admissions, staff, locks));

    let state = ApiState {
        allocation,
        care_team,
        vitals,
        beds,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let server = ApiServer::new(state);

    if let Err(e) = server.run(&addr).await {
        error!("服务器启动失败: {}", e);
        return Err(e);
    }

    Ok(())
}

/// 按配置构建存储层：配置了数据库则用PostgreSQL，否则用内存存储
async fn build_stores(
    config: &HimsConfig,
) -> Result<(Arc<dyn BedStore>, Arc<dyn AdmissionStore>)> {
    match &config.database.url {
        Some(url) => {
            let pool = DatabasePool::connect(url).await?;
            create_tables(&pool).await?;
            Ok((
                Arc::new(PgBedRegistry::new(pool.clone())),
                Arc::new(PgAdmissionLedger::new(pool)),
            ))
        }
        None => {
            warn!("No database configured, state will not survive restarts");
            Ok((
                Arc::new(MemoryBedRegistry::new()),
                Arc::new(MemoryAdmissionLedger::new()),
            ))
        }
    }
}

fn build_patient_directory(config: &HimsConfig) -> Arc<dyn PatientDirectory> {
    match &config.integration.patient_directory_url {
        Some(endpoint) => {
            info!("  患者目录: {}", endpoint);
            Arc::new(HttpPatientDirectory::new(DirectoryConfig {
                endpoint: endpoint.clone(),
                api_key: config.integration.api_key.clone(),
            }))
        }
        None => {
            warn!("No patient directory configured, patient ids will not be verified");
            Arc::new(AllowAllPatientDirectory)
        }
    }
}

fn build_staff_directory(config: &HimsConfig) -> Arc<dyn StaffDirectory> {
    match &config.integration.staff_directory_url {
        Some(endpoint) => {
            info!("  人事目录: {}", endpoint);
            Arc::new(HttpStaffDirectory::new(DirectoryConfig {
                endpoint: endpoint.clone(),
                api_key: config.integration.api_key.clone(),
            }))
        }
        None => {
            warn!("No staff directory configured, staff roles will not be verified");
            Arc::new(AllowAllStaffDirectory)
        }
    }
}
