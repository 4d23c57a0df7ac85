//! RESTful API接口模块
//!
//! 为住院管理与床位调度提供标准化的REST API接口

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use hims_allocation::{AllocationService, CareTeamService, VitalsRecorder};
use hims_core::{
    Admission, AdmitRequest, Bed, BedFilter, BedType, HimsError, NewBed, VitalsInput,
};
use hims_registry::BedStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// API状态管理器
#[derive(Clone)]
pub struct ApiState {
    pub allocation: Arc<AllocationService>,
    pub care_team: Arc<CareTeamService>,
    pub vitals: Arc<VitalsRecorder>,
    pub beds: Arc<dyn BedStore>,
}

/// API错误响应体
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

/// 统一错误包装，实现HimsError到HTTP状态码的映射
pub struct AppError(HimsError);

impl From<HimsError> for AppError {
    fn from(err: HimsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            HimsError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            HimsError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            HimsError::BedUnavailable { .. } => (StatusCode::CONFLICT, "bed_unavailable"),
            HimsError::AlreadyAdmitted { .. } => (StatusCode::CONFLICT, "already_admitted"),
            HimsError::AlreadyDischarged { .. } => (StatusCode::CONFLICT, "already_discharged"),
            HimsError::AdmissionClosed { .. } => (StatusCode::CONFLICT, "admission_closed"),
            HimsError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            HimsError::InvalidStateTransition { .. } => (StatusCode::CONFLICT, "invalid_state"),
            HimsError::ResourceBusy(_) => (StatusCode::SERVICE_UNAVAILABLE, "resource_busy"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let body = Json(ApiError {
            error: kind.to_string(),
            message: self.0.to_string(),
        });

        let mut response = (status, body).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

type ApiResult<T> = std::result::Result<T, AppError>;

/// 空闲床位查询参数
#[derive(Debug, Deserialize)]
pub struct BedQuery {
    pub bed_type: Option<BedType>,
    pub floor: Option<i32>,
}

/// 出院请求（不带时间则取当前时间）
#[derive(Debug, Default, Deserialize)]
pub struct DischargeRequest {
    pub discharge_date: Option<chrono::DateTime<Utc>>,
}

/// 转床请求
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub new_bed_id: Uuid,
}

/// 医护指派请求
#[derive(Debug, Deserialize)]
pub struct AssignStaffRequest {
    pub staff_id: Uuid,
}

/// 体征录入请求
#[derive(Debug, Deserialize)]
pub struct RecordVitalsRequest {
    pub nurse_id: Uuid,
    #[serde(flatten)]
    pub vitals: VitalsInput,
}

/// API处理器
pub struct ApiHandler;

impl ApiHandler {
    /// 健康检查
    pub async fn health_check() -> Json<HashMap<String, String>> {
        let mut status = HashMap::new();
        status.insert("status".to_string(), "healthy".to_string());
        status.insert("timestamp".to_string(), Utc::now().to_rfc3339());
        status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        Json(status)
    }

    /// 登记新床位
    pub async fn register_bed(
        State(state): State<ApiState>,
        Json(request): Json<NewBed>,
    ) -> ApiResult<(StatusCode, Json<Bed>)> {
        info!(
            "Registering bed {}/{} via API",
            request.ward_number, request.bed_number
        );
        let bed = state.beds.register_bed(request).await?;
        Ok((StatusCode::CREATED, Json(bed)))
    }

    /// 查询空闲床位
    pub async fn list_available_beds(
        State(state): State<ApiState>,
        Query(query): Query<BedQuery>,
    ) -> ApiResult<Json<Vec<Bed>>> {
        let filter = BedFilter {
            bed_type: query.bed_type,
            floor: query.floor,
        };
        let beds = state.allocation.list_available_beds(&filter).await?;
        Ok(Json(beds))
    }

    /// 查询单个床位
    pub async fn get_bed(
        State(state): State<ApiState>,
        Path(bed_id): Path<Uuid>,
    ) -> ApiResult<Json<Bed>> {
        Ok(Json(state.allocation.get_bed(bed_id).await?))
    }

    /// 床位转入维护
    pub async fn set_bed_maintenance(
        State(state): State<ApiState>,
        Path(bed_id): Path<Uuid>,
    ) -> ApiResult<Json<Bed>> {
        Ok(Json(state.allocation.set_bed_maintenance(bed_id).await?))
    }

    /// 床位转入预留
    pub async fn set_bed_reserved(
        State(state): State<ApiState>,
        Path(bed_id): Path<Uuid>,
    ) -> ApiResult<Json<Bed>> {
        Ok(Json(state.allocation.set_bed_reserved(bed_id).await?))
    }

    /// 床位恢复可用
    pub async fn return_bed_to_service(
        State(state): State<ApiState>,
        Path(bed_id): Path<Uuid>,
    ) -> ApiResult<Json<Bed>> {
        Ok(Json(state.allocation.return_bed_to_service(bed_id).await?))
    }

    /// 办理入院
    pub async fn admit_patient(
        State(state): State<ApiState>,
        Json(request): Json<AdmitRequest>,
    ) -> ApiResult<(StatusCode, Json<Admission>)> {
        info!(
            "Admit request for patient {} to bed {}",
            request.patient_id, request.bed_id
        );
        let admission = state.allocation.admit_patient(request).await?;
        Ok((StatusCode::CREATED, Json(admission)))
    }

    /// 查询住院记录
    pub async fn get_admission(
        State(state): State<ApiState>,
        Path(admission_id): Path<Uuid>,
    ) -> ApiResult<Json<Admission>> {
        Ok(Json(state.allocation.get_admission(admission_id).await?))
    }

    /// 办理出院
    pub async fn discharge_patient(
        State(state): State<ApiState>,
        Path(admission_id): Path<Uuid>,
        Json(request): Json<DischargeRequest>,
    ) -> ApiResult<Json<Admission>> {
        let discharge_date = request.discharge_date.unwrap_or_else(Utc::now);
        let admission = state
            .allocation
            .discharge_patient(admission_id, discharge_date)
            .await?;
        Ok(Json(admission))
    }

    /// 转床
    pub async fn transfer_bed(
        State(state): State<ApiState>,
        Path(admission_id): Path<Uuid>,
        Json(request): Json<TransferRequest>,
    ) -> ApiResult<Json<Admission>> {
        let admission = state
            .allocation
            .transfer_bed(admission_id, request.new_bed_id)
            .await?;
        Ok(Json(admission))
    }

    /// 指派主治医生
    pub async fn assign_doctor(
        State(state): State<ApiState>,
        Path(admission_id): Path<Uuid>,
        Json(request): Json<AssignStaffRequest>,
    ) -> ApiResult<Json<Admission>> {
        let admission = state
            .care_team
            .assign_doctor(admission_id, request.staff_id)
            .await?;
        Ok(Json(admission))
    }

    /// 指派责任护士
    pub async fn assign_nurse(
        State(state): State<ApiState>,
        Path(admission_id): Path<Uuid>,
        Json(request): Json<AssignStaffRequest>,
    ) -> ApiResult<Json<Admission>> {
        let admission = state
            .care_team
            .assign_nurse(admission_id, request.staff_id)
            .await?;
        Ok(Json(admission))
    }

    /// 录入生命体征
    pub async fn record_vitals(
        State(state): State<ApiState>,
        Path(admission_id): Path<Uuid>,
        Json(request): Json<RecordVitalsRequest>,
    ) -> ApiResult<(StatusCode, Json<Admission>)> {
        let admission = state
            .vitals
            .record_vitals(admission_id, request.nurse_id, request.vitals)
            .await?;
        Ok((StatusCode::CREATED, Json(admission)))
    }

    /// 查询患者当前在院记录
    pub async fn get_active_admission(
        State(state): State<ApiState>,
        Path(patient_id): Path<Uuid>,
    ) -> ApiResult<Json<Admission>> {
        Ok(Json(
            state
                .allocation
                .get_active_admission_by_patient(patient_id)
                .await?,
        ))
    }

    /// 查询患者住院历史
    pub async fn list_patient_admissions(
        State(state): State<ApiState>,
        Path(patient_id): Path<Uuid>,
    ) -> ApiResult<Json<Vec<Admission>>> {
        Ok(Json(
            state
                .allocation
                .list_admissions_by_patient(patient_id)
                .await?,
        ))
    }
}

/// 创建API路由
pub fn create_api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(ApiHandler::health_check))
        .route(
            "/api/beds",
            get(ApiHandler::list_available_beds).post(ApiHandler::register_bed),
        )
        .route("/api/beds/:id", get(ApiHandler::get_bed))
        .route(
            "/api/beds/:id/maintenance",
            post(ApiHandler::set_bed_maintenance),
        )
        .route("/api/beds/:id/reserve", post(ApiHandler::set_bed_reserved))
        .route(
            "/api/beds/:id/release",
            post(ApiHandler::return_bed_to_service),
        )
        .route("/api/admissions", post(ApiHandler::admit_patient))
        .route("/api/admissions/:id", get(ApiHandler::get_admission))
        .route(
            "/api/admissions/:id/discharge",
            post(ApiHandler::discharge_patient),
        )
        .route(
            "/api/admissions/:id/transfer",
            post(ApiHandler::transfer_bed),
        )
        .route(
            "/api/admissions/:id/care-team/doctor",
            put(ApiHandler::assign_doctor),
        )
        .route(
            "/api/admissions/:id/care-team/nurse",
            put(ApiHandler::assign_nurse),
        )
        .route("/api/admissions/:id/vitals", post(ApiHandler::record_vitals))
        .route(
            "/api/patients/:id/admission",
            get(ApiHandler::get_active_admission),
        )
        .route(
            "/api/patients/:id/admissions",
            get(ApiHandler::list_patient_admissions),
        )
        .with_state(state)
        .layer(axum::middleware::from_fn(
            |req: axum::extract::Request, next: axum::middleware::Next| async move {
                info!("API request: {} {}", req.method(), req.uri());
                let response = next.run(req).await;
                info!("API response: {}", response.status());
                response
            },
        ))
        .layer(tower_http::cors::CorsLayer::permissive())
}

/// API服务器
pub struct ApiServer {
    app: Router,
}

impl ApiServer {
    pub fn new(state: ApiState) -> Self {
        Self {
            app: create_api_routes(state),
        }
    }

    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        info!("Starting API server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.app).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = vec![
            (
                HimsError::Validation("bad input".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                HimsError::NotFound("no such bed".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                HimsError::BedUnavailable {
                    bed_id: Uuid::new_v4(),
                    reason: "occupied".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                HimsError::AlreadyDischarged {
                    admission_id: Uuid::new_v4(),
                },
                StatusCode::CONFLICT,
            ),
            (
                HimsError::ResourceBusy("lock timeout".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                HimsError::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_resource_busy_carries_retry_after() {
        let response = AppError(HimsError::ResourceBusy("lock timeout".to_string()))
            .into_response();
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }
}
