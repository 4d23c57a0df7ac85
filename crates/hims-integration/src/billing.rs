//! 计费系统通知模块
//!
//! 出院成功后向计费系统推送住院摘要，供其生成按日计费的
//! 住院发票。通知是尽力而为、发后不理的：失败只记录日志，
//! 不回滚出院，也不重算金额（金额归计费系统所有）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

/// 出院计费通知载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DischargeNotice {
    pub admission_id: Uuid,
    pub bed_id: Uuid,
    pub daily_charge: f64,
    pub admission_date: DateTime<Utc>,
    pub discharge_date: DateTime<Utc>,
}

/// 计费通知器
pub struct BillingNotifier {
    client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
}

impl BillingNotifier {
    /// 创建通知器；`secret` 存在时对载荷附加签名头
    pub fn new(endpoint: String, secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            secret,
        }
    }

    /// 生成载荷签名
    fn generate_signature(&self, payload: &str) -> Option<String> {
        use sha2::{Digest, Sha256};

        self.secret.as_ref().map(|secret| {
            let mut hasher = Sha256::new();
            hasher.update(payload);
            hasher.update(secret);
            format!("sha256={:x}", hasher.finalize())
        })
    }

    /// 异步推送出院通知，不阻塞出院事务
    pub fn notify_discharge(self: &std::sync::Arc<Self>, notice: DischargeNotice) {
        let notifier = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&notice).await {
                error!(
                    "Failed to notify billing for admission {}: {}",
                    notice.admission_id, e
                );
            }
        });
    }

    /// 发送单条通知
    async fn send(&self, notice: &DischargeNotice) -> anyhow::Result<()> {
        let payload = serde_json::to_string(notice)?;
        debug!("Sending discharge notice for admission {}", notice.admission_id);

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("User-Agent", "HIMS-Billing/1.0")
            .body(payload.clone());

        if let Some(signature) = self.generate_signature(&payload) {
            request = request.header("X-HIMS-Signature", signature);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            info!(
                "Billing notified for admission {} (bed {})",
                notice.admission_id, notice.bed_id
            );
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "billing endpoint returned {}",
                response.status()
            ))
        }
    }
}
