use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::domain::entity::TrafficReport;
use crate::domain::repository::SpeedLayerStore;

#[derive(Debug, thiserror::Error)]
pub enum RecordTrafficError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// RecordTrafficUseCase はノードからの報告をスピードレイヤーの時間単位カウンターに加算する。
pub struct RecordTrafficUseCase {
    speed_store: Arc<dyn SpeedLayerStore>,
}

impl RecordTrafficUseCase {
    pub fn new(speed_store: Arc<dyn SpeedLayerStore>) -> Self {
        Self { speed_store }
    }

    pub async fn execute(&self, report: &TrafficReport) -> Result<(), RecordTrafficError> {
        if report.subscription_id == 0 {
            return Err(RecordTrafficError::Validation(
                "subscription_id is required".to_string(),
            ));
        }
        // ストア側は符号付き 64bit で加算するため、それを超える増分は受け付けない
        if i64::try_from(report.upload).is_err() || i64::try_from(report.download).is_err() {
            return Err(RecordTrafficError::Validation(format!(
                "traffic delta out of range: upload={}, download={}",
                report.upload, report.download
            )));
        }
        if report.reported_at > Utc::now() + chrono::Duration::minutes(5) {
            return Err(RecordTrafficError::Validation(format!(
                "reported_at is in the future: {}",
                report.reported_at
            )));
        }
        if report.upload == 0 && report.download == 0 {
            return Ok(());
        }

        self.speed_store
            .accumulate(report)
            .await
            .map_err(|e| RecordTrafficError::Internal(e.to_string()))?;

        debug!(
            subscription_id = report.subscription_id,
            resource_type = report.resource.resource_type.as_str(),
            resource_id = report.resource.resource_id,
            upload = report.upload,
            download = report.download,
            "traffic recorded"
        );
        Ok(())
    }
}
