use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::entity::{AccountingPeriod, QuotaCheck, ResourceRef};
use crate::domain::service::evaluate_quota;
use crate::usecase::get_period_usage::{
    GetPeriodUsageError, GetPeriodUsageInput, GetPeriodUsageUseCase,
};

#[derive(Debug, Clone)]
pub struct CheckQuotaInput {
    pub subscription_id: u64,
    /// 指定時はそのノードの使用量のみで判定する。
    pub resource_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckQuotaOutput {
    pub check: QuotaCheck,
    pub period: AccountingPeriod,
    /// いずれかのレイヤーが縮退した状態で算出された場合 true。
    pub degraded: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckQuotaError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("usage unavailable: {0}")]
    Unavailable(String),

    #[error("quota check cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<GetPeriodUsageError> for CheckQuotaError {
    fn from(e: GetPeriodUsageError) -> Self {
        match e {
            GetPeriodUsageError::NotFound(msg) => CheckQuotaError::NotFound(msg),
            GetPeriodUsageError::InvalidConfiguration(msg) => {
                CheckQuotaError::InvalidConfiguration(msg)
            }
            e @ GetPeriodUsageError::Unavailable { .. } => {
                CheckQuotaError::Unavailable(e.to_string())
            }
            GetPeriodUsageError::Cancelled => CheckQuotaError::Cancelled,
            GetPeriodUsageError::Internal(msg) => CheckQuotaError::Internal(msg),
        }
    }
}

/// CheckQuotaUseCase は現在期間の使用量をプラン上限と比較する。
pub struct CheckQuotaUseCase {
    usage: Arc<GetPeriodUsageUseCase>,
}

impl CheckQuotaUseCase {
    pub fn new(usage: Arc<GetPeriodUsageUseCase>) -> Self {
        Self { usage }
    }

    pub async fn execute(
        &self,
        input: &CheckQuotaInput,
        cancel: &CancellationToken,
    ) -> Result<CheckQuotaOutput, CheckQuotaError> {
        self.execute_at(input, Utc::now(), cancel).await
    }

    pub async fn execute_at(
        &self,
        input: &CheckQuotaInput,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<CheckQuotaOutput, CheckQuotaError> {
        let usage_input = GetPeriodUsageInput {
            subscription_id: input.subscription_id,
            resource: input.resource_id.map(ResourceRef::node),
        };
        let usage = self.usage.execute_at(&usage_input, now, cancel).await?;
        let check = evaluate_quota(&usage.usage, usage.limit);

        if check.exceeded {
            info!(
                subscription_id = input.subscription_id,
                resource_id = ?input.resource_id,
                total_used = check.total_used,
                limit = check.limit,
                "traffic quota exceeded"
            );
        }

        Ok(CheckQuotaOutput {
            check,
            period: usage.period,
            degraded: usage.is_degraded(),
        })
    }
}
