use async_trait::async_trait;

use crate::domain::entity::CachedQuota;

/// QuotaCacheStore はサブスクリプション毎のクォータスナップショットを保持する（Redis）。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuotaCacheStore: Send + Sync {
    async fn get(&self, subscription_id: u64) -> anyhow::Result<Option<CachedQuota>>;

    /// スナップショット全体を置き換える。
    async fn set(&self, quota: &CachedQuota) -> anyhow::Result<()>;

    async fn invalidate(&self, subscription_id: u64) -> anyhow::Result<()>;

    /// suspended フラグのみを更新する。エントリが存在しない場合は作成せず false を返す。
    async fn set_suspended_flag(&self, subscription_id: u64, suspended: bool)
        -> anyhow::Result<bool>;
}
