use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::adapter::repository::{
    PlanPostgresLookup, SubscriptionPostgresLookup, TrafficStatsPostgresStore,
};
use crate::domain::repository::{
    BatchLayerStore, PlanLookup, QuotaCacheStore, SpeedLayerStore, SubscriptionLookup,
};
use crate::domain::service::PeriodResolver;
use crate::infrastructure::config::{AccountingSettings, Config, TaskQueueConfig};
use crate::infrastructure::in_memory::{
    InMemoryBatchLayerStore, InMemoryPlanLookup, InMemoryQuotaCacheStore,
    InMemorySpeedLayerStore, InMemorySubscriptionLookup,
};
use crate::infrastructure::redis_quota_cache::RedisQuotaCacheStore;
use crate::infrastructure::redis_speed_layer::RedisSpeedLayerStore;
use crate::usecase::{
    BatchLayerReader, CheckQuotaUseCase, GetPeriodUsageUseCase, QuotaCacheSyncUseCase,
    RecordTrafficUseCase, SpeedLayerReader, SubscriptionEventDispatcher,
};

/// Stores は各ポートの実装をまとめたもの。
pub struct Stores {
    pub speed_layer: Arc<dyn SpeedLayerStore>,
    pub batch_layer: Arc<dyn BatchLayerStore>,
    pub quota_cache: Arc<dyn QuotaCacheStore>,
    pub plans: Arc<dyn PlanLookup>,
    pub subscriptions: Arc<dyn SubscriptionLookup>,
}

impl Stores {
    pub fn in_memory(settings: &AccountingSettings) -> Self {
        Self {
            speed_layer: Arc::new(InMemorySpeedLayerStore::new(settings.calendar)),
            batch_layer: Arc::new(InMemoryBatchLayerStore::new()),
            quota_cache: Arc::new(InMemoryQuotaCacheStore::new()),
            plans: Arc::new(InMemoryPlanLookup::new()),
            subscriptions: Arc::new(InMemorySubscriptionLookup::new()),
        }
    }
}

/// Services はユースケースとイベントディスパッチャをまとめたもの。
pub struct Services {
    pub check_quota: Arc<CheckQuotaUseCase>,
    pub get_period_usage: Arc<GetPeriodUsageUseCase>,
    pub record_traffic: Arc<RecordTrafficUseCase>,
    pub quota_cache_sync: Arc<QuotaCacheSyncUseCase>,
    pub subscription_events: Arc<SubscriptionEventDispatcher>,
}

impl Services {
    /// ワーカーを起動するため tokio ランタイム内で呼び出すこと。
    pub fn new(settings: &AccountingSettings, task_queue: &TaskQueueConfig, stores: Stores) -> Self {
        let resolver = PeriodResolver::new(settings.calendar);
        let get_period_usage = Arc::new(GetPeriodUsageUseCase::new(
            stores.subscriptions.clone(),
            stores.plans.clone(),
            SpeedLayerReader::new(stores.speed_layer.clone(), settings.read_timeout),
            BatchLayerReader::new(
                stores.batch_layer.clone(),
                settings.calendar,
                settings.read_timeout,
            ),
            resolver,
        ));
        let quota_cache_sync = Arc::new(QuotaCacheSyncUseCase::new(
            stores.subscriptions,
            stores.plans,
            stores.quota_cache,
            resolver,
        ));
        let subscription_events = Arc::new(SubscriptionEventDispatcher::start(
            quota_cache_sync.clone(),
            task_queue.workers,
            task_queue.capacity,
        ));

        Self {
            check_quota: Arc::new(CheckQuotaUseCase::new(get_period_usage.clone())),
            get_period_usage,
            record_traffic: Arc::new(RecordTrafficUseCase::new(stores.speed_layer)),
            quota_cache_sync,
            subscription_events,
        }
    }

    pub async fn shutdown(&self) {
        self.subscription_events.shutdown().await;
    }
}

/// build_services は設定に従ってストアへ接続し、ユースケースを組み立てる。
///
/// Redis / PostgreSQL が未設定または接続できない場合は InMemory 実装にフォールバックする。
pub async fn build_services(cfg: &Config) -> anyhow::Result<Services> {
    let settings = cfg.accounting.settings()?;
    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        business_timezone = %settings.calendar.timezone(),
        "building traffic accounting services"
    );

    let mut stores = Stores::in_memory(&settings);

    if let Some(ref redis_cfg) = cfg.redis {
        info!(url = %redis_cfg.url, "connecting to Redis for speed layer and quota cache");
        match connect_redis(&redis_cfg.url, redis_cfg.connect_timeout_seconds).await {
            Ok(conn) => {
                info!("Redis connection established");
                stores.speed_layer = Arc::new(RedisSpeedLayerStore::new(
                    conn.clone(),
                    redis_cfg.key_prefix.clone(),
                    settings.calendar,
                    settings.speed_layer_ttl,
                ));
                stores.quota_cache = Arc::new(RedisQuotaCacheStore::new(
                    conn,
                    cfg.quota_cache.key_prefix.clone(),
                    cfg.quota_cache.ttl_secs,
                ));
            }
            Err(e) => {
                warn!(error = %e, "failed to connect to Redis, falling back to InMemory");
            }
        }
    } else {
        info!("no Redis config found, using InMemory speed layer and quota cache");
    }

    if let Some(ref db_cfg) = cfg.database {
        info!("connecting to PostgreSQL");
        match crate::infrastructure::database::create_pool(db_cfg).await {
            Ok(pool) => {
                let pool = Arc::new(pool);
                info!("PostgreSQL connection pool created successfully");
                stores.batch_layer = Arc::new(TrafficStatsPostgresStore::new(pool.clone()));
                stores.plans = Arc::new(PlanPostgresLookup::new(pool.clone()));
                stores.subscriptions = Arc::new(SubscriptionPostgresLookup::new(pool));
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "failed to connect to PostgreSQL, falling back to InMemory"
                );
            }
        }
    } else {
        info!("no database config found, using InMemory batch layer and lookups");
    }

    Ok(Services::new(&settings, &cfg.task_queue, stores))
}

async fn connect_redis(
    url: &str,
    timeout_secs: u64,
) -> anyhow::Result<redis::aio::ConnectionManager> {
    let client = redis::Client::open(url)?;
    let conn = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        redis::aio::ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timed out after {}s", timeout_secs))??;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_services_without_stores_uses_in_memory() {
        let cfg = Config::from_yaml("app:\n  name: traffic-accounting\n").unwrap();
        let services = build_services(&cfg).await.unwrap();
        assert!(services
            .quota_cache_sync
            .load_by_id(1)
            .await
            .unwrap()
            .is_none());
        services.shutdown().await;
    }

    #[tokio::test]
    async fn test_build_services_rejects_invalid_timezone() {
        let cfg = Config::from_yaml(
            "app:\n  name: traffic-accounting\naccounting:\n  business_timezone: Nowhere/City\n",
        )
        .unwrap();
        assert!(build_services(&cfg).await.is_err());
    }
}
