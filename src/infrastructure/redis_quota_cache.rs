use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::Script;

use crate::domain::entity::CachedQuota;
use crate::domain::repository::QuotaCacheStore;

/// SET_SUSPENDED_SCRIPT はエントリが存在する場合のみ suspended フィールドを更新する。
///
/// KEYS[1]: クォータキー
/// ARGV[1]: "1" / "0"
///
/// Returns: 更新した場合 1、エントリが無い場合 0
const SET_SUSPENDED_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('HSET', KEYS[1], 'suspended', ARGV[1])
    return 1
end
return 0
"#;

/// RedisQuotaCacheStore はクォータスナップショットを Redis ハッシュで保持する。
///
/// ttl_secs が 0 の場合は期間終了時刻（EXPIREAT）で失効させる。
pub struct RedisQuotaCacheStore {
    conn: ConnectionManager,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisQuotaCacheStore {
    pub fn new(conn: ConnectionManager, key_prefix: String, ttl_secs: u64) -> Self {
        Self {
            conn,
            key_prefix,
            ttl_secs,
        }
    }

    fn make_key(&self, subscription_id: u64) -> String {
        format!("{}{}", self.key_prefix, subscription_id)
    }
}

#[async_trait]
impl QuotaCacheStore for RedisQuotaCacheStore {
    async fn get(&self, subscription_id: u64) -> anyhow::Result<Option<CachedQuota>> {
        let key = self.make_key(subscription_id);
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(&key)
            .query_async(&mut conn)
            .await?;
        if fields.is_empty() {
            return Ok(None);
        }
        from_fields(subscription_id, &fields)
            .map(Some)
            .with_context(|| format!("corrupt quota cache entry: {}", key))
    }

    async fn set(&self, quota: &CachedQuota) -> anyhow::Result<()> {
        let key = self.make_key(quota.subscription_id);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("DEL")
            .arg(&key)
            .ignore()
            .cmd("HSET")
            .arg(&key)
            .arg(to_fields(quota))
            .ignore();
        if self.ttl_secs > 0 {
            pipe.cmd("EXPIRE").arg(&key).arg(self.ttl_secs).ignore();
        } else {
            pipe.cmd("EXPIREAT")
                .arg(&key)
                .arg(quota.period_end.timestamp())
                .ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn invalidate(&self, subscription_id: u64) -> anyhow::Result<()> {
        let key = self.make_key(subscription_id);
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(&key)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_suspended_flag(
        &self,
        subscription_id: u64,
        suspended: bool,
    ) -> anyhow::Result<bool> {
        let key = self.make_key(subscription_id);
        let updated: i64 = Script::new(SET_SUSPENDED_SCRIPT)
            .key(&key)
            .arg(bool_field(suspended))
            .invoke_async(&mut self.conn.clone())
            .await?;
        Ok(updated == 1)
    }
}

fn bool_field(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn to_fields(quota: &CachedQuota) -> Vec<(&'static str, String)> {
    vec![
        ("limit", quota.limit.to_string()),
        ("period_start", quota.period_start.timestamp().to_string()),
        ("period_end", quota.period_end.timestamp().to_string()),
        ("plan_type", quota.plan_type.clone()),
        ("suspended", bool_field(quota.suspended).to_string()),
    ]
}

fn from_fields(
    subscription_id: u64,
    fields: &HashMap<String, String>,
) -> anyhow::Result<CachedQuota> {
    let get = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("missing field '{}'", name))
    };
    let timestamp = |name: &str| -> anyhow::Result<DateTime<Utc>> {
        let secs: i64 = get(name)?.parse()?;
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| anyhow::anyhow!("field '{}' out of range: {}", name, secs))
    };

    Ok(CachedQuota {
        subscription_id,
        limit: get("limit")?.parse()?,
        period_start: timestamp("period_start")?,
        period_end: timestamp("period_end")?,
        plan_type: get("plan_type")?.clone(),
        suspended: get("suspended")? == "1",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quota() -> CachedQuota {
        CachedQuota {
            subscription_id: 12,
            limit: 10 << 30,
            period_start: Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
            period_end: Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap(),
            plan_type: "monthly".to_string(),
            suspended: true,
        }
    }

    fn as_map(fields: Vec<(&'static str, String)>) -> HashMap<String, String> {
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_fields_preserve_snapshot() {
        let fields = as_map(to_fields(&quota()));
        assert_eq!(fields["suspended"], "1");
        assert_eq!(from_fields(12, &fields).unwrap(), quota());
    }

    #[test]
    fn test_missing_field_is_error() {
        let mut fields = as_map(to_fields(&quota()));
        fields.remove("period_end");
        let err = from_fields(12, &fields).unwrap_err();
        assert!(err.to_string().contains("period_end"));
    }

    #[test]
    fn test_non_numeric_limit_is_error() {
        let mut fields = as_map(to_fields(&quota()));
        fields.insert("limit".to_string(), "lots".to_string());
        assert!(from_fields(12, &fields).is_err());
    }
}
