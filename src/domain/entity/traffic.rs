use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ResourceType はトラフィックを報告するリソース種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Node,
}

impl ResourceType {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Node => "node",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "node" => Some(ResourceType::Node),
            _ => None,
        }
    }
}

/// ResourceRef は単一リソース（プロキシノード等）の参照。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub resource_id: u64,
}

impl ResourceRef {
    pub fn node(resource_id: u64) -> Self {
        Self {
            resource_type: ResourceType::Node,
            resource_id,
        }
    }
}

/// TrafficPoint はスピードレイヤーの1時間単位のトラフィックカウンター。
///
/// `resource` が None の場合はサブスクリプション全体のロールアップ値。
/// ストアのインクリメント命令が符号付き 64bit のため、カウンターも i64 で保持する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficPoint {
    pub subscription_id: u64,
    pub resource: Option<ResourceRef>,
    pub period_hour: DateTime<Utc>,
    pub upload: i64,
    pub download: i64,
}

impl TrafficPoint {
    /// 負値を含む破損ポイントの場合は None を返す。
    pub fn normalized(&self) -> Option<(u64, u64)> {
        let upload = u64::try_from(self.upload).ok()?;
        let download = u64::try_from(self.download).ok()?;
        Some((upload, download))
    }
}

/// HistoricalAggregate はバッチレイヤーの日次集計の合計値。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalAggregate {
    pub upload: u64,
    pub download: u64,
    pub total: u64,
}

/// UsageResult は期間内の使用量。total は常に upload + download から導出する。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageResult {
    pub upload: u64,
    pub download: u64,
    pub total: u64,
}

impl UsageResult {
    pub fn new(upload: u64, download: u64) -> Self {
        Self {
            upload,
            download,
            total: upload.saturating_add(download),
        }
    }
}

/// TrafficReport はノードから報告されるトラフィック増分。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficReport {
    pub subscription_id: u64,
    pub resource: ResourceRef,
    pub upload: u64,
    pub download: u64,
    pub reported_at: DateTime<Utc>,
}
