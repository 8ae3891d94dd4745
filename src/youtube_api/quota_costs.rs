//! # YouTube Data API v3 配额消耗表
//!
//! 每个 resource method 对应一次调用扣除的配额单位，未登记的方法按 1 计。

use anyhow::Result;
use lazy_static::lazy_static;
use std::collections::HashMap;

pub const DEFAULT_QUOTA_COST: i64 = 1;

lazy_static! {
    static ref YOUTUBE_API_QUOTA_COSTS: HashMap<&'static str, i64> = {
        let mut m = HashMap::new();
        m.insert("activities.list", 1);
        m.insert("captions.list", 50);
        m.insert("captions.insert", 400);
        m.insert("captions.update", 450);
        m.insert("captions.delete", 50);
        m.insert("captions.download", 200);
        m.insert("channelBanners.insert", 50);
        m.insert("channels.list", 1);
        m.insert("channels.update", 50);
        m.insert("channelSections.list", 1);
        m.insert("channelSections.insert", 50);
        m.insert("channelSections.update", 50);
        m.insert("channelSections.delete", 50);
        m.insert("comments.list", 1);
        m.insert("comments.insert", 50);
        m.insert("comments.update", 50);
        m.insert("comments.setModerationStatus", 50);
        m.insert("comments.delete", 50);
        m.insert("commentThreads.list", 1);
        m.insert("commentThreads.insert", 50);
        m.insert("i18nLanguages.list", 1);
        m.insert("i18nRegions.list", 1);
        m.insert("members.list", 2);
        m.insert("membershipsLevels.list", 1);
        m.insert("playlistItems.list", 1);
        m.insert("playlistItems.insert", 50);
        m.insert("playlistItems.update", 50);
        m.insert("playlistItems.delete", 50);
        m.insert("playlists.list", 1);
        m.insert("playlists.insert", 50);
        m.insert("playlists.update", 50);
        m.insert("playlists.delete", 50);
        m.insert("search.list", 100);
        m.insert("subscriptions.list", 1);
        m.insert("subscriptions.insert", 50);
        m.insert("subscriptions.delete", 50);
        m.insert("thumbnails.set", 50);
        m.insert("videoAbuseReportReasons.list", 1);
        m.insert("videoCategories.list", 1);
        m.insert("videos.list", 1);
        m.insert("videos.insert", 1600);
        m.insert("videos.update", 50);
        m.insert("videos.rate", 50);
        m.insert("videos.getRating", 1);
        m.insert("videos.reportAbuse", 50);
        m.insert("videos.delete", 50);
        m.insert("watermarks.set", 50);
        m.insert("watermarks.unset", 50);
        m
    };
}

/// resource method → 配额消耗
///
/// 默认使用官方消耗表，可按部署覆盖个别方法。
#[derive(Debug, Clone, Default)]
pub struct QuotaCostTable {
    overrides: HashMap<String, i64>,
}

impl QuotaCostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost(mut self, resource_method: impl Into<String>, cost: i64) -> Self {
        self.overrides.insert(resource_method.into(), cost);
        self
    }

    /// 配额只增不减，覆盖值不能为负
    pub fn validate(&self) -> Result<()> {
        if let Some((method, cost)) = self.overrides.iter().find(|(_, cost)| **cost < 0) {
            anyhow::bail!("quota cost for {} must not be negative (got {})", method, cost);
        }
        Ok(())
    }

    pub fn cost_of(&self, resource_method: &str) -> i64 {
        self.overrides
            .get(resource_method)
            .or_else(|| YOUTUBE_API_QUOTA_COSTS.get(resource_method))
            .copied()
            .unwrap_or(DEFAULT_QUOTA_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_costs() {
        let table = QuotaCostTable::new();
        assert_eq!(table.cost_of("videos.list"), 1);
        assert_eq!(table.cost_of("search.list"), 100);
        assert_eq!(table.cost_of("videos.insert"), 1600);
    }

    #[test]
    fn test_unknown_method_defaults_to_one() {
        let table = QuotaCostTable::new();
        assert_eq!(table.cost_of("nonexistent.method"), DEFAULT_QUOTA_COST);
        assert_eq!(table.cost_of(""), DEFAULT_QUOTA_COST);
    }

    #[test]
    fn test_override_takes_precedence() {
        let table = QuotaCostTable::new()
            .with_cost("videos.insert", 100)
            .with_cost("custom.call", 7);
        assert_eq!(table.cost_of("videos.insert"), 100);
        assert_eq!(table.cost_of("custom.call"), 7);
        assert_eq!(table.cost_of("search.list"), 100);
    }

    #[test]
    fn test_negative_override_rejected() {
        assert!(QuotaCostTable::new().with_cost("videos.list", 0).validate().is_ok());
        let table = QuotaCostTable::new().with_cost("videos.list", -500);
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("videos.list"));
    }
}
