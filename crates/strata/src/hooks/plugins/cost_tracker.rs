//! Per-query cost accounting (afterQuery)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;

use crate::hooks::{HookPoint, HookResult, HookSet, Plugin, TurnResult};

/// Flat per-query price used for the monthly projection
const COST_PER_QUERY: f64 = 0.00075;
const DAYS_PER_MONTH: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub tokens: u32,
    pub cached: bool,
}

/// Aggregate view over every recorded query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostStats {
    pub total_queries: usize,
    /// Percentage of queries served with a fresh cache record
    pub cache_hit_rate: f64,
    pub avg_tokens_per_query: u64,
    /// `total_queries * 0.00075 * 30`
    pub estimated_monthly_cost: f64,
}

/// Records model, token estimate and cache use for every turn
#[derive(Default)]
pub struct CostTracker {
    records: TokioMutex<Vec<CostRecord>>,
}

impl CostTracker {
    pub const NAME: &'static str = "cost-tracker";

    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<CostRecord> {
        self.records.lock().await.clone()
    }

    pub async fn stats(&self) -> CostStats {
        let records = self.records.lock().await;
        let total = records.len();
        if total == 0 {
            return CostStats {
                total_queries: 0,
                cache_hit_rate: 0.0,
                avg_tokens_per_query: 0,
                estimated_monthly_cost: 0.0,
            };
        }

        let cached = records.iter().filter(|r| r.cached).count();
        let token_sum: u64 = records.iter().map(|r| u64::from(r.tokens)).sum();

        CostStats {
            total_queries: total,
            cache_hit_rate: cached as f64 / total as f64 * 100.0,
            avg_tokens_per_query: (token_sum as f64 / total as f64).round() as u64,
            estimated_monthly_cost: total as f64 * COST_PER_QUERY * DAYS_PER_MONTH,
        }
    }
}

#[async_trait]
impl Plugin for CostTracker {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn hooks(&self) -> HookSet {
        HookPoint::AfterQuery.into()
    }

    async fn after_query(&self, result: TurnResult) -> HookResult<TurnResult> {
        self.records.lock().await.push(CostRecord {
            timestamp: Utc::now(),
            model: result.model_name.clone(),
            tokens: result.metadata.tokens,
            cached: result.metadata.cached,
        });
        Ok(result)
    }
}
