use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

/// Operational counters for the settlement pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementCounters {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub matches_settled: u64,
    pub bets_settled: u64,
    pub bets_won: u64,
    pub bets_lost: u64,
    pub unresolved_special_markets: u64,
    pub settlement_failures: u64,
    pub notifications_dispatched: u64,
    pub notification_failures: u64,
    pub settlement_latency_ms: f64,
}

#[derive(Clone)]
pub struct MetricsCollector {
    start_time: Instant,
    counters: Arc<RwLock<SettlementCounters>>,
    latencies_ms: Arc<RwLock<HashMap<String, Vec<f64>>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let counters = SettlementCounters {
            timestamp: Utc::now(),
            uptime_seconds: 0,
            matches_settled: 0,
            bets_settled: 0,
            bets_won: 0,
            bets_lost: 0,
            unresolved_special_markets: 0,
            settlement_failures: 0,
            notifications_dispatched: 0,
            notification_failures: 0,
            settlement_latency_ms: 0.0,
        };

        Self {
            start_time: Instant::now(),
            counters: Arc::new(RwLock::new(counters)),
            latencies_ms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn record_match_settled(&self, won: u64, lost: u64, unresolved: u64, failures: u64) {
        let mut counters = self.counters.write().await;
        counters.matches_settled += 1;
        counters.bets_settled += won + lost;
        counters.bets_won += won;
        counters.bets_lost += lost;
        counters.unresolved_special_markets += unresolved;
        counters.settlement_failures += failures;
        counters.timestamp = Utc::now();
        counters.uptime_seconds = self.start_time.elapsed().as_secs();
    }

    pub async fn record_notification(&self, delivered: bool) {
        let mut counters = self.counters.write().await;
        if delivered {
            counters.notifications_dispatched += 1;
        } else {
            counters.notification_failures += 1;
        }
    }

    pub async fn record_latency(&self, operation: &str, elapsed_ms: f64) {
        let mut latencies = self.latencies_ms.write().await;
        let samples = latencies.entry(operation.to_string()).or_default();
        samples.push(elapsed_ms);
        // Rolling window of recent samples.
        if samples.len() > 1000 {
            samples.remove(0);
        }
        if operation == "settle_match" {
            let avg = samples.iter().sum::<f64>() / samples.len() as f64;
            self.counters.write().await.settlement_latency_ms = avg;
        }
    }

    pub async fn snapshot(&self) -> SettlementCounters {
        let mut counters = self.counters.read().await.clone();
        counters.uptime_seconds = self.start_time.elapsed().as_secs();
        counters
    }

    /// Spawn a background task logging the summary once a minute.
    pub fn start_periodic_summary(&self) {
        let collector = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));

            loop {
                interval.tick().await;
                collector.log_summary().await;
            }
        });
    }

    pub async fn log_summary(&self) {
        let counters = self.snapshot().await;
        info!(
            matches = counters.matches_settled,
            bets = counters.bets_settled,
            won = counters.bets_won,
            lost = counters.bets_lost,
            unresolved = counters.unresolved_special_markets,
            failures = counters.settlement_failures,
            avg_latency_ms = counters.settlement_latency_ms,
            "settlement metrics"
        );
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
