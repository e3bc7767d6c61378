//! Spend history, end-of-month projection and budget alerts.

use crate::cost::{CostStatus, CostTracker};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Timelike, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Default number of snapshots kept (one day at one per minute)
pub const DEFAULT_MAX_HISTORY: usize = 1440;

/// Point-in-time copy of the ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSnapshot {
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Spend since UTC midnight
    pub daily_spend: f64,
    /// Spend this month
    pub monthly_spend: f64,
    /// Lifetime spend
    pub total_spend: f64,
    /// Lifetime requests
    pub request_count: u64,
    /// Lifetime tokens
    pub token_count: u64,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Informational
    Info,
    /// Approaching a limit
    Warning,
    /// Limit reached
    Critical,
}

/// Spending alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostAlert {
    /// Severity
    pub level: AlertLevel,
    /// Machine-readable kind, e.g. `daily_budget_90`
    #[serde(rename = "type")]
    pub kind: String,
    /// Human readable message
    pub message: String,
    /// Percentage of budget used (or projected)
    pub percent: f64,
    /// Spend (or projected spend)
    pub spend: f64,
    /// Budget the alert refers to
    pub budget: f64,
    /// Threshold that fired
    pub threshold: f64,
}

/// Linear end-of-month projection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostPrediction {
    /// Projected spend at month end
    pub predicted_monthly_total: f64,
    /// Spend so far this month
    pub current_monthly_spend: f64,
    /// Days elapsed, fractional
    pub days_elapsed: f64,
    /// Days remaining, fractional
    pub days_remaining: f64,
    /// Average daily spend so far
    pub daily_average: f64,
    /// 0.0 to 1.0
    pub confidence: f64,
    /// Whether the projection overruns the monthly budget
    pub will_exceed_budget: bool,
    /// Projection as a percentage of the monthly budget
    pub percent_of_budget: f64,
    /// Monthly budget
    pub monthly_budget: f64,
}

/// Budget thresholds checked per period, highest first
const DAILY_THRESHOLDS: &[(f64, AlertLevel)] = &[
    (100.0, AlertLevel::Critical),
    (90.0, AlertLevel::Warning),
    (75.0, AlertLevel::Info),
];
const MONTHLY_THRESHOLDS: &[(f64, AlertLevel)] = &[
    (100.0, AlertLevel::Critical),
    (90.0, AlertLevel::Warning),
    (75.0, AlertLevel::Info),
    (50.0, AlertLevel::Info),
];

/// Cost analytics over a [`CostTracker`]
#[derive(Debug)]
pub struct CostAnalytics {
    tracker: Arc<CostTracker>,
    history: RwLock<VecDeque<CostSnapshot>>,
    max_history: usize,
    /// Alert kinds active at the last `new_alerts` call
    announced: Mutex<HashSet<String>>,
}

impl CostAnalytics {
    /// Create analytics with the default history size
    #[must_use]
    pub fn new(tracker: Arc<CostTracker>) -> Self {
        Self::with_history(tracker, DEFAULT_MAX_HISTORY)
    }

    /// Create analytics keeping at most `max_history` snapshots
    #[must_use]
    pub fn with_history(tracker: Arc<CostTracker>, max_history: usize) -> Self {
        Self {
            tracker,
            history: RwLock::new(VecDeque::with_capacity(max_history.min(DEFAULT_MAX_HISTORY))),
            max_history: max_history.max(1),
            announced: Mutex::new(HashSet::new()),
        }
    }

    /// Underlying tracker
    #[must_use]
    pub fn tracker(&self) -> &Arc<CostTracker> {
        &self.tracker
    }

    /// Append a snapshot of the current ledger
    pub fn record_snapshot(&self) -> CostSnapshot {
        self.record_snapshot_at(Utc::now())
    }

    /// Append a snapshot taken at `now`
    pub fn record_snapshot_at(&self, now: DateTime<Utc>) -> CostSnapshot {
        let status = self.tracker.status_at(now);
        let snapshot = CostSnapshot {
            timestamp: now,
            daily_spend: status.daily_spend,
            monthly_spend: status.monthly_spend,
            total_spend: status.total_spend,
            request_count: status.request_count,
            token_count: status.token_count,
        };

        let mut history = self.history.write();
        history.push_back(snapshot.clone());
        while history.len() > self.max_history {
            history.pop_front();
        }
        snapshot
    }

    /// Snapshots taken at or after `since`
    #[must_use]
    pub fn history_since(&self, since: DateTime<Utc>) -> Vec<CostSnapshot> {
        self.history
            .read()
            .iter()
            .filter(|s| s.timestamp >= since)
            .cloned()
            .collect()
    }

    /// Number of stored snapshots
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Project month-end spend
    #[must_use]
    pub fn predict_monthly(&self) -> CostPrediction {
        self.predict_monthly_at(Utc::now())
    }

    /// Project month-end spend as of `now`
    #[must_use]
    pub fn predict_monthly_at(&self, now: DateTime<Utc>) -> CostPrediction {
        let status = self.tracker.status_at(now);
        self.predict_from(&status, now)
    }

    fn predict_from(&self, status: &CostStatus, now: DateTime<Utc>) -> CostPrediction {
        let days_in_month = f64::from(days_in_month(now.year(), now.month()));
        let days_elapsed = f64::from(now.day()) + f64::from(now.hour()) / 24.0;
        let days_remaining = (days_in_month - days_elapsed).max(0.0);

        let daily_average = status.monthly_spend / days_elapsed;
        let predicted = daily_average.mul_add(days_remaining, status.monthly_spend);
        let confidence = confidence(days_elapsed, self.history_len());

        let budget = status.monthly_budget;
        CostPrediction {
            predicted_monthly_total: predicted,
            current_monthly_spend: status.monthly_spend,
            days_elapsed,
            days_remaining,
            daily_average,
            confidence,
            will_exceed_budget: budget > 0.0 && predicted > budget,
            percent_of_budget: if budget > 0.0 { predicted / budget * 100.0 } else { 0.0 },
            monthly_budget: budget,
        }
    }

    /// Alerts for the current spend
    #[must_use]
    pub fn alerts(&self) -> Vec<CostAlert> {
        self.alerts_at(Utc::now())
    }

    /// Alerts that became active since the previous call
    pub fn new_alerts(&self) -> Vec<CostAlert> {
        self.new_alerts_at(Utc::now())
    }

    /// Alerts active at `now` that were not active at the previous call.
    ///
    /// An alert that clears, for example after the daily rollover, is
    /// reported again when it next becomes active.
    pub fn new_alerts_at(&self, now: DateTime<Utc>) -> Vec<CostAlert> {
        let active = self.alerts_at(now);
        let mut announced = self.announced.lock();
        let fresh = active
            .iter()
            .filter(|alert| !announced.contains(&alert.kind))
            .cloned()
            .collect();
        *announced = active.into_iter().map(|alert| alert.kind).collect();
        fresh
    }

    /// Alerts as of `now`: at most one per period, plus a projection alert
    #[must_use]
    pub fn alerts_at(&self, now: DateTime<Utc>) -> Vec<CostAlert> {
        let status = self.tracker.status_at(now);
        let mut alerts = Vec::new();

        if status.daily_budget > 0.0 {
            alerts.extend(threshold_alert(
                "daily",
                status.daily_percent,
                status.daily_spend,
                status.daily_budget,
                DAILY_THRESHOLDS,
            ));
        }
        if status.monthly_budget > 0.0 {
            alerts.extend(threshold_alert(
                "monthly",
                status.monthly_percent,
                status.monthly_spend,
                status.monthly_budget,
                MONTHLY_THRESHOLDS,
            ));

            let prediction = self.predict_from(&status, now);
            if prediction.will_exceed_budget {
                alerts.push(CostAlert {
                    level: AlertLevel::Warning,
                    kind: "predicted_budget_exceeded".to_string(),
                    message: "Predicted to exceed monthly budget".to_string(),
                    percent: prediction.percent_of_budget,
                    spend: prediction.predicted_monthly_total,
                    budget: status.monthly_budget,
                    threshold: 100.0,
                });
            }
        }
        alerts
    }
}

fn threshold_alert(
    period: &str,
    percent: f64,
    spend: f64,
    budget: f64,
    thresholds: &[(f64, AlertLevel)],
) -> Option<CostAlert> {
    let &(threshold, level) = thresholds.iter().find(|(t, _)| percent >= *t)?;
    let (kind, message) = if threshold >= 100.0 {
        (
            format!("{period}_budget_exceeded"),
            format!("{} budget exceeded", capitalize(period)),
        )
    } else {
        (
            format!("{period}_budget_{threshold:.0}"),
            format!("{} budget at {threshold:.0}%", capitalize(period)),
        )
    };
    Some(CostAlert {
        level,
        kind,
        message,
        percent,
        spend,
        budget,
        threshold,
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

/// More elapsed days and more history both raise confidence, capped at 1.0
fn confidence(days_elapsed: f64, history: usize) -> f64 {
    let days = (days_elapsed / 7.0).min(1.0);
    let samples = (history as f64 / DEFAULT_MAX_HISTORY as f64).min(1.0);
    0.7f64.mul_add(days, 0.3 * samples)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.checked_sub_signed(ChronoDuration::days(1)))
        .map_or(30, |last| last.day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{CostConfig, ModelPricing, PriceTable};
    use chrono::TimeZone;
    use gateway_core::Usage;

    /// One prompt token costs one dollar
    fn tracker(daily: f64, monthly: f64) -> Arc<CostTracker> {
        let prices = PriceTable::empty(ModelPricing::new(1_000_000.0, 0.0));
        Arc::new(CostTracker::new(
            CostConfig::default().with_budgets(daily, monthly).with_prices(prices),
        ))
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 12), 31);
        assert_eq!(days_in_month(2024, 4), 30);
    }

    #[test]
    fn test_history_is_bounded() {
        let analytics = CostAnalytics::with_history(tracker(10.0, 100.0), 3);
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        for minute in 0..5 {
            analytics.record_snapshot_at(now + ChronoDuration::minutes(minute));
        }
        assert_eq!(analytics.history_len(), 3);
        assert_eq!(analytics.history_since(now + ChronoDuration::minutes(3)).len(), 2);
    }

    #[test]
    fn test_prediction_is_linear() {
        let t = tracker(0.0, 300.0);
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap();
        t.record_usage_at("p", "m", &Usage::new(100, 0), now);

        let prediction = CostAnalytics::new(t).predict_monthly_at(now);
        assert!((prediction.daily_average - 10.0).abs() < 1e-9);
        assert!((prediction.predicted_monthly_total - 300.0).abs() < 1e-9);
        assert!(!prediction.will_exceed_budget);
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 1.0);
    }

    #[test]
    fn test_alerts_by_threshold() {
        let t = tracker(10.0, 1000.0);
        let now = Utc.with_ymd_and_hms(2024, 6, 28, 0, 0, 0).unwrap();
        t.record_usage_at("p", "m", &Usage::new(9, 0), now);

        let alerts = CostAnalytics::new(Arc::clone(&t)).alerts_at(now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, "daily_budget_90");
        assert_eq!(alerts[0].level, AlertLevel::Warning);

        t.record_usage_at("p", "m", &Usage::new(2, 0), now);
        let alerts = CostAnalytics::new(t).alerts_at(now);
        assert_eq!(alerts[0].kind, "daily_budget_exceeded");
        assert_eq!(alerts[0].level, AlertLevel::Critical);
    }

    #[test]
    fn test_new_alerts_fire_once_per_crossing() {
        let t = tracker(10.0, 1000.0);
        let analytics = CostAnalytics::new(Arc::clone(&t));
        let day = Utc.with_ymd_and_hms(2024, 6, 28, 0, 0, 0).unwrap();

        t.record_usage_at("p", "m", &Usage::new(9, 0), day);
        let fresh = analytics.new_alerts_at(day);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].kind, "daily_budget_90");
        assert!(analytics.new_alerts_at(day + ChronoDuration::minutes(1)).is_empty());

        t.record_usage_at("p", "m", &Usage::new(2, 0), day);
        let fresh = analytics.new_alerts_at(day + ChronoDuration::minutes(2));
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].kind, "daily_budget_exceeded");
        assert!(analytics.new_alerts_at(day + ChronoDuration::minutes(3)).is_empty());

        // Next day the 90% threshold is crossed afresh
        let next = day + ChronoDuration::days(1);
        t.record_usage_at("p", "m", &Usage::new(9, 0), next);
        let fresh = analytics.new_alerts_at(next);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].kind, "daily_budget_90");
    }

    #[test]
    fn test_predicted_overrun_alert() {
        let t = tracker(0.0, 100.0);
        let now = Utc.with_ymd_and_hms(2024, 6, 5, 0, 0, 0).unwrap();
        t.record_usage_at("p", "m", &Usage::new(40, 0), now);

        let alerts = CostAnalytics::new(t).alerts_at(now);
        assert!(alerts.iter().any(|a| a.kind == "predicted_budget_exceeded"));
        assert!(alerts.iter().all(|a| a.kind != "monthly_budget_50"));
    }
}
