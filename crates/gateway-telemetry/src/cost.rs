//! Cost tracking against daily and monthly budgets.
//!
//! Provides:
//! - A per-model price table (USD per million tokens) with a fallback price
//! - A ledger of daily, monthly and lifetime spend
//! - Budget checks and status reporting
//!
//! Period boundaries are evaluated lazily in UTC: the first access after
//! midnight zeroes the daily spend, the first access in a new month zeroes the
//! monthly spend.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use gateway_core::{GatewayError, GatewayResult, Usage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Price of a model in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per million prompt tokens
    pub input_per_million: f64,
    /// Cost per million completion tokens
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Create pricing; negative prices are clamped to zero
    #[must_use]
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million: input_per_million.max(0.0),
            output_per_million: output_per_million.max(0.0),
        }
    }

    /// Calculate cost for given usage
    #[must_use]
    pub fn calculate_cost(&self, usage: &Usage) -> f64 {
        let input = f64::from(usage.prompt_tokens) / 1_000_000.0 * self.input_per_million;
        let output = f64::from(usage.completion_tokens) / 1_000_000.0 * self.output_per_million;
        input + output
    }
}

/// Pricing used for models missing from the table
pub const FALLBACK_PRICING: ModelPricing = ModelPricing {
    input_per_million: 1.0,
    output_per_million: 3.0,
};

const BUILTIN_PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4-turbo", 10.00, 30.00),
    ("gpt-4", 30.00, 60.00),
    ("gpt-3.5-turbo", 0.50, 1.50),
    ("o1", 15.00, 60.00),
    ("o1-mini", 3.00, 12.00),
    ("claude-sonnet-4-20250514", 3.00, 15.00),
    ("claude-3-5-sonnet-20241022", 3.00, 15.00),
    ("claude-3-opus-20240229", 15.00, 75.00),
    ("claude-3-haiku-20240307", 0.25, 1.25),
    ("openai/gpt-4o", 2.50, 10.00),
    ("openai/gpt-4o-mini", 0.15, 0.60),
    ("anthropic/claude-sonnet-4-20250514", 3.00, 15.00),
    ("anthropic/claude-3-5-sonnet", 3.00, 15.00),
    ("anthropic/claude-3-haiku", 0.25, 1.25),
    ("meta-llama/llama-3-70b-instruct", 0.59, 0.79),
    ("google/gemini-pro-1.5", 1.25, 5.00),
];

/// Model price lookup
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<String, ModelPricing>,
    fallback: ModelPricing,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PriceTable {
    /// Table with common hosted models
    #[must_use]
    pub fn builtin() -> Self {
        let prices = BUILTIN_PRICES
            .iter()
            .map(|&(model, input, output)| (model.to_string(), ModelPricing::new(input, output)))
            .collect();
        Self {
            prices,
            fallback: FALLBACK_PRICING,
        }
    }

    /// Table with no entries; every model uses `fallback`
    #[must_use]
    pub fn empty(fallback: ModelPricing) -> Self {
        Self {
            prices: HashMap::new(),
            fallback,
        }
    }

    /// Add or replace a model price
    #[must_use]
    pub fn with_price(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.prices.insert(model.into(), pricing);
        self
    }

    /// Price for a model, falling back to the default
    #[must_use]
    pub fn get(&self, model: &str) -> ModelPricing {
        self.prices.get(model).copied().unwrap_or(self.fallback)
    }

    /// Whether the model has an explicit price
    #[must_use]
    pub fn contains(&self, model: &str) -> bool {
        self.prices.contains_key(model)
    }

    /// Cost of a usage record
    #[must_use]
    pub fn cost(&self, model: &str, usage: &Usage) -> f64 {
        self.get(model).calculate_cost(usage)
    }
}

/// Cost tracking configuration
#[derive(Debug, Clone)]
pub struct CostConfig {
    /// Daily budget in USD; zero disables the daily limit
    pub daily_budget: f64,
    /// Monthly budget in USD; zero disables the monthly limit
    pub monthly_budget: f64,
    /// Model prices
    pub prices: PriceTable,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            daily_budget: 50.0,
            monthly_budget: 500.0,
            prices: PriceTable::builtin(),
        }
    }
}

impl CostConfig {
    /// Create a new cost configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both budgets
    #[must_use]
    pub fn with_budgets(mut self, daily: f64, monthly: f64) -> Self {
        self.daily_budget = daily.max(0.0);
        self.monthly_budget = monthly.max(0.0);
        self
    }

    /// Replace the price table
    #[must_use]
    pub fn with_prices(mut self, prices: PriceTable) -> Self {
        self.prices = prices;
        self
    }
}

/// Snapshot of spend against budgets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostStatus {
    /// Spend since UTC midnight
    pub daily_spend: f64,
    /// Daily budget
    pub daily_budget: f64,
    /// Budget left today
    pub daily_remaining: f64,
    /// Percentage of the daily budget consumed
    pub daily_percent: f64,
    /// Spend since the first of the month
    pub monthly_spend: f64,
    /// Monthly budget
    pub monthly_budget: f64,
    /// Budget left this month
    pub monthly_remaining: f64,
    /// Percentage of the monthly budget consumed
    pub monthly_percent: f64,
    /// Lifetime spend
    pub total_spend: f64,
    /// Recorded requests
    pub request_count: u64,
    /// Recorded tokens
    pub token_count: u64,
    /// Lifetime spend per provider
    pub by_provider: HashMap<String, f64>,
}

#[derive(Debug)]
struct CostLedger {
    daily_spend: f64,
    monthly_spend: f64,
    total_spend: f64,
    request_count: u64,
    token_count: u64,
    by_provider: HashMap<String, f64>,
    day: NaiveDate,
    month: (i32, u32),
}

impl CostLedger {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            daily_spend: 0.0,
            monthly_spend: 0.0,
            total_spend: 0.0,
            request_count: 0,
            token_count: 0,
            by_provider: HashMap::new(),
            day: now.date_naive(),
            month: (now.year(), now.month()),
        }
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.day {
            debug!(previous = %self.day, spend = self.daily_spend, "Daily spend reset");
            self.daily_spend = 0.0;
            self.day = today;
        }
        let month = (now.year(), now.month());
        if month != self.month {
            debug!(spend = self.monthly_spend, "Monthly spend reset");
            self.monthly_spend = 0.0;
            self.month = month;
        }
    }
}

fn percent(spend: f64, budget: f64) -> f64 {
    if budget > 0.0 {
        spend / budget * 100.0
    } else {
        0.0
    }
}

/// Shared ledger of LLM spend
#[derive(Debug)]
pub struct CostTracker {
    config: CostConfig,
    ledger: Mutex<CostLedger>,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new(CostConfig::default())
    }
}

impl CostTracker {
    /// Create a new cost tracker
    #[must_use]
    pub fn new(config: CostConfig) -> Self {
        Self {
            config,
            ledger: Mutex::new(CostLedger::new(Utc::now())),
        }
    }

    /// Create a tracker with the given budgets and built-in prices
    #[must_use]
    pub fn with_budgets(daily: f64, monthly: f64) -> Self {
        Self::new(CostConfig::default().with_budgets(daily, monthly))
    }

    /// Price table in use
    #[must_use]
    pub fn prices(&self) -> &PriceTable {
        &self.config.prices
    }

    /// Cost a usage record would incur, without recording it
    #[must_use]
    pub fn estimate(&self, model: &str, usage: &Usage) -> f64 {
        self.config.prices.cost(model, usage)
    }

    /// Record usage and return its cost
    pub fn record_usage(&self, provider: &str, model: &str, usage: &Usage) -> f64 {
        self.record_usage_at(provider, model, usage, Utc::now())
    }

    /// Record usage as of `now`
    pub fn record_usage_at(
        &self,
        provider: &str,
        model: &str,
        usage: &Usage,
        now: DateTime<Utc>,
    ) -> f64 {
        let cost = self.estimate(model, usage);
        let mut ledger = self.ledger.lock();
        ledger.roll(now);
        ledger.daily_spend += cost;
        ledger.monthly_spend += cost;
        ledger.total_spend += cost;
        ledger.request_count += 1;
        ledger.token_count += u64::from(usage.total_tokens);
        *ledger.by_provider.entry(provider.to_string()).or_insert(0.0) += cost;

        let daily = ledger.daily_spend;
        drop(ledger);

        debug!(
            provider = %provider,
            model = %model,
            tokens = usage.total_tokens,
            cost = cost,
            daily_spend = daily,
            "Recorded usage"
        );
        if self.config.daily_budget > 0.0 && daily > self.config.daily_budget {
            warn!(
                daily_spend = daily,
                daily_budget = self.config.daily_budget,
                "Daily budget exceeded"
            );
        }
        cost
    }

    /// Current spend against budgets
    #[must_use]
    pub fn status(&self) -> CostStatus {
        self.status_at(Utc::now())
    }

    /// Spend against budgets as of `now`
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> CostStatus {
        let mut ledger = self.ledger.lock();
        ledger.roll(now);
        let daily_budget = self.config.daily_budget;
        let monthly_budget = self.config.monthly_budget;
        CostStatus {
            daily_spend: ledger.daily_spend,
            daily_budget,
            daily_remaining: (daily_budget - ledger.daily_spend).max(0.0),
            daily_percent: percent(ledger.daily_spend, daily_budget),
            monthly_spend: ledger.monthly_spend,
            monthly_budget,
            monthly_remaining: (monthly_budget - ledger.monthly_spend).max(0.0),
            monthly_percent: percent(ledger.monthly_spend, monthly_budget),
            total_spend: ledger.total_spend,
            request_count: ledger.request_count,
            token_count: ledger.token_count,
            by_provider: ledger.by_provider.clone(),
        }
    }

    /// Check whether `estimated` more spend fits in both budgets
    pub fn check_budget(&self, estimated: f64) -> GatewayResult<()> {
        self.check_budget_at(estimated, Utc::now())
    }

    /// Budget check as of `now`; the daily budget is checked first
    pub fn check_budget_at(&self, estimated: f64, now: DateTime<Utc>) -> GatewayResult<()> {
        let mut ledger = self.ledger.lock();
        ledger.roll(now);
        let estimated = estimated.max(0.0);

        let daily_budget = self.config.daily_budget;
        if daily_budget > 0.0 && ledger.daily_spend + estimated > daily_budget {
            return Err(GatewayError::BudgetExceeded {
                period: "daily",
                spend: ledger.daily_spend,
                budget: daily_budget,
            });
        }

        let monthly_budget = self.config.monthly_budget;
        if monthly_budget > 0.0 && ledger.monthly_spend + estimated > monthly_budget {
            return Err(GatewayError::BudgetExceeded {
                period: "monthly",
                spend: ledger.monthly_spend,
                budget: monthly_budget,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_model_pricing() {
        let pricing = ModelPricing::new(3.0, 15.0);
        let cost = pricing.calculate_cost(&Usage::new(1_000_000, 1_000_000));
        assert!((cost - 18.0).abs() < 1e-9);
        assert!((ModelPricing::new(-1.0, 2.0).input_per_million).abs() < f64::EPSILON);
    }

    #[test]
    fn test_price_table_fallback() {
        let prices = PriceTable::builtin();
        assert!(prices.contains("gpt-4o"));
        assert_eq!(prices.get("no-such-model"), FALLBACK_PRICING);
        let custom = PriceTable::empty(ModelPricing::new(0.0, 0.0)).with_price("x", ModelPricing::new(1.0, 1.0));
        assert!((custom.cost("y", &Usage::new(10, 10))).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_usage_exact() {
        let prices = PriceTable::empty(FALLBACK_PRICING).with_price("m", ModelPricing::new(2.0, 4.0));
        let tracker = CostTracker::new(CostConfig::default().with_prices(prices));
        let now = at(2024, 3, 10, 12);

        let cost = tracker.record_usage_at("p", "m", &Usage::new(500_000, 250_000), now);
        assert!((cost - 2.0).abs() < 1e-9);

        let status = tracker.status_at(now);
        assert!((status.daily_spend - 2.0).abs() < 1e-9);
        assert!((status.monthly_spend - 2.0).abs() < 1e-9);
        assert!((status.daily_percent - 4.0).abs() < 1e-9);
        assert!((status.daily_remaining - 48.0).abs() < 1e-9);
        assert_eq!(status.request_count, 1);
        assert_eq!(status.token_count, 750_000);
        assert!((status.by_provider["p"] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_reset_keeps_monthly() {
        let prices = PriceTable::empty(ModelPricing::new(1_000_000.0, 0.0));
        let tracker = CostTracker::new(CostConfig::default().with_prices(prices));

        tracker.record_usage_at("p", "m", &Usage::new(1, 0), at(2024, 3, 10, 23));
        let next_day = at(2024, 3, 11, 0);
        let status = tracker.status_at(next_day);
        assert!(status.daily_spend.abs() < f64::EPSILON);
        assert!((status.monthly_spend - 1.0).abs() < 1e-9);
        assert!((status.total_spend - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_monthly_reset() {
        let prices = PriceTable::empty(ModelPricing::new(1_000_000.0, 0.0));
        let tracker = CostTracker::new(CostConfig::default().with_prices(prices));

        tracker.record_usage_at("p", "m", &Usage::new(3, 0), at(2024, 1, 31, 22));
        let status = tracker.status_at(at(2024, 2, 1, 1));
        assert!(status.daily_spend.abs() < f64::EPSILON);
        assert!(status.monthly_spend.abs() < f64::EPSILON);
        assert!((status.total_spend - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_check_budget() {
        let prices = PriceTable::empty(ModelPricing::new(1_000_000.0, 0.0));
        let tracker = CostTracker::new(CostConfig::default().with_budgets(5.0, 8.0).with_prices(prices));
        let day1 = at(2024, 5, 1, 9);

        tracker.record_usage_at("p", "m", &Usage::new(4, 0), day1);
        assert!(tracker.check_budget_at(1.0, day1).is_ok());
        let err = tracker.check_budget_at(1.5, day1).unwrap_err();
        assert!(matches!(err, GatewayError::BudgetExceeded { period: "daily", .. }));

        let day2 = at(2024, 5, 2, 9);
        tracker.record_usage_at("p", "m", &Usage::new(4, 0), day2);
        let err = tracker.check_budget_at(0.5, day2).unwrap_err();
        assert!(matches!(err, GatewayError::BudgetExceeded { period: "monthly", .. }));
    }

    #[test]
    fn test_zero_budget_is_unlimited() {
        let tracker = CostTracker::with_budgets(0.0, 0.0);
        let now = at(2024, 5, 1, 9);
        tracker.record_usage_at("p", "gpt-4", &Usage::new(1_000_000, 1_000_000), now);
        assert!(tracker.check_budget_at(1_000.0, now).is_ok());
        assert!(tracker.status_at(now).daily_percent.abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_recording() {
        let prices = PriceTable::empty(ModelPricing::new(1_000_000.0, 0.0));
        let tracker = std::sync::Arc::new(CostTracker::new(CostConfig::default().with_prices(prices)));
        let now = at(2024, 5, 1, 9);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = std::sync::Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record_usage_at("p", "m", &Usage::new(1, 0), now);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let status = tracker.status_at(now);
        assert_eq!(status.request_count, 800);
        assert!((status.daily_spend - 800.0).abs() < 1e-6);
    }
}
