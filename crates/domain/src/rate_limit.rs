//! Rolling points budget against the host's hourly and daily quotas
//!
//! Bluesky charges every record write against a points budget (5000 per hour,
//! 35000 per day; creating a post costs 3 points). The limiter keeps a ledger
//! of its own charges and refuses to spend past a safety margin.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::model::{LedgerEntry, RateDecision, RateUsage};
use crate::ports::Clock;

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Points the host allows per rolling hour
    pub hourly_budget: u32,
    /// Points the host allows per rolling day
    pub daily_budget: u32,
    /// Points charged for one publish
    pub points_per_publish: u32,
    /// Fraction of each budget that is never spent (0.0..1.0)
    pub safety_margin: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            hourly_budget: 5000,
            daily_budget: 35000,
            points_per_publish: 3,
            safety_margin: 0.05,
        }
    }
}

impl RateLimitConfig {
    /// Budget actually available once the margin is reserved
    pub fn effective_hourly(&self) -> u32 {
        effective(self.hourly_budget, self.safety_margin)
    }

    pub fn effective_daily(&self) -> u32 {
        effective(self.daily_budget, self.safety_margin)
    }

    pub fn validate(&self) -> Result<(), RateLimitConfigError> {
        if !(0.0..1.0).contains(&self.safety_margin) {
            return Err(RateLimitConfigError::Margin(self.safety_margin));
        }
        if self.hourly_budget == 0 || self.daily_budget == 0 {
            return Err(RateLimitConfigError::ZeroBudget);
        }
        if self.points_per_publish == 0 {
            return Err(RateLimitConfigError::ZeroCost);
        }
        let smallest = self.effective_hourly().min(self.effective_daily());
        if self.points_per_publish > smallest {
            return Err(RateLimitConfigError::CostExceedsBudget {
                cost: self.points_per_publish,
                budget: smallest,
            });
        }
        Ok(())
    }
}

fn effective(budget: u32, margin: f64) -> u32 {
    // 5000 * 0.95 lands a hair under 4750 in binary floating point
    (f64::from(budget) * (1.0 - margin) + 1e-6).floor() as u32
}

/// Invalid rate limiter configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateLimitConfigError {
    #[error("safety margin must be in [0, 1), got {0}")]
    Margin(f64),
    #[error("hourly and daily budgets must be positive")]
    ZeroBudget,
    #[error("points per publish must be positive")]
    ZeroCost,
    #[error("a publish costs {cost} points but only {budget} are spendable")]
    CostExceedsBudget { cost: u32, budget: u32 },
}

/// Sliding-window points ledger
pub struct RateLimiter<C: Clock + ?Sized> {
    config: RateLimitConfig,
    clock: Arc<C>,
    ledger: VecDeque<LedgerEntry>,
}

impl<C: Clock + ?Sized> RateLimiter<C> {
    pub fn new(config: RateLimitConfig, clock: Arc<C>) -> Self {
        Self {
            config,
            clock,
            ledger: VecDeque::new(),
        }
    }

    /// Whether one more publish fits both windows, and if not how long to wait
    pub fn can_publish_now(&mut self) -> RateDecision {
        let now = self.clock.now();
        self.prune(now);

        let cost = self.config.points_per_publish;
        let hourly_wait = self.wait_for_window(now, HOUR, self.config.effective_hourly(), cost);
        let daily_wait = self.wait_for_window(now, DAY, self.config.effective_daily(), cost);

        let decision = match (hourly_wait, daily_wait) {
            (None, None) => RateDecision::allow(),
            (hourly, daily) => {
                // Both windows have to clear, so the longer wait wins.
                let wait = hourly.unwrap_or_default().max(daily.unwrap_or_default());
                RateDecision::deny(wait)
            }
        };

        if !decision.allowed {
            let usage = self.usage_at(now);
            tracing::warn!(
                hourly_points = usage.hourly_points,
                hourly_limit = usage.hourly_limit,
                daily_points = usage.daily_points,
                daily_limit = usage.daily_limit,
                hourly_blocked = hourly_wait.is_some(),
                daily_blocked = daily_wait.is_some(),
                wait_secs = decision.wait.as_secs(),
                "Publish budget exhausted"
            );
        }

        decision
    }

    /// Charge one publish against the budget
    pub fn record_publish(&mut self) {
        let now = self.clock.now();
        self.ledger.push_back(LedgerEntry {
            timestamp: now,
            points: self.config.points_per_publish,
        });
        self.prune(now);

        let usage = self.usage_at(now);
        tracing::info!(
            hourly_points = usage.hourly_points,
            hourly_limit = usage.hourly_limit,
            daily_points = usage.daily_points,
            daily_limit = usage.daily_limit,
            "Recorded publish against budget"
        );
    }

    /// Current points spent in each window
    pub fn usage(&mut self) -> RateUsage {
        let now = self.clock.now();
        self.prune(now);
        self.usage_at(now)
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    fn usage_at(&self, now: OffsetDateTime) -> RateUsage {
        RateUsage {
            hourly_points: self.points_within(now, HOUR),
            hourly_limit: self.config.effective_hourly(),
            daily_points: self.points_within(now, DAY),
            daily_limit: self.config.effective_daily(),
        }
    }

    fn prune(&mut self, now: OffsetDateTime) {
        while let Some(entry) = self.ledger.front() {
            if in_window(entry, now, DAY) {
                break;
            }
            self.ledger.pop_front();
        }
    }

    fn points_within(&self, now: OffsetDateTime, window: Duration) -> u32 {
        self.ledger
            .iter()
            .filter(|entry| in_window(entry, now, window))
            .map(|entry| entry.points)
            .sum()
    }

    /// None when `cost` fits the window, otherwise the time until enough of the
    /// oldest entries expire to make room for it.
    fn wait_for_window(
        &self,
        now: OffsetDateTime,
        window: Duration,
        limit: u32,
        cost: u32,
    ) -> Option<Duration> {
        let mut spent = self.points_within(now, window);
        if spent.saturating_add(cost) <= limit {
            return None;
        }

        for entry in self.ledger.iter().filter(|e| in_window(e, now, window)) {
            spent = spent.saturating_sub(entry.points);
            if spent.saturating_add(cost) <= limit {
                return Some(until_expiry(entry, now, window));
            }
        }

        // cost alone exceeds the limit; retry once the whole window has passed
        Some(window)
    }
}

fn in_window(entry: &LedgerEntry, now: OffsetDateTime, window: Duration) -> bool {
    now - entry.timestamp < window
}

fn until_expiry(entry: &LedgerEntry, now: OffsetDateTime, window: Duration) -> Duration {
    let expires_at = entry.timestamp + window;
    Duration::try_from(expires_at - now).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use time::macros::datetime;

    struct FakeClock {
        now: Mutex<OffsetDateTime>,
    }

    impl FakeClock {
        fn at(now: OffsetDateTime) -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(now),
            })
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> OffsetDateTime {
            *self.now.lock().unwrap()
        }
    }

    fn small_config() -> RateLimitConfig {
        // effective budgets: 9 points/hour (3 posts), 18 points/day (6 posts)
        RateLimitConfig {
            hourly_budget: 10,
            daily_budget: 20,
            points_per_publish: 3,
            safety_margin: 0.1,
        }
    }

    #[test]
    fn test_empty_ledger_allows() {
        let clock = FakeClock::at(datetime!(2024-06-01 12:00 UTC));
        let mut limiter = RateLimiter::new(RateLimitConfig::default(), clock);

        let decision = limiter.can_publish_now();
        assert!(decision.allowed);
        assert_eq!(decision.wait, Duration::ZERO);
    }

    #[test]
    fn test_recent_entries_under_budget_allow() {
        let clock = FakeClock::at(datetime!(2024-06-01 12:00 UTC));
        let mut limiter = RateLimiter::new(small_config(), clock.clone());

        limiter.record_publish();
        clock.advance(Duration::from_secs(5 * 60));
        limiter.record_publish();
        clock.advance(Duration::from_secs(4 * 60));

        assert!(limiter.can_publish_now().allowed);
    }

    #[test]
    fn test_saturated_hour_denies_until_oldest_expires() {
        let clock = FakeClock::at(datetime!(2024-06-01 12:00 UTC));
        let mut limiter = RateLimiter::new(small_config(), clock.clone());

        limiter.record_publish();
        clock.advance(Duration::from_secs(10 * 60));
        limiter.record_publish();
        clock.advance(Duration::from_secs(10 * 60));
        limiter.record_publish();
        clock.advance(Duration::from_secs(5 * 60));

        // 9 of 9 spendable points used; the 12:00 entry expires at 13:00
        let decision = limiter.can_publish_now();
        assert!(!decision.allowed);
        assert_eq!(decision.wait, Duration::from_secs(35 * 60));

        clock.advance(decision.wait);
        assert!(limiter.can_publish_now().allowed);
    }

    #[test]
    fn test_never_allows_past_effective_budget() {
        let clock = FakeClock::at(datetime!(2024-06-01 00:00 UTC));
        let config = small_config();
        let mut limiter = RateLimiter::new(config.clone(), clock.clone());

        // Try to publish every 7 minutes for two days; every allowed publish
        // must keep both windows within the effective budgets.
        for _ in 0..(2 * 24 * 60 / 7) {
            if limiter.can_publish_now().allowed {
                limiter.record_publish();
                let usage = limiter.usage();
                assert!(usage.hourly_points <= config.effective_hourly());
                assert!(usage.daily_points <= config.effective_daily());
            }
            clock.advance(Duration::from_secs(7 * 60));
        }
    }

    #[test]
    fn test_daily_window_blocks_after_hourly_clears() {
        let clock = FakeClock::at(datetime!(2024-06-01 00:00 UTC));
        let mut limiter = RateLimiter::new(small_config(), clock.clone());

        // Six publishes two hours apart fill the daily budget (18 points)
        for _ in 0..6 {
            assert!(limiter.can_publish_now().allowed);
            limiter.record_publish();
            clock.advance(Duration::from_secs(2 * 60 * 60));
        }

        // now 12:00; hourly window is empty, daily is full
        let decision = limiter.can_publish_now();
        assert!(!decision.allowed);
        assert_eq!(decision.wait, Duration::from_secs(12 * 60 * 60));
    }

    #[test]
    fn test_both_windows_blocked_waits_for_longer() {
        let clock = FakeClock::at(datetime!(2024-06-01 00:00 UTC));
        let mut limiter = RateLimiter::new(small_config(), clock.clone());

        for _ in 0..3 {
            limiter.record_publish();
            clock.advance(Duration::from_secs(4 * 60 * 60));
        }
        // 12:00: daily holds 9 points; add three more in the current hour
        for _ in 0..3 {
            limiter.record_publish();
            clock.advance(Duration::from_secs(60));
        }

        // hourly clears at 13:00 (57 min), daily at 00:00 next day (12 h - 3 min)
        let decision = limiter.can_publish_now();
        assert!(!decision.allowed);
        assert_eq!(
            decision.wait,
            Duration::from_secs(12 * 60 * 60 - 3 * 60)
        );
    }

    #[test]
    fn test_prunes_entries_older_than_a_day() {
        let clock = FakeClock::at(datetime!(2024-06-01 00:00 UTC));
        let mut limiter = RateLimiter::new(small_config(), clock.clone());

        limiter.record_publish();
        limiter.record_publish();
        assert_eq!(limiter.ledger_len(), 2);

        clock.advance(DAY);
        assert!(limiter.can_publish_now().allowed);
        assert_eq!(limiter.ledger_len(), 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());

        let bad_margin = RateLimitConfig {
            safety_margin: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_margin.validate(),
            Err(RateLimitConfigError::Margin(_))
        ));

        let too_costly = RateLimitConfig {
            hourly_budget: 3,
            points_per_publish: 3,
            safety_margin: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            too_costly.validate(),
            Err(RateLimitConfigError::CostExceedsBudget { .. })
        ));
    }

    #[test]
    fn test_default_effective_budgets() {
        let config = RateLimitConfig::default();
        assert_eq!(config.effective_hourly(), 4750);
        assert_eq!(config.effective_daily(), 33250);
    }
}
