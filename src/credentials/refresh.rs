//! Periodic token refresh.
//!
//! One background task drives the refresh on a fixed period. Each tick runs
//! `acquire → (backoff → acquire)* → store` with a bounded number of attempts. A tick that
//! exhausts its attempts leaves the token store untouched so outbound calls keep using the
//! last good token; the failure only shows up in logs and in [`RefreshStatus`].

use super::{acquirer::TokenAcquirer, store::TokenStore};
use secrecy::SecretString;
use std::{
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{interval, sleep, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

/// Longest refresh period accepted; longer ones are clamped by [`RefreshConfig::normalize`].
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone, Copy, Debug)]
pub struct RefreshConfig {
    interval: Duration,
    max_attempts: u32,
    backoff_base: Duration,
}

impl RefreshConfig {
    /// Default refresh config: every 10 minutes, 3 attempts per tick, 5s base backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval: Duration::from_secs(600),
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_interval_seconds(self, seconds: u64) -> Self {
        self.with_interval(Duration::from_secs(seconds))
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(self, seconds: u64) -> Self {
        self.with_backoff_base(Duration::from_secs(seconds))
    }

    #[must_use]
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Clamp values that would stall the timer or skip acquisition entirely.
    #[must_use]
    pub fn normalize(self) -> Self {
        let interval = if self.interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.interval.min(MAX_REFRESH_INTERVAL)
        };

        Self {
            interval,
            max_attempts: self.max_attempts.max(1),
            backoff_base: self.backoff_base,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before `attempt` (1-based): none for the first, then `base * 2^(attempt - 2)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow(attempt - 2);
        self.backoff_base.saturating_mul(factor)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared counters describing how the refresh loop is doing.
#[derive(Clone, Debug, Default)]
pub struct RefreshStatus {
    inner: Arc<StatusCounters>,
}

#[derive(Debug, Default)]
struct StatusCounters {
    /// Unix seconds of the last stored token, 0 when none was ever stored.
    last_success: AtomicU64,
    consecutive_failures: AtomicU32,
    total_failures: AtomicU64,
}

impl RefreshStatus {
    fn record_success(&self) {
        self.inner.last_success.store(unix_now(), Ordering::Relaxed);
        self.inner.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) -> u32 {
        self.inner.total_failures.fetch_add(1, Ordering::Relaxed);
        self.inner
            .consecutive_failures
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }

    #[must_use]
    pub fn last_success_unix(&self) -> Option<u64> {
        match self.inner.last_success.load(Ordering::Relaxed) {
            0 => None,
            seconds => Some(seconds),
        }
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.inner.total_failures.load(Ordering::Relaxed)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new token was stored.
    Refreshed,
    /// Every attempt failed; the store kept its previous value.
    Exhausted { error: String },
    /// Another tick was still running.
    Skipped,
}

/// Record of a single tick, used for logging and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshAttempt {
    pub outcome: RefreshOutcome,
    pub attempts: u32,
}

pub struct RefreshScheduler<A> {
    acquirer: A,
    store: TokenStore,
    secret: SecretString,
    config: RefreshConfig,
    status: RefreshStatus,
    running: Mutex<()>,
}

impl<A: TokenAcquirer> RefreshScheduler<A> {
    #[must_use]
    pub fn new(
        acquirer: A,
        store: TokenStore,
        secret: SecretString,
        config: RefreshConfig,
    ) -> Self {
        Self {
            acquirer,
            store,
            secret,
            config: config.normalize(),
            status: RefreshStatus::default(),
            running: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn status(&self) -> RefreshStatus {
        self.status.clone()
    }

    /// Run one refresh cycle. Never fails; the result is for observation only.
    pub async fn tick(&self) -> RefreshAttempt {
        let Ok(_running) = self.running.try_lock() else {
            debug!("Token refresh already in progress, skipping tick");
            return RefreshAttempt {
                outcome: RefreshOutcome::Skipped,
                attempts: 0,
            };
        };

        info!("Initiating token refresh");

        let max_attempts = self.config.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let backoff = self.config.backoff_delay(attempt);

            if !backoff.is_zero() {
                warn!("Backing off for {} ms", backoff.as_millis());
                sleep(backoff).await;
            }

            match self.acquirer.login(&self.secret).await {
                Ok(token) => {
                    self.store.set(token.into_secret());
                    self.status.record_success();

                    info!(attempt, "Token refresh completed");

                    return RefreshAttempt {
                        outcome: RefreshOutcome::Refreshed,
                        attempts: attempt,
                    };
                }

                Err(e) => {
                    warn!("Token refresh failed on attempt #{}: {}", attempt, e);
                    last_error = e.to_string();
                }
            }
        }

        let consecutive_failures = self.status.record_failure();

        error!(
            consecutive_failures,
            "All {} attempts to refresh the token failed, keeping the previous token: {}",
            max_attempts,
            last_error
        );

        RefreshAttempt {
            outcome: RefreshOutcome::Exhausted { error: last_error },
            attempts: max_attempts,
        }
    }
}

impl<A: TokenAcquirer + 'static> RefreshScheduler<A> {
    /// Drive [`tick`](Self::tick) on the configured period until `shutdown` flips or its
    /// sender is dropped. The first tick fires immediately.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            debug!(
                "Refreshing token every {} seconds",
                self.config.interval.as_secs()
            );

            while !*shutdown.borrow() {
                let scheduled = tokio::select! {
                    at = ticker.tick() => at,
                    _ = shutdown.changed() => break,
                };

                tokio::select! {
                    attempt = self.tick() => {
                        debug!(
                            attempts = attempt.attempts,
                            outcome = ?attempt.outcome,
                            "Token refresh tick finished"
                        );
                        skip_elapsed_firings(&mut ticker, scheduled, self.config.interval);
                    }
                    _ = shutdown.changed() => {
                        info!("Shutdown requested, abandoning token refresh in progress");
                        break;
                    }
                }
            }

            info!("Token refresh task stopped");
        })
    }
}

/// Drop the firings that came due while the tick at `scheduled` was still running, so the
/// next tick lands on the first period boundary after now.
fn skip_elapsed_firings(ticker: &mut Interval, scheduled: Instant, period: Duration) {
    let now = Instant::now();
    let mut next = scheduled + period;
    if next > now {
        return;
    }

    let mut skipped = 0_u32;
    while next <= now {
        next += period;
        skipped = skipped.saturating_add(1);
    }

    warn!(
        skipped,
        "Token refresh tick overran its period, skipping missed firings"
    );
    ticker.reset_at(next);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::token::{tests::SAMPLE_JWT, AuthError, BearerToken};
    use reqwest::StatusCode;
    use secrecy::ExposeSecret;
    use tokio::time::timeout;

    /// Fails `failures` times, then succeeds forever.
    struct ScriptedAcquirer {
        failures: u32,
        calls: AtomicU32,
        delay: Duration,
        started: std::sync::Mutex<Vec<Instant>>,
    }

    impl ScriptedAcquirer {
        fn failing(failures: u32) -> Self {
            Self::slow(failures, Duration::ZERO)
        }

        fn slow(failures: u32, delay: Duration) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                delay,
                started: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenAcquirer for ScriptedAcquirer {
        async fn login(&self, _secret: &SecretString) -> Result<BearerToken, AuthError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.started.lock().unwrap().push(Instant::now());

            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }

            if call <= self.failures {
                Err(AuthError::Rejected {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: format!("failure {call}"),
                })
            } else {
                BearerToken::parse(SAMPLE_JWT)
            }
        }
    }

    fn fast_config() -> RefreshConfig {
        RefreshConfig::new().with_backoff_base(Duration::from_millis(1))
    }

    fn scheduler(
        acquirer: ScriptedAcquirer,
        store: &TokenStore,
    ) -> RefreshScheduler<ScriptedAcquirer> {
        RefreshScheduler::new(
            acquirer,
            store.clone(),
            SecretString::from("secret".to_string()),
            fast_config(),
        )
    }

    #[test]
    fn backoff_doubles_from_base() {
        let config = RefreshConfig::new();
        assert_eq!(config.backoff_delay(1), Duration::ZERO);
        assert_eq!(config.backoff_delay(2), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(10));
        assert_eq!(config.backoff_delay(4), Duration::from_secs(20));
    }

    #[test]
    fn normalize_keeps_at_least_one_attempt() {
        let config = RefreshConfig::new()
            .with_max_attempts(0)
            .with_interval_seconds(0)
            .normalize();
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.interval(), Duration::from_secs(1));

        let config = RefreshConfig::new()
            .with_interval_seconds(u64::MAX)
            .normalize();
        assert_eq!(config.interval(), MAX_REFRESH_INTERVAL);
    }

    #[tokio::test]
    async fn first_attempt_success_stores_token() {
        let store = TokenStore::new();
        let scheduler = scheduler(ScriptedAcquirer::failing(0), &store);

        let attempt = scheduler.tick().await;

        assert_eq!(attempt.outcome, RefreshOutcome::Refreshed);
        assert_eq!(attempt.attempts, 1);
        assert_eq!(store.get().unwrap().expose_secret(), SAMPLE_JWT);
        assert!(scheduler.status().last_success_unix().is_some());
        assert_eq!(scheduler.status().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn retries_until_success_within_bound() {
        for failures in 0..3 {
            let store = TokenStore::new();
            let scheduler = scheduler(ScriptedAcquirer::failing(failures), &store);

            let attempt = scheduler.tick().await;

            assert_eq!(attempt.outcome, RefreshOutcome::Refreshed);
            assert_eq!(attempt.attempts, failures + 1);
            assert_eq!(scheduler.acquirer.calls(), failures + 1);
            assert_eq!(store.get().unwrap().expose_secret(), SAMPLE_JWT);
        }
    }

    #[tokio::test]
    async fn exhausted_retries_keep_previous_token() {
        let store = TokenStore::new();
        store.set(SecretString::from("previous".to_string()));
        let scheduler = scheduler(ScriptedAcquirer::failing(u32::MAX), &store);

        let attempt = scheduler.tick().await;

        assert!(matches!(attempt.outcome, RefreshOutcome::Exhausted { .. }));
        assert_eq!(attempt.attempts, 3);
        assert_eq!(scheduler.acquirer.calls(), 3);
        assert_eq!(store.get().unwrap().expose_secret(), "previous");
        assert_eq!(scheduler.status().consecutive_failures(), 1);
        assert!(scheduler.status().last_success_unix().is_none());
    }

    #[tokio::test]
    async fn exhausted_retries_leave_empty_store_empty() {
        let store = TokenStore::new();
        let scheduler = scheduler(ScriptedAcquirer::failing(u32::MAX), &store);

        scheduler.tick().await;

        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn attempt_counter_resets_every_tick() {
        let store = TokenStore::new();
        let scheduler = scheduler(ScriptedAcquirer::failing(u32::MAX), &store);

        assert_eq!(scheduler.tick().await.attempts, 3);
        assert_eq!(scheduler.tick().await.attempts, 3);
        assert_eq!(scheduler.acquirer.calls(), 6);
        assert_eq!(scheduler.status().consecutive_failures(), 2);
        assert_eq!(scheduler.status().total_failures(), 2);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let store = TokenStore::new();
        let scheduler = scheduler(ScriptedAcquirer::failing(3), &store);

        let first = scheduler.tick().await;
        assert!(matches!(first.outcome, RefreshOutcome::Exhausted { .. }));
        assert_eq!(scheduler.status().consecutive_failures(), 1);

        let second = scheduler.tick().await;
        assert_eq!(second.outcome, RefreshOutcome::Refreshed);
        assert_eq!(scheduler.status().consecutive_failures(), 0);
        assert_eq!(scheduler.status().total_failures(), 1);
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let store = TokenStore::new();
        let acquirer = ScriptedAcquirer::slow(0, Duration::from_millis(200));
        let scheduler = scheduler(acquirer, &store);

        let (first, second) = tokio::join!(scheduler.tick(), async {
            sleep(Duration::from_millis(20)).await;
            scheduler.tick().await
        });

        assert_eq!(first.outcome, RefreshOutcome::Refreshed);
        assert_eq!(second.outcome, RefreshOutcome::Skipped);
        assert_eq!(second.attempts, 0);
        assert_eq!(scheduler.acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn spawned_task_refreshes_and_stops_on_shutdown() {
        let store = TokenStore::new();
        let scheduler = Arc::new(scheduler(ScriptedAcquirer::failing(0), &store));
        let (tx, rx) = watch::channel(false);

        let handle = Arc::clone(&scheduler).spawn(rx);

        timeout(Duration::from_secs(2), async {
            while !store.is_present() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

        assert_eq!(scheduler.acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_backoff() {
        let store = TokenStore::new();
        let scheduler = Arc::new(RefreshScheduler::new(
            ScriptedAcquirer::failing(u32::MAX),
            store.clone(),
            SecretString::from("secret".to_string()),
            RefreshConfig::new().with_backoff_base_seconds(60),
        ));
        let (tx, rx) = watch::channel(false);

        let handle = Arc::clone(&scheduler).spawn(rx);

        timeout(Duration::from_secs(2), async {
            while scheduler.acquirer.calls() == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

        assert_eq!(scheduler.acquirer.calls(), 1);
        assert!(store.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn firing_during_a_long_tick_is_skipped() {
        let store = TokenStore::new();
        let scheduler = Arc::new(RefreshScheduler::new(
            ScriptedAcquirer::slow(0, Duration::from_secs(15)),
            store.clone(),
            SecretString::from("secret".to_string()),
            RefreshConfig::new().with_interval_seconds(10),
        ));
        let (tx, rx) = watch::channel(false);
        let origin = Instant::now();

        let handle = Arc::clone(&scheduler).spawn(rx);
        sleep(Duration::from_secs(36)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let offsets: Vec<u64> = scheduler
            .acquirer
            .started
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(origin).as_secs())
            .collect();
        assert_eq!(offsets, vec![0, 20]);
        assert!(store.is_present());
    }
}
