//! Run loop use case - orchestrates fetching, generating, validating, and publishing

use std::future::Future;
use std::sync::Arc;

use rand::Rng;
use tokio::time::{Duration, sleep};

use crate::{
    cleaner,
    model::{BotSettings, CycleOutcome, CycleStage, GenerateInput},
    ports::{Clock, GenerateError, Generator, PostSource, PostSourceError, PublishError, Publisher},
    postprocess,
    rate_limit::{RateLimitConfig, RateLimitConfigError, RateLimiter},
    validator::{ContentValidator, ValidatorConfig},
};

/// What to do with an accepted post when the points budget is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitPolicy {
    /// Drop the post and try again next cycle
    #[default]
    Skip,
    /// Sleep the reported wait once, then re-check and publish if allowed
    Wait,
}

/// Whether a cycle is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Configuration for the run loop
#[derive(Debug, Clone)]
pub struct RunLoopConfig {
    pub settings: BotSettings,
    /// Upper bound of source posts fetched per cycle
    pub max_posts: usize,
    /// Upper bound of cleaned samples handed to the model
    pub max_samples: usize,
    /// Extra generation attempts after the first failure
    pub generation_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub generation_backoff: Duration,
    pub min_sleep: Duration,
    pub max_sleep: Duration,
    pub rate_limit: RateLimitConfig,
    pub rate_limit_policy: RateLimitPolicy,
    pub validator: ValidatorConfig,
}

impl Default for RunLoopConfig {
    fn default() -> Self {
        Self {
            settings: BotSettings::default(),
            max_posts: 100,
            max_samples: 20,
            generation_retries: 2,
            generation_backoff: Duration::from_secs(2),
            min_sleep: Duration::from_secs(30 * 60),
            max_sleep: Duration::from_secs(3 * 60 * 60),
            rate_limit: RateLimitConfig::default(),
            rate_limit_policy: RateLimitPolicy::Skip,
            validator: ValidatorConfig::default(),
        }
    }
}

/// Errors from the run loop
#[derive(Debug, thiserror::Error)]
pub enum RunLoopError {
    #[error("Invalid rate limit configuration: {0}")]
    RateLimit(#[from] RateLimitConfigError),
    #[error("Invalid sleep range: min {min:?} is greater than max {max:?}")]
    SleepRange { min: Duration, max: Duration },
    #[error("Character limit must be greater than zero")]
    CharLimit,
}

/// Run loop orchestrator
pub struct RunLoop<S, G, P, Cl>
where
    S: PostSource + ?Sized,
    G: Generator + ?Sized,
    P: Publisher + ?Sized,
    Cl: Clock + ?Sized,
{
    post_source: Arc<S>,
    generator: Arc<G>,
    publisher: Arc<P>,
    clock: Arc<Cl>,
    config: RunLoopConfig,
    validator: ContentValidator,
    rate_limiter: RateLimiter<Cl>,
    state: SchedulerState,
}

impl<S, G, P, Cl> RunLoop<S, G, P, Cl>
where
    S: PostSource + ?Sized,
    G: Generator + ?Sized,
    P: Publisher + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(
        post_source: Arc<S>,
        generator: Arc<G>,
        publisher: Arc<P>,
        clock: Arc<Cl>,
        config: RunLoopConfig,
    ) -> Result<Self, RunLoopError> {
        config.rate_limit.validate()?;
        if config.min_sleep > config.max_sleep {
            return Err(RunLoopError::SleepRange {
                min: config.min_sleep,
                max: config.max_sleep,
            });
        }
        if config.settings.char_limit == 0 {
            return Err(RunLoopError::CharLimit);
        }

        let validator = ContentValidator::new(config.validator.clone());
        let rate_limiter = RateLimiter::new(config.rate_limit.clone(), Arc::clone(&clock));

        Ok(Self {
            post_source,
            generator,
            publisher,
            clock,
            config,
            validator,
            rate_limiter,
            state: SchedulerState::Idle,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn rate_limiter(&self) -> &RateLimiter<Cl> {
        &self.rate_limiter
    }

    /// Run cycles until `shutdown` resolves. Cycle failures never end the loop.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            source = %self.config.settings.source_handle,
            destination = %self.config.settings.destination_handle,
            model = %self.config.settings.model_name,
            dry_run = self.config.settings.dry_run,
            "Starting run loop"
        );

        loop {
            tokio::select! {
                _ = self.run_cycle() => {}
                _ = &mut shutdown => break,
            }

            let pause = self.next_sleep();
            let next_cycle_at = self.clock.now() + pause;
            tracing::info!(
                sleep_secs = pause.as_secs(),
                next_cycle_at = %next_cycle_at,
                "Next cycle scheduled"
            );

            tokio::select! {
                _ = sleep(pause) => {}
                _ = &mut shutdown => break,
            }
        }

        self.state = SchedulerState::Idle;
        tracing::info!("Shutdown requested, run loop stopped");
    }

    /// Execute one fetch, generate, validate and publish cycle
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.state = SchedulerState::Running;
        let outcome = self.execute_cycle().await;
        log_outcome(&outcome);
        self.state = SchedulerState::Idle;
        outcome
    }

    /// Sleep before the next cycle, uniform over `[min_sleep, max_sleep]`
    pub fn next_sleep(&self) -> Duration {
        let min = self.config.min_sleep.as_secs();
        let max = self.config.max_sleep.as_secs();
        if max <= min {
            return self.config.min_sleep;
        }
        Duration::from_secs(rand::thread_rng().gen_range(min..=max))
    }

    async fn execute_cycle(&mut self) -> CycleOutcome {
        let settings = &self.config.settings;

        tracing::info!(handle = %settings.source_handle, "Fetching source posts");

        let posts = match self
            .post_source
            .fetch_posts(&settings.source_handle, self.config.max_posts)
            .await
        {
            Ok(posts) => posts,
            Err(PostSourceError::Auth(error)) => {
                return CycleOutcome::Failed {
                    stage: CycleStage::Authentication,
                    error,
                };
            }
            Err(e) => {
                return CycleOutcome::Failed {
                    stage: CycleStage::Fetch,
                    error: e.to_string(),
                };
            }
        };

        let samples = cleaner::clean_all(&posts, self.config.max_samples);
        tracing::info!(
            fetched = posts.len(),
            usable = samples.len(),
            "Cleaned source posts"
        );

        if samples.is_empty() {
            return CycleOutcome::NoSourceMaterial;
        }

        let input = GenerateInput {
            samples,
            char_limit: settings.char_limit,
            model: settings.model_name.clone(),
        };

        let raw = match self.generate_with_retry(input).await {
            Ok(raw) => raw,
            Err(e) => {
                return CycleOutcome::Failed {
                    stage: CycleStage::Generation,
                    error: e.to_string(),
                };
            }
        };

        let char_limit = settings.char_limit;
        let text = postprocess::fit_to_limit(&postprocess::sanitize(&raw), char_limit);

        let verdict = self.validator.validate(&text, char_limit);
        if !verdict.accepted {
            return CycleOutcome::Rejected {
                text,
                reasons: verdict.reasons,
            };
        }

        let mut decision = self.rate_limiter.can_publish_now();
        if !decision.allowed && self.config.rate_limit_policy == RateLimitPolicy::Wait {
            tracing::info!(
                wait_secs = decision.wait.as_secs(),
                "Waiting for rate limit window"
            );
            sleep(decision.wait).await;
            decision = self.rate_limiter.can_publish_now();
        }
        if !decision.allowed {
            return CycleOutcome::RateLimited {
                wait: decision.wait,
            };
        }

        if self.config.settings.dry_run {
            tracing::info!(
                destination = %self.config.settings.destination_handle,
                text = %text,
                "[DRY RUN] Would publish"
            );
            return CycleOutcome::DryRun { text };
        }

        match self.publisher.publish(&text).await {
            Ok(result) => {
                self.rate_limiter.record_publish();
                let usage = self.rate_limiter.usage();
                tracing::info!(
                    uri = %result.uri,
                    cid = ?result.cid,
                    hourly_points = usage.hourly_points,
                    daily_points = usage.daily_points,
                    "Published post"
                );
                CycleOutcome::Published {
                    uri: result.uri,
                    text,
                }
            }
            Err(PublishError::Auth(error)) => CycleOutcome::Failed {
                stage: CycleStage::Authentication,
                error,
            },
            Err(e) => CycleOutcome::Failed {
                stage: CycleStage::Publish,
                error: e.to_string(),
            },
        }
    }

    async fn generate_with_retry(&self, input: GenerateInput) -> Result<String, GenerateError> {
        let mut attempt = 0;
        loop {
            tracing::debug!(attempt, model = %input.model, "Generating post");
            match self.generator.generate(input.clone()).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.config.generation_retries => {
                    let delay = self.config.generation_backoff * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Generation failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Published { uri, .. } => {
            tracing::info!(uri = %uri, "Cycle finished: published");
        }
        CycleOutcome::DryRun { .. } => {
            tracing::info!("Cycle finished: dry run");
        }
        CycleOutcome::Rejected { text, reasons } => {
            let reasons: Vec<&str> = reasons.iter().map(|r| r.as_str()).collect();
            tracing::info!(reasons = ?reasons, text = %text, "Cycle finished: candidate rejected");
        }
        CycleOutcome::RateLimited { wait } => {
            tracing::warn!(wait_secs = wait.as_secs(), "Cycle finished: rate limited");
        }
        CycleOutcome::NoSourceMaterial => {
            tracing::warn!("Cycle finished: no usable source posts");
        }
        CycleOutcome::Failed { stage, error } => {
            tracing::error!(stage = %stage, error = %error, "Cycle failed");
        }
    }
}
