//! Run command - wires adapters into the run loop and drives it

use anyhow::{Context, Result, bail};
use echopost_adapters::{
    bluesky::{BlueskyCredentials, BlueskyPostSource, BlueskyPublisher, BlueskySession, StubPublisher},
    llm::{LlmConfig, OllamaGenerator, StubGenerator},
};
use echopost_domain::{CycleOutcome, Generator, Publisher, SystemClock, usecases::RunLoop};
use secrecy::SecretString;
use std::sync::Arc;

use crate::args::Cli;
use crate::config::AppConfig;

pub async fn execute(cli: Cli, mut config: AppConfig) -> Result<()> {
    if let Some(model) = cli.model {
        config.bot.model = model;
    }
    let dry_run = cli.dry_run || config.bot.dry_run;

    config.validate(dry_run).context("Invalid configuration")?;
    let loop_config = config.run_loop_config(dry_run)?;

    tracing::info!(
        source = %config.bot.source_handle,
        destination = %config.bot.destination_handle,
        host = %config.bot.host_url,
        model = %config.bot.model,
        provider = %config.llm.provider,
        dry_run = dry_run,
        once = cli.once,
        "Starting echopost"
    );

    // Build dependencies
    let post_source = Arc::new(build_post_source(&config)?);
    let generator = build_generator(&config);
    let publisher = build_publisher(&config, dry_run)?;
    let clock = Arc::new(SystemClock);

    let mut run_loop = RunLoop::new(post_source, generator, publisher, clock, loop_config)
        .context("Failed to initialize run loop")?;

    if cli.once {
        tracing::info!("Running single cycle");
        if let CycleOutcome::Failed { stage, error } = run_loop.run_cycle().await {
            bail!("Cycle failed during {}: {}", stage, error);
        }
    } else {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        };

        run_loop.run(shutdown).await;
    }

    tracing::info!("echopost stopped");
    Ok(())
}

fn build_post_source(config: &AppConfig) -> Result<BlueskyPostSource> {
    let password = load_app_password(&config.bot.source_password_env, "source")?;
    let session = BlueskySession::new(
        config.bot.host_url.clone(),
        BlueskyCredentials::new(config.bot.source_handle.trim(), password),
    );
    Ok(BlueskyPostSource::new(Arc::new(session)))
}

fn build_publisher(config: &AppConfig, dry_run: bool) -> Result<Arc<dyn Publisher>> {
    // Dry runs never publish, so the destination account is not needed
    if dry_run {
        return Ok(Arc::new(StubPublisher::new()));
    }

    let password = load_app_password(&config.bot.destination_password_env, "destination")?;
    let session = BlueskySession::new(
        config.bot.host_url.clone(),
        BlueskyCredentials::new(config.bot.destination_handle.trim(), password),
    );
    Ok(Arc::new(BlueskyPublisher::new(Arc::new(session))))
}

fn build_generator(config: &AppConfig) -> Arc<dyn Generator> {
    match config.llm.provider.as_str() {
        "stub" => Arc::new(StubGenerator::echo()),
        _ => {
            let llm_config = LlmConfig {
                temperature: config.llm.temperature,
                max_output_tokens: config.llm.max_output_tokens,
                timeout_secs: config.llm.timeout_secs,
            };
            Arc::new(OllamaGenerator::with_base_url(
                config.llm.base_url.clone(),
                llm_config,
            ))
        }
    }
}

fn load_app_password(env_var: &str, account: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No app password env var configured for the {} account", account);
    }

    let password = std::env::var(env_var).with_context(|| {
        format!(
            "Missing app password env var {} for the {} account",
            env_var, account
        )
    })?;

    if password.trim().is_empty() {
        bail!(
            "App password env var {} is empty for the {} account",
            env_var,
            account
        );
    }

    Ok(SecretString::new(password.into()))
}
