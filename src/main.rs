use std::sync::Arc;

use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use serenity::all::ClientBuilder;
use serenity::prelude::*;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod format;
mod invite;
mod latency;
mod resolve;
mod search;
mod store;

use config::Config;
use latency::{LatencySampler, LatencyTracker};
use store::BanStore;

pub(crate) struct Data {
    bans: Arc<BanStore>,
    latency: Arc<LatencyTracker>,
    loaded: DateTime<Utc>,
}

type Error = anyhow::Error;
type Context<'a> = poise::Context<'a, Data, Error>;

const BANNED_MESSAGE: &str =
    "This server is prohibited from using this bot. Please contact the owner to have this lifted.";

/// Runs before every command: banned guilds can't use the bot at all.
async fn ban_check(ctx: Context<'_>) -> Result<bool, Error> {
    if let Some(guild_id) = ctx.guild_id() {
        if ctx.data().bans.is_banned(guild_id.get()).await {
            anyhow::bail!(BANNED_MESSAGE);
        }
    }
    Ok(true)
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(
                "error in command `{}`: {error:?}",
                ctx.command().qualified_name
            );
            if let Err(err) = ctx.say(error.to_string()).await {
                tracing::error!("failed to report command error: {err}");
            }
        }
        poise::FrameworkError::CommandCheckFailed {
            error: Some(error),
            ctx,
            ..
        } => {
            tracing::info!("check failed for `{}`: {error}", ctx.command().qualified_name);
            if let Err(err) = ctx.say(error.to_string()).await {
                tracing::error!("failed to report check failure: {err}");
            }
        }
        error => {
            if let Err(err) = poise::builtins::on_error(error).await {
                tracing::error!("error while handling error: {err}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    // Member lists back `mutual` and the ban softlock check; prefix commands need message content.
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::MESSAGE_CONTENT;

    let bans = Arc::new(
        BanStore::load(&config.data_path)
            .await
            .map_err(Report::msg)?,
    );
    let tracker = Arc::new(LatencyTracker::new(0.0));

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::guilds()],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(config.prefix.clone()),
                ..Default::default()
            },
            command_check: Some(|ctx| Box::pin(ban_check(ctx))),
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup({
            let bans = bans.clone();
            let tracker = tracker.clone();
            move |ctx, ready, framework| {
                Box::pin(async move {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    tracing::info!("{} is connected, guild manager loaded", ready.user.name);
                    Ok(Data {
                        bans,
                        latency: tracker,
                        loaded: Utc::now(),
                    })
                })
            }
        })
        .build();

    let mut client = ClientBuilder::new(&config.token, intents)
        .framework(framework)
        .await?;

    let mut sampler = LatencySampler::start(client.shard_manager.clone(), tracker);

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    let result = client.start().await;

    sampler.stop().await;
    bans.save().await.map_err(Report::msg)?;
    let (average, samples) = sampler.tracker().read();
    tracing::info!(
        "guild manager unloaded after {samples} latency samples, average {average:.3}ms"
    );

    result?;
    Ok(())
}
