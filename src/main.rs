use std::sync::Arc;

use anyhow::Context;
use secrecy::SecretString;
use tracing_appender::non_blocking::WorkerGuard;

use onboard_bot::bot::OnboardingBot;
use onboard_bot::config::BotConfig;
use onboard_bot::onboarding::{OnboardingWorkflow, ResponseCollector, today_in};
use onboard_bot::platform::console::{ConsoleEvents, demo_guild};
use onboard_bot::platform::discord::{DiscordGateway, DiscordGuild};
use onboard_bot::platform::{EventSource, Guild};
use onboard_bot::scheduler;

/// Log to a daily file when a directory is configured, stderr otherwise.
fn init_tracing(config: &BotConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "onboard-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

async fn connect_discord(
    token: SecretString,
    guild_id: Option<u64>,
) -> anyhow::Result<(Arc<dyn Guild>, Box<dyn EventSource>)> {
    let guild = DiscordGuild::connect(token.clone(), guild_id)
        .await
        .context("connecting to Discord")?;
    guild
        .health_check()
        .await
        .context("Discord rejected the bot token")?;
    eprintln!("   Guild: {}", guild.guild_id());
    let gateway: Box<dyn EventSource> = Box::new(DiscordGateway::new(token, guild.guild_id()));
    let guild: Arc<dyn Guild> = Arc::new(guild);
    Ok((guild, gateway))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let _log_guard = init_tracing(&config);

    let schedule = scheduler::parse_schedule(&config.schedule.reminder_cron)?;

    eprintln!("🎓 Onboard Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Onboarding channel: {}", config.onboarding.onboarding_channel);
    eprintln!("   Placeholder role: {}", config.onboarding.placeholder_role);
    eprintln!(
        "   Reminders: {} ({})",
        config.schedule.reminder_cron, config.timezone
    );
    if let Some(at) = config.schedule.shutdown_at {
        eprintln!("   Shutdown at: {} ({})", at.format("%H:%M"), config.timezone);
    }

    let (guild, source): (Arc<dyn Guild>, Box<dyn EventSource>) = match config.token.clone() {
        Some(token) => connect_discord(token, config.guild_id).await?,
        None => {
            eprintln!("   DISCORD_TOKEN not set, running against a local console guild.");
            eprintln!("   Type answers and press Enter.\n");
            let (guild, member, channel) = demo_guild(&config.onboarding);
            let events = ConsoleEvents::new(Arc::clone(&guild), member, channel);
            (guild as Arc<dyn Guild>, Box::new(events) as Box<dyn EventSource>)
        }
    };

    let collector = Arc::new(ResponseCollector::new(
        Arc::clone(&guild),
        config.onboarding.answer_timeout,
    ));
    let workflow = Arc::new(
        OnboardingWorkflow::new(guild, collector, config.onboarding.clone())
            .with_clock(today_in(config.timezone)),
    );
    let bot = Arc::new(OnboardingBot::new(workflow, &config.trigger_keyword));

    let _reminders =
        scheduler::spawn_reminder_task(Arc::clone(bot.sweep()), schedule, config.timezone);

    let shutdown = {
        let at = config.schedule.shutdown_at;
        let tz = config.timezone;
        async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = scheduler::shutdown_at(at, tz) => {}
            }
        }
    };

    bot.run(source.as_ref(), shutdown).await?;
    tracing::info!("Stopped");
    Ok(())
}
