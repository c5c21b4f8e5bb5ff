//! bixbot — chat-session generation bot.
//!
//! Wires the config, moderation filter, generation providers, sidecar
//! transport, and session manager together, then runs the session until it
//! ends. Failures are chat replies; the process only exits non-zero for the
//! terminal cases (logged out, reconnect budget exhausted, credential
//! persistence failure).

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::Parser,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    bixbot_config::BotConfig,
    bixbot_moderation::ModerationFilter,
    bixbot_pipeline::{CommandPipeline, PipelineConfig},
    bixbot_providers::{
        ChatCompletionProvider, ImageProvider, OpenAiCompatChat, PollinationsImage,
    },
    bixbot_session::{
        FileCredentialStore, Outbound, ReconnectPolicy, SessionEnd, SessionManager,
        SessionOutbound, SidecarTransport,
    },
};

#[derive(Parser)]
#[command(name = "bixbot", about = "bixbot — generation bot for a chat session", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "BIXBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Directory for the persisted credential bundle (overrides config).
    #[arg(long, env = "BIXBOT_AUTH_DIR")]
    auth_dir: Option<PathBuf>,

    /// WebSocket URL of the messaging sidecar (overrides config).
    #[arg(long)]
    sidecar_url: Option<String>,
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn default_auth_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "bixbot", "bixbot")
        .map(|dirs| dirs.data_dir().join("auth"))
        .unwrap_or_else(|| PathBuf::from("auth_session"))
}

fn build_moderation(config: &BotConfig) -> anyhow::Result<ModerationFilter> {
    match &config.moderation.word_list {
        Some(path) => Ok(ModerationFilter::load(path)?),
        None => {
            warn!("no moderation word list configured; moderation is disabled");
            Ok(ModerationFilter::empty())
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = bixbot_config::load(cli.config.as_deref())?;
    if let Some(url) = cli.sidecar_url {
        config.session.sidecar_url = url;
    }
    if let Some(dir) = cli.auth_dir {
        config.session.auth_dir = Some(dir);
    }

    let moderation = Arc::new(build_moderation(&config)?);

    let image: Arc<dyn ImageProvider> = Arc::new(PollinationsImage::new(
        config.image.base_url.as_str(),
        config.image.nologo,
        Duration::from_secs(config.image.timeout_secs),
    ));

    let chat: Option<Arc<dyn ChatCompletionProvider>> = match config.completion.api_key.clone() {
        Some(key) => Some(Arc::new(OpenAiCompatChat::new(
            config.completion.base_url.as_str(),
            Some(key),
            config.completion.model.as_str(),
            Duration::from_secs(config.completion.timeout_secs),
        ))),
        None => {
            info!("no completion API key configured; the chat command is disabled");
            None
        },
    };

    let auth_dir = config
        .session
        .auth_dir
        .clone()
        .unwrap_or_else(default_auth_dir);
    info!(auth_dir = %auth_dir.display(), sidecar = %config.session.sidecar_url, "starting bixbot");

    let store = Arc::new(FileCredentialStore::new(&auth_dir));
    let transport = Arc::new(SidecarTransport::new(config.session.sidecar_url.as_str()));

    let outbound = Arc::new(SessionOutbound::default());
    let pipeline = Arc::new(CommandPipeline::new(
        PipelineConfig::from_bot_config(&config),
        moderation,
        image,
        chat,
        Arc::clone(&outbound) as Arc<dyn Outbound>,
    ));

    let policy = ReconnectPolicy {
        initial_delay: Duration::from_millis(config.session.reconnect.initial_delay_ms),
        max_delay: Duration::from_millis(config.session.reconnect.max_delay_ms),
        max_attempts: config.session.reconnect.max_attempts,
    };

    let manager = SessionManager::new(transport, store, pipeline, outbound, policy);

    let cancel = manager.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            cancel.cancel();
        }
    });

    match manager.run().await? {
        SessionEnd::Cancelled => {
            info!("shut down cleanly");
            Ok(())
        },
        SessionEnd::LoggedOut => {
            error!("session was logged out; delete the auth directory and pair again");
            std::process::exit(1);
        },
        SessionEnd::GaveUp { attempts } => {
            error!(attempts, "could not re-establish the session; giving up");
            std::process::exit(1);
        },
    }
}
