//! keyrelay -- answer interactive terminal prompts from a chat channel.
//!
//! Entry point: flag parsing, logging, configuration, backend selection, and
//! the listening loop. This is the only place errors become an exit code.

mod command;
mod config;
mod feedback;
mod messaging;
mod orchestrator;
mod platform;
mod queue;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use config::{Settings, DEFAULT_CONFIG_PATH};
use messaging::discord::{DiscordGateway, DiscordRest};
use orchestrator::{Orchestrator, Stop};
use platform::PlatformInfo;
use queue::InjectionQueue;

#[derive(Debug, Parser)]
#[command(version, about = "Relay chat commands into keystrokes for a local terminal session")]
struct Cli {
    /// Config file (TOML). Defaults to ./keyrelay.toml when present.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the detected platform and available injection methods, then exit.
    #[arg(long)]
    platform_info: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let info = PlatformInfo::detect();
    if cli.platform_info {
        println!("{info}");
        return ExitCode::SUCCESS;
    }

    log::info!("keyrelay v{}", env!("CARGO_PKG_VERSION"));
    log::info!("platform: {info}");

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("hint: copy keyrelay.example.toml to keyrelay.toml or export BOT_TOKEN");
            return ExitCode::FAILURE;
        }
    };

    match run(settings, info).await {
        Ok(Stop::Shutdown) => ExitCode::SUCCESS,
        Ok(Stop::SourceEnded) => {
            log::error!("disconnected from the chat service");
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, config::ConfigError> {
    match &cli.config {
        Some(path) => config::load(path, true),
        None => config::load(&PathBuf::from(DEFAULT_CONFIG_PATH), false),
    }
}

async fn run(settings: Settings, info: PlatformInfo) -> Result<Stop, Box<dyn std::error::Error>> {
    let Settings {
        bot_token,
        backend: backend_config,
        policy,
    } = settings;

    let backend = platform::select_backend(&info, &backend_config)?;
    log_banner(&backend_config.target_app, backend.kind(), &policy);

    let (queue, _worker) = InjectionQueue::spawn(backend, backend_config.operation_timeout);
    let reactions = Arc::new(DiscordRest::new(&bot_token)?);
    let gateway = DiscordGateway::connect(&bot_token);

    let relay = Orchestrator::new(policy, queue, reactions);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("could not listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    Ok(relay.run(gateway, shutdown).await?)
}

fn log_banner(
    target_app: &str,
    kind: platform::BackendKind,
    policy: &config::AuthorizationPolicy,
) {
    log::info!("backend: {kind} (target app {target_app:?})");
    match policy.allowed_senders.len() {
        0 => log::info!("senders: unrestricted"),
        n => log::info!("senders: {n} allowed"),
    }
    match &policy.channel_id {
        Some(c) => log::info!("channel: {c} only"),
        None => log::info!("channel: any"),
    }
    log::info!("commands: 0|esc = escape, 1|y = yes, 2 = yes to all, 3 <msg>|n <msg> = no with reply");
    log::info!("listening for commands...");
}
