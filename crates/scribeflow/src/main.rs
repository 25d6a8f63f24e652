// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scribeflow - streaming text generation client with session resilience.
//!
//! Binary entry point. Wires the shared stores (tokens, limits, notices)
//! into the REST, streaming, typing, and realtime layers and exposes them
//! as CLI commands.

use std::io::Write as _;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use scribeflow_client::{GenerationEvent, RestClient, StreamConsumer, TypingDriver};
use scribeflow_core::{Credential, LimitGate, NotificationCenter, TokenStore, UsageSeverity};
use scribeflow_realtime::{RealtimeClient, SessionOrchestrator, WsTransport};

/// Scribeflow - streaming text generation client.
#[derive(Parser, Debug)]
#[command(name = "scribeflow", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a text generation to stdout with paced reveal.
    Generate {
        /// Prompt to generate from.
        prompt: String,
    },
    /// Connect to the realtime channel and print usage events.
    WatchUsage,
    /// Print the resolved configuration.
    Config,
}

/// Shared client wiring used by every command.
struct App {
    config: scribeflow_config::ScribeflowConfig,
    tokens: Arc<TokenStore>,
    limits: Arc<LimitGate>,
    notices: Arc<NotificationCenter>,
    rest: Arc<RestClient>,
}

impl App {
    fn build(config: scribeflow_config::ScribeflowConfig) -> Result<Self, String> {
        let tokens = Arc::new(TokenStore::new());
        if let Ok(access) = std::env::var("SCRIBEFLOW_ACCESS_TOKEN") {
            let refresh = std::env::var("SCRIBEFLOW_REFRESH_TOKEN").ok();
            tokens.set(Credential::new(access, refresh.as_deref()));
        }

        let limits = Arc::new(LimitGate::new());
        let notices = Arc::new(NotificationCenter::new());
        let rest = Arc::new(
            RestClient::new(&config.api, Arc::clone(&tokens), Arc::clone(&notices))
                .map_err(|e| e.to_string())?,
        );

        Ok(Self {
            config,
            tokens,
            limits,
            notices,
            rest,
        })
    }

    fn realtime(&self) -> Arc<RealtimeClient> {
        Arc::new(RealtimeClient::new(
            Arc::new(WsTransport),
            self.config.api.realtime_endpoint(),
            self.config.realtime.clone(),
            Arc::clone(&self.tokens),
            Arc::clone(&self.limits),
        ))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match scribeflow_config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("scribeflow: config error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Generate { prompt }) => run_generate(config, &prompt).await,
        Some(Commands::WatchUsage) => run_watch_usage(config).await,
        Some(Commands::Config) => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => {
                    println!("{rendered}");
                    Ok(())
                }
                Err(e) => Err(format!("failed to render config: {e}")),
            }
        }
        None => {
            println!("scribeflow: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("scribeflow: {e}");
        std::process::exit(1);
    }
}

async fn run_generate(
    config: scribeflow_config::ScribeflowConfig,
    prompt: &str,
) -> Result<(), String> {
    let app = App::build(config)?;
    let cancel = CancellationToken::new();

    // Realtime runs alongside the generation so push-channel limit events
    // can stop it mid-stream.
    let realtime = app.realtime();
    if let Err(e) = realtime.connect().await {
        warn!(error = %e, "realtime unavailable, continuing without push events");
    }
    let orchestrator = SessionOrchestrator::new(
        Arc::clone(&realtime),
        Arc::clone(&app.tokens),
        app.config.realtime.clone(),
    );
    tokio::spawn(orchestrator.run(cancel.clone()));

    // Surface deduplicated error notices on stderr.
    let mut notice_rx = app.notices.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notice_rx.recv().await {
            eprintln!("! {}", notice.message);
        }
    });

    // Paced reveal: print only the newly revealed suffix on each change.
    let (driver, typing, mut display) = TypingDriver::new(&app.config.typing);
    let render = tokio::spawn(async move {
        let mut printed = 0;
        while display.changed().await.is_ok() {
            let text = display.borrow_and_update().clone();
            if text.len() > printed {
                print!("{}", &text[printed..]);
                let _ = std::io::stdout().flush();
                printed = text.len();
            }
        }
        println!();
    });
    let driver_task = tokio::spawn(driver.run());

    // A limit event from either channel cancels the generation.
    let mut limit_rx = app.limits.subscribe();
    let limit_cancel = cancel.clone();
    tokio::spawn(async move {
        while let Ok(notification) = limit_rx.recv().await {
            if notification.severity == UsageSeverity::LimitExceeded {
                eprintln!("! {}", notification.event.message);
                limit_cancel.cancel();
                return;
            }
        }
    });

    let consumer = StreamConsumer::new(
        &app.config.api.base_url,
        Arc::clone(&app.rest),
        Arc::clone(&app.tokens),
        Arc::clone(&app.limits),
    );
    let body = serde_json::json!({ "prompt": prompt });
    let mut stream = consumer
        .open(body, cancel.clone())
        .await
        .map_err(|e| e.to_string())?;

    let mut failure = None;
    let mut terminated = false;
    while let Some(event) = stream.next().await {
        match event {
            GenerationEvent::Chunk { delta, .. } => typing.push(&delta),
            GenerationEvent::Complete { full_text, .. } => {
                typing.complete(&full_text);
                terminated = true;
            }
            GenerationEvent::Failed(e) => {
                failure = Some(e.user_message().to_string());
                typing.stop();
                terminated = true;
                break;
            }
        }
    }
    if !terminated {
        // Connection dropped without a terminal record.
        typing.stop();
    }

    // The driver drops the display sender when it finishes, which ends
    // the render task.
    let _ = driver_task.await;
    let _ = render.await;
    cancel.cancel();

    match failure {
        Some(message) => Err(message),
        None => Ok(()),
    }
}

async fn run_watch_usage(config: scribeflow_config::ScribeflowConfig) -> Result<(), String> {
    let app = App::build(config)?;
    let cancel = CancellationToken::new();

    let realtime = app.realtime();
    realtime.connect().await.map_err(|e| e.to_string())?;

    let orchestrator = SessionOrchestrator::new(
        Arc::clone(&realtime),
        Arc::clone(&app.tokens),
        app.config.realtime.clone(),
    );
    tokio::spawn(orchestrator.run(cancel.clone()));

    let mut limit_rx = app.limits.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            notification = limit_rx.recv() => match notification {
                Ok(n) => {
                    println!(
                        "[{:?}] {}: {}/{} ({:.0}%) {}",
                        n.severity,
                        n.event.service,
                        n.event.used,
                        n.event.limit,
                        n.event.percentage,
                        n.event.message
                    );
                }
                Err(_) => break,
            },
        }
    }

    cancel.cancel();
    realtime.disconnect().await;
    Ok(())
}
