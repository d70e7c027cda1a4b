//! Gemini Live text turn
//!
//! Connects to the Gemini Live API, sends one text prompt and prints the
//! model's reply as it streams back.
//!
//! # Usage
//!
//! ```bash
//! export GEMINI_API_KEY="your-api-key"   # or put it in .env
//! cargo run -p adk-live --example live_text_turn
//! ```

use adk_live::{
    ConnectionEvent, ContentEvent, DiagnosticEvent, LiveConfig, LiveSession, telemetry,
};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

const PROMPT: &str = "Hello! Please introduce yourself in one sentence.";

async fn run(config: LiveConfig) -> anyhow::Result<()> {
    let session = LiveSession::with_websocket(config);
    let mut content = session.events().subscribe_content();
    let mut connection = session.events().subscribe_connection();
    let mut diagnostic = session.events().subscribe_diagnostic();

    session.connect().await?;
    info!(session_id = ?session.session_id(), "Connected");

    info!(prompt = PROMPT, "Sending text turn");
    session.send_text(PROMPT).await?;

    let mut reply = String::new();
    let deadline = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!("Timed out waiting for the reply");
                break;
            }
            event = content.recv() => match event {
                Ok(ContentEvent::Text(text)) => {
                    info!(text = %text, "Received text");
                    if !reply.is_empty() {
                        reply.push(' ');
                    }
                    reply.push_str(&text);
                }
                Ok(ContentEvent::TurnComplete) => {
                    info!("Turn complete");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Content channel");
                    break;
                }
            },
            event = connection.recv() => match event {
                Ok(ConnectionEvent::Disconnected { reason }) => {
                    warn!(reason = %reason, "Connection closed");
                    break;
                }
                Ok(ConnectionEvent::Failed(err)) => {
                    error!(kind = %err.kind, error = %err.message, "Connection failed");
                    break;
                }
                _ => {}
            },
            event = diagnostic.recv() => {
                if let Ok(DiagnosticEvent::Usage(usage)) = event {
                    info!(total_tokens = usage.total_tokens, "Usage");
                }
            }
        }
    }

    let state = session.state();
    info!(
        sent = state.messages_sent,
        received = state.messages_received,
        reply = %reply,
        "Summary"
    );

    session.disconnect().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    if let Err(e) = telemetry::init_tracing("live-text-turn") {
        eprintln!("{}", e);
    }

    let config = match LiveConfig::from_env() {
        Ok(config) => config.with_text_only(),
        Err(e) => {
            error!(error = %e, "Set GEMINI_API_KEY (or GOOGLE_API_KEY) first");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Live session failed");
            ExitCode::FAILURE
        }
    }
}
