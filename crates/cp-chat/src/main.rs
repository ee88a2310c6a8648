//! Cargoplane chat: a terminal chat room on one topic.
//!
//! Lines typed on stdin are published to the room; messages from the room
//! are printed. Credentials are renewed before they expire.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use cp_chat::chat::{self, ChatMessage};
use cp_chat::config::ChatConfig;
use cp_chat::credentials::CredentialSource;
use cp_mqtt_channel::MqttConnector;
use cp_protocol::QoS;
use cp_session::{LifecycleEvent, LifecycleStream, Session};

/// Pause before retrying after a connection attempt ended without a renewal.
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "cargoplane-chat.toml".to_string());
    let config = ChatConfig::from_file(&config_path)?;

    let subscriber = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    if config.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        topic = %config.topic,
        nickname = %config.nickname,
        "cp-chat starting"
    );

    // ── Session ─────────────────────────────────────────────────
    let source = config.credential_source()?;
    let connector = Arc::new(MqttConnector::new(config.mqtt.clone()));
    let session = Session::with_config(connector, config.session.clone());

    let mut messages = session.observe::<ChatMessage>(&config.topic, QoS::AtLeastOnce);
    let mut events = session.connect(source.fetch().await?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    log_event(&event);
                    if chat::needs_renewal(&event) {
                        if let Some(renewed) = renew(&session, &source).await {
                            events = renewed;
                        }
                    }
                }
                None => {
                    tracing::warn!(delay_secs = RETRY_DELAY.as_secs(), "session ended, reconnecting");
                    tokio::time::sleep(RETRY_DELAY).await;
                    if let Some(renewed) = renew(&session, &source).await {
                        events = renewed;
                    }
                }
            },
            message = messages.recv() => match message {
                Some(message) => println!("{}", message.render()),
                None => {
                    tracing::error!("chat stream closed");
                    break;
                }
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Some(message) = ChatMessage::from_input(&line, &config.nickname) {
                        session.publish(&config.topic, Some(&message), QoS::AtLeastOnce)?;
                    }
                }
                None => {
                    tracing::info!("stdin closed");
                    break;
                }
            },
            // Graceful shutdown on SIGINT/SIGTERM
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    session.disconnect();
    tracing::info!("cp-chat stopped");
    Ok(())
}

/// Fetch fresh credentials and reconnect. Keeps the current connection on failure.
async fn renew(session: &Session, source: &CredentialSource) -> Option<LifecycleStream> {
    match source.fetch().await {
        Ok(credential) => {
            tracing::info!("renewing connection with fresh credentials");
            Some(session.connect(credential))
        }
        Err(e) => {
            tracing::error!(error = %e, "credential renewal failed");
            None
        }
    }
}

fn log_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::Error { reason } => tracing::error!(reason = %reason, "session error"),
        LifecycleEvent::Disconnected => tracing::warn!("offline"),
        other => tracing::info!(event = %other, "session event"),
    }
}
