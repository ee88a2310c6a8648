//! rumqttc-backed transport.
//!
//! `MqttConnector::open` builds a fresh `AsyncClient` per session connect and
//! drives its `EventLoop` in a spawned task (see [`crate::handler`]). The
//! returned `MqttChannel` owns the client half; closing it aborts the loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, MqttOptions, SubscribeFilter, Transport};
use tokio::task::JoinHandle;
use uuid::Uuid;

use cp_protocol::{Credential, QoS};
use cp_session::{Channel, Connector, EventSink, SessionResult};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};
use crate::{handler, sigv4};

/// Map a session QoS onto the rumqttc one.
pub fn mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
    }
}

/// Connection options for one connect attempt.
///
/// WebSocket mode targets the SigV4-presigned URL (signed at `now`); plaintext
/// mode connects straight to the credential's endpoint.
pub fn broker_options(
    config: &MqttConfig,
    credential: &Credential,
    client_id: &str,
    now: DateTime<Utc>,
) -> MqttResult<MqttOptions> {
    let mut options = if config.use_websocket {
        let url = sigv4::presigned_url(credential, now)?;
        let mut options = MqttOptions::new(client_id, url, config.port);
        options.set_transport(Transport::wss_with_default_config());
        options
    } else {
        MqttOptions::new(client_id, credential.broker_endpoint.trim(), config.port)
    };
    options.set_keep_alive(Duration::from_secs(config.keepalive_secs.into()));
    options.set_clean_session(true);
    Ok(options)
}

/// Opens MQTT connections with a fixed transport configuration.
#[derive(Debug, Clone, Default)]
pub struct MqttConnector {
    config: MqttConfig,
}

impl MqttConnector {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    fn client_id(&self) -> String {
        format!("{}-{}", self.config.client_id_prefix, Uuid::now_v7().simple())
    }
}

impl Connector for MqttConnector {
    fn open(&self, credential: &Credential, events: EventSink) -> SessionResult<Arc<dyn Channel>> {
        let client_id = self.client_id();
        let options = broker_options(&self.config, credential, &client_id, Utc::now())?;

        tracing::info!(
            client_id = %client_id,
            endpoint = %credential.broker_endpoint,
            websocket = self.config.use_websocket,
            epoch = events.epoch(),
            "opening MQTT connection"
        );

        let (client, eventloop) = AsyncClient::new(options, self.config.request_capacity);
        let reconnect_delay = Duration::from_secs(self.config.reconnect_delay_secs);
        let pump = tokio::spawn(handler::run(eventloop, events, reconnect_delay));

        Ok(Arc::new(MqttChannel { client, pump }))
    }
}

/// One open MQTT connection.
pub struct MqttChannel {
    client: AsyncClient,
    pump: JoinHandle<()>,
}

#[async_trait]
impl Channel for MqttChannel {
    async fn subscribe(&self, subscriptions: &[(String, QoS)]) -> SessionResult<()> {
        let filters: Vec<SubscribeFilter> = subscriptions
            .iter()
            .map(|(topic, qos)| SubscribeFilter::new(topic.clone(), mqtt_qos(*qos)))
            .collect();
        self.client
            .subscribe_many(filters)
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()).into())
    }

    async fn unsubscribe(&self, topics: &[String]) -> SessionResult<()> {
        for topic in topics {
            self.client
                .unsubscribe(topic.as_str())
                .await
                .map_err(|e| MqttError::Unsubscribe(e.to_string()))?;
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> SessionResult<()> {
        self.client
            .publish(topic, mqtt_qos(qos), false, payload.to_vec())
            .await
            .map_err(|e| MqttError::Publish(e.to_string()).into())
    }

    fn close(&self) {
        if !self.pump.is_finished() {
            // Best effort; the loop is torn down right after either way.
            let _ = self.client.try_disconnect();
            tracing::debug!("closing MQTT connection");
        }
        self.pump.abort();
    }
}

impl Drop for MqttChannel {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
