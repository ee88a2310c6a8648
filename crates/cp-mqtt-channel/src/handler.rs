//! Event loop driver for one MQTT connection.
//!
//! Translates rumqttc events into `TransportEvent`s so the session never
//! sees rumqttc types, and keeps polling (which reconnects) after errors.

use std::time::Duration;

use rumqttc::{ConnectReturnCode, ConnectionError, Event, EventLoop, Packet};

use cp_protocol::RawPayload;
use cp_session::{EventSink, TransportEvent};

/// Map one rumqttc event to a transport event, if it is one the session cares about.
pub fn classify(event: &Event) -> Option<TransportEvent> {
    let Event::Incoming(packet) = event else {
        return None;
    };

    match packet {
        Packet::ConnAck(ack) if ack.code == ConnectReturnCode::Success => {
            Some(TransportEvent::ConnectSuccess)
        }
        Packet::ConnAck(ack) => Some(TransportEvent::ConnectFailure(format!(
            "connection refused: {:?}",
            ack.code
        ))),
        Packet::Publish(publish) => Some(TransportEvent::MessageReceived {
            topic: publish.topic.clone(),
            payload: RawPayload::Bytes(publish.payload.to_vec()),
        }),
        Packet::Disconnect => Some(TransportEvent::Disconnected(
            "broker closed the connection".to_string(),
        )),
        _ => None,
    }
}

/// Transport events for a failed poll.
///
/// A drop of an established connection is a disconnect; a failure before the
/// broker accepted us is a failed connect. Refusals are also reported as errors.
pub fn classify_error(err: &ConnectionError, was_connected: bool) -> Vec<TransportEvent> {
    let mut events = Vec::new();
    if let ConnectionError::ConnectionRefused(code) = err {
        events.push(TransportEvent::Error(format!("connection refused: {code:?}")));
    }
    if was_connected {
        events.push(TransportEvent::Disconnected(err.to_string()));
    } else {
        events.push(TransportEvent::ConnectFailure(err.to_string()));
    }
    events
}

/// Poll `eventloop` until its client is gone or nobody listens to `sink`.
pub async fn run(mut eventloop: EventLoop, sink: EventSink, reconnect_delay: Duration) {
    let epoch = sink.epoch();
    let mut connected = false;

    if !sink.emit(TransportEvent::Connecting) {
        return;
    }

    loop {
        match eventloop.poll().await {
            Ok(event) => {
                let Some(transport_event) = classify(&event) else {
                    continue;
                };
                match transport_event {
                    TransportEvent::ConnectSuccess => {
                        tracing::info!(epoch, "MQTT connected");
                        connected = true;
                    }
                    TransportEvent::ConnectFailure(_) | TransportEvent::Disconnected(_) => {
                        connected = false;
                    }
                    _ => {}
                }
                if !sink.emit(transport_event) {
                    break;
                }
            }
            Err(ConnectionError::RequestsDone) => {
                tracing::debug!(epoch, "MQTT client dropped, stopping event loop");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    epoch,
                    error = %e,
                    delay_secs = reconnect_delay.as_secs(),
                    "MQTT event loop error, reconnecting"
                );
                for transport_event in classify_error(&e, connected) {
                    if !sink.emit(transport_event) {
                        return;
                    }
                }
                connected = false;

                tokio::time::sleep(reconnect_delay).await;
                if !sink.emit(TransportEvent::Connecting) {
                    break;
                }
            }
        }
    }
}
