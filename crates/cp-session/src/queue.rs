//! Outbound publish queue.
//!
//! Messages are always queued first and delivered by flushing. A flush takes
//! the whole queue as a snapshot, so publishes arriving mid-flush wait for the
//! next one. Failed messages go back to the tail of the live queue and are
//! retried on the next flush; there is no retry limit and no backoff.

use std::collections::VecDeque;

use cp_protocol::QoS;

use crate::channel::Channel;

/// A publish waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub topic: String,
    /// Encoded body; empty for a publish without a body.
    pub payload: Vec<u8>,
    pub qos: QoS,
    /// Position in enqueue order. Re-queued messages get a fresh one.
    pub sequence: u64,
}

/// Messages taken out of the queue for one flush attempt.
#[derive(Debug)]
pub struct FlushBatch {
    /// Queue generation the snapshot was taken from.
    pub generation: u64,
    pub messages: Vec<QueuedMessage>,
}

/// FIFO of outbound messages.
#[derive(Debug, Default)]
pub struct PublishQueue {
    messages: VecDeque<QueuedMessage>,
    next_sequence: u64,
    /// Bumped by `clear`; failures from older snapshots are not re-queued.
    generation: u64,
}

impl PublishQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its sequence number.
    pub fn enqueue(&mut self, topic: impl Into<String>, payload: Vec<u8>, qos: QoS) -> u64 {
        let sequence = self.bump_sequence();
        self.messages.push_back(QueuedMessage {
            topic: topic.into(),
            payload,
            qos,
            sequence,
        });
        sequence
    }

    /// Empty the live queue into a snapshot for delivery.
    pub fn take_snapshot(&mut self) -> FlushBatch {
        FlushBatch {
            generation: self.generation,
            messages: self.messages.drain(..).collect(),
        }
    }

    /// Put a failed message back at the tail.
    ///
    /// Dropped (returns `false`) if the queue was cleared after the snapshot
    /// the message came from.
    pub fn requeue(&mut self, generation: u64, mut message: QueuedMessage) -> bool {
        if generation != self.generation {
            return false;
        }
        message.sequence = self.bump_sequence();
        self.messages.push_back(message);
        true
    }

    /// Drop every queued message and invalidate outstanding snapshots.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.messages.iter()
    }

    fn bump_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

/// Publish `messages` in order, each independently. Returns the ones that failed.
pub async fn deliver(channel: &dyn Channel, messages: Vec<QueuedMessage>) -> Vec<QueuedMessage> {
    let mut failed = Vec::new();
    for message in messages {
        tracing::debug!(
            topic = %message.topic,
            sequence = message.sequence,
            bytes = message.payload.len(),
            "publishing queued message"
        );
        if let Err(e) = channel
            .publish(&message.topic, &message.payload, message.qos)
            .await
        {
            tracing::warn!(topic = %message.topic, error = %e, "publish failed, re-queueing");
            failed.push(message);
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChannel;

    fn topics(queue: &PublishQueue) -> Vec<(String, Vec<u8>)> {
        queue
            .iter()
            .map(|m| (m.topic.clone(), m.payload.clone()))
            .collect()
    }

    #[test]
    fn enqueue_preserves_order() {
        let mut queue = PublishQueue::new();
        let first = queue.enqueue("t", b"m1".to_vec(), QoS::AtLeastOnce);
        let second = queue.enqueue("t", b"m2".to_vec(), QoS::AtMostOnce);
        assert!(first < second);
        assert_eq!(
            topics(&queue),
            vec![("t".into(), b"m1".to_vec()), ("t".into(), b"m2".to_vec())]
        );
    }

    #[test]
    fn snapshot_empties_live_queue() {
        let mut queue = PublishQueue::new();
        queue.enqueue("t", b"m1".to_vec(), QoS::AtLeastOnce);
        let batch = queue.take_snapshot();
        assert_eq!(batch.messages.len(), 1);
        assert!(queue.is_empty());

        // Arrives mid-flush: belongs to the next flush, not this one.
        queue.enqueue("t", b"m2".to_vec(), QoS::AtLeastOnce);
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn requeue_goes_behind_newer_messages() {
        let mut queue = PublishQueue::new();
        queue.enqueue("t", b"m1".to_vec(), QoS::AtLeastOnce);
        let mut batch = queue.take_snapshot();
        queue.enqueue("t", b"m2".to_vec(), QoS::AtLeastOnce);

        let failed = batch.messages.remove(0);
        let old_sequence = failed.sequence;
        assert!(queue.requeue(batch.generation, failed));

        let order: Vec<_> = queue.iter().map(|m| m.payload.clone()).collect();
        assert_eq!(order, vec![b"m2".to_vec(), b"m1".to_vec()]);
        assert!(queue.iter().last().unwrap().sequence > old_sequence);
    }

    #[test]
    fn requeue_after_clear_is_dropped() {
        let mut queue = PublishQueue::new();
        queue.enqueue("t", b"m1".to_vec(), QoS::AtLeastOnce);
        let mut batch = queue.take_snapshot();
        queue.clear();

        assert!(!queue.requeue(batch.generation, batch.messages.remove(0)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn failed_message_is_isolated_and_retried() {
        let channel = MockChannel::new();
        channel.fail_publish_once(b"m1");

        let mut queue = PublishQueue::new();
        queue.enqueue("t", b"m1".to_vec(), QoS::AtLeastOnce);
        queue.enqueue("t", b"m2".to_vec(), QoS::AtLeastOnce);

        let batch = queue.take_snapshot();
        let failed = deliver(&channel, batch.messages).await;
        for message in failed {
            queue.requeue(batch.generation, message);
        }

        assert_eq!(topics(&queue), vec![("t".into(), b"m1".to_vec())]);
        assert_eq!(channel.delivered_payloads(), vec![b"m2".to_vec()]);

        let batch = queue.take_snapshot();
        assert!(deliver(&channel, batch.messages).await.is_empty());
        assert_eq!(
            channel.delivered_payloads(),
            vec![b"m2".to_vec(), b"m1".to_vec()]
        );
        assert!(queue.is_empty());
    }
}
