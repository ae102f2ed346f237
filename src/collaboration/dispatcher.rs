//! Event fan-out to the members of one room.

use futures_util::future::join_all;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::registry::Member;
use super::types::ConnectionId;
use crate::server::websocket::types::ServerMessage;

/// Outcome of one [`BroadcastDispatcher::deliver`] call
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Recipients whose channel was closed or stayed full past the timeout
    pub unreachable: Vec<ConnectionId>,
}

/// Never fails a broadcast because of one recipient: a closed channel is
/// skipped, and a full one gets `send_timeout` before the recipient is
/// reported unreachable. Slow recipients are waited on concurrently, so a
/// single call is bounded by one timeout.
#[derive(Clone, Debug)]
pub struct BroadcastDispatcher {
    send_timeout: Duration,
}

impl BroadcastDispatcher {
    pub fn new(send_timeout: Duration) -> Self {
        Self { send_timeout }
    }

    pub async fn deliver(&self, recipients: &[Member], event: &ServerMessage) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut stalled: Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> = Vec::new();

        for member in recipients {
            match member.outbound.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    stalled.push((member.connection_id, member.outbound.clone()));
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        "Connection {} already closed, skipping {}",
                        member.connection_id,
                        event.event_name()
                    );
                    report.unreachable.push(member.connection_id);
                }
            }
        }

        if !stalled.is_empty() {
            let timeout = self.send_timeout;
            let attempts = stalled.into_iter().map(|(connection_id, outbound)| {
                let event = event.clone();
                async move {
                    let sent = tokio::time::timeout(timeout, outbound.send(event)).await;
                    (connection_id, matches!(sent, Ok(Ok(()))))
                }
            });

            for (connection_id, sent) in join_all(attempts).await {
                if sent {
                    report.delivered += 1;
                } else {
                    warn!(
                        "Dropping connection {}: {} not accepted within {:?}",
                        connection_id,
                        event.event_name(),
                        timeout
                    );
                    report.unreachable.push(connection_id);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(outbound: mpsc::Sender<ServerMessage>) -> Member {
        Member {
            connection_id: ConnectionId::new(),
            user_label: "user".to_string(),
            joined_at: Utc::now(),
            outbound,
        }
    }

    #[tokio::test]
    async fn test_delivers_to_every_recipient() {
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let dispatcher = BroadcastDispatcher::new(Duration::from_millis(50));

        let report = dispatcher
            .deliver(&[member(tx_a), member(tx_b)], &ServerMessage::Pong)
            .await;

        assert_eq!(report.delivered, 2);
        assert!(report.unreachable.is_empty());
        assert_eq!(rx_a.recv().await, Some(ServerMessage::Pong));
        assert_eq!(rx_b.recv().await, Some(ServerMessage::Pong));
    }

    #[tokio::test]
    async fn test_closed_recipient_does_not_fail_broadcast() {
        let (tx_live, mut rx_live) = mpsc::channel(4);
        let (tx_dead, rx_dead) = mpsc::channel(4);
        drop(rx_dead);
        let dead = member(tx_dead);
        let dead_id = dead.connection_id;
        let dispatcher = BroadcastDispatcher::new(Duration::from_millis(50));

        let report = dispatcher
            .deliver(&[dead, member(tx_live)], &ServerMessage::Pong)
            .await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.unreachable, vec![dead_id]);
        assert_eq!(rx_live.recv().await, Some(ServerMessage::Pong));
    }

    #[tokio::test]
    async fn test_stalled_recipient_times_out() {
        let (tx_slow, _rx_slow) = mpsc::channel(1);
        tx_slow.try_send(ServerMessage::Pong).unwrap();
        let slow = member(tx_slow);
        let slow_id = slow.connection_id;
        let (tx_fast, mut rx_fast) = mpsc::channel(4);
        let dispatcher = BroadcastDispatcher::new(Duration::from_millis(20));

        let started = std::time::Instant::now();
        let report = dispatcher
            .deliver(&[slow, member(tx_fast)], &ServerMessage::Pong)
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.unreachable, vec![slow_id]);
        assert_eq!(rx_fast.recv().await, Some(ServerMessage::Pong));
    }
}
