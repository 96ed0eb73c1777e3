// Control Plane Bus - in-process pub/sub for control-plane traffic
//
// Implements the ControlPlanePublisher port on top of tokio broadcast
// channels. Used when the controller and its observers share a process
// (tests, embedded deployments); broker-backed deployments provide their
// own publisher.

use crate::domain::control_plane::{
    ControlEvent, ControlPlaneError, ControlPlanePublisher, ControlSignal, RoutingKey,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// One message as seen by bus subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlMessage {
    Signal {
        routing_key: RoutingKey,
        signal: ControlSignal,
    },
    Event {
        routing_key: RoutingKey,
        event: ControlEvent,
    },
}

impl ControlMessage {
    pub fn routing_key(&self) -> &RoutingKey {
        match self {
            Self::Signal { routing_key, .. } | Self::Event { routing_key, .. } => routing_key,
        }
    }
}

/// Broadcast bus for control-plane signals and events
#[derive(Clone)]
pub struct ControlPlaneBus {
    sender: Arc<broadcast::Sender<ControlMessage>>,
}

impl ControlPlaneBus {
    /// Capacity determines how many messages can be buffered before slow
    /// subscribers start lagging
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    fn publish(&self, message: ControlMessage) {
        debug!(routing_key = %message.routing_key(), "Publishing control message");

        let receiver_count = self.sender.send(message).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to control message");
        }
    }

    /// Subscribe to every control message
    pub fn subscribe(&self) -> ControlReceiver {
        ControlReceiver {
            receiver: self.sender.subscribe(),
            pattern: None,
        }
    }

    /// Subscribe to messages whose routing key matches a topic binding
    /// pattern (`*` = one segment, trailing `#` = rest)
    pub fn bind(&self, pattern: impl Into<String>) -> ControlReceiver {
        ControlReceiver {
            receiver: self.sender.subscribe(),
            pattern: Some(pattern.into()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ControlPlaneBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl ControlPlanePublisher for ControlPlaneBus {
    async fn publish_signal(
        &self,
        routing_key: &RoutingKey,
        signal: &ControlSignal,
    ) -> Result<(), ControlPlaneError> {
        self.publish(ControlMessage::Signal {
            routing_key: routing_key.clone(),
            signal: signal.clone(),
        });
        Ok(())
    }

    async fn publish_event(
        &self,
        routing_key: &RoutingKey,
        event: &ControlEvent,
    ) -> Result<(), ControlPlaneError> {
        self.publish(ControlMessage::Event {
            routing_key: routing_key.clone(),
            event: event.clone(),
        });
        Ok(())
    }
}

/// Receiver for control messages, optionally filtered by binding pattern
pub struct ControlReceiver {
    receiver: broadcast::Receiver<ControlMessage>,
    pattern: Option<String>,
}

impl ControlReceiver {
    fn accepts(&self, message: &ControlMessage) -> bool {
        self.pattern
            .as_deref()
            .map_or(true, |p| message.routing_key().matches(p))
    }

    /// Receive the next matching message
    pub async fn recv(&mut self) -> Result<ControlMessage, ControlBusError> {
        loop {
            let message = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => ControlBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Control receiver lagged by {} messages", n);
                    ControlBusError::Lagged(n)
                }
            })?;

            if self.accepts(&message) {
                return Ok(message);
            }
        }
    }

    /// Try to receive a matching message without blocking
    pub fn try_recv(&mut self) -> Result<ControlMessage, ControlBusError> {
        loop {
            let message = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => ControlBusError::Empty,
                broadcast::error::TryRecvError::Closed => ControlBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Control receiver lagged by {} messages", n);
                    ControlBusError::Lagged(n)
                }
            })?;

            if self.accepts(&message) {
                return Ok(message);
            }
        }
    }
}

/// Errors that can occur when receiving control messages
#[derive(Debug, thiserror::Error)]
pub enum ControlBusError {
    #[error("Control bus is closed")]
    Closed,

    #[error("No messages available")]
    Empty,

    #[error("Receiver lagged by {0} messages (messages were dropped)")]
    Lagged(u64),
}


