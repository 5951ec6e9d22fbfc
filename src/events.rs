use tokio::sync::broadcast;
use tracing::debug;

use crate::protos::pbft::v1::Request;

#[derive(Debug, Clone, PartialEq)]
pub enum PbftEvent {
    /// A request committed and every lower sequence number was already delivered.
    /// Published in strictly increasing sequence order.
    Committed {
        view: u64,
        sequence: u64,
        request: Request,
    },
}

/// Hands committed requests to the execution collaborator.
///
/// Events are not retained: a subscriber that falls more than the bus
/// capacity behind loses the oldest ones (`RecvError::Lagged` on the tokio
/// bus), and events published while nobody is subscribed are dropped.
pub trait PbftEventBus: Clone + Send + Sync + 'static {
    /// Type returned to consumers that subscribe to events.
    type Receiver;

    fn subscribe(&self) -> Self::Receiver;
    fn publish(&self, event: PbftEvent);
}

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<PbftEvent>,
}

impl BroadcastEventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl PbftEventBus for BroadcastEventBus {
    type Receiver = broadcast::Receiver<PbftEvent>;

    fn subscribe(&self) -> Self::Receiver {
        self.sender.subscribe()
    }

    fn publish(&self, event: PbftEvent) {
        if let Err(broadcast::error::SendError(PbftEvent::Committed { sequence, .. })) =
            self.sender.send(event)
        {
            debug!("No subscriber for committed sequence {sequence}, event dropped");
        }
    }
}
