//! In-process fan-out of execution updates.
//!
//! The execution table stays the source of truth; subscribers only get a
//! push of each row as it is written.

use tokio::sync::broadcast;

use agentforge_core::domain::execution::Execution;

#[derive(Clone)]
pub struct ExecutionEvents {
    tx: broadcast::Sender<Execution>,
}

impl ExecutionEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishing without subscribers is not an error.
    pub fn publish(&self, execution: &Execution) {
        let _ = self.tx.send(execution.clone());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Execution> {
        self.tx.subscribe()
    }
}

impl Default for ExecutionEvents {
    fn default() -> Self {
        Self::new(1024)
    }
}
