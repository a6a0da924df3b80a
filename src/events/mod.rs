use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::{Disposition, ReturnStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event after a transition has been persisted. A failed send is
    /// logged only; the transition stands.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Domain event dropped");
        }
    }
}

/// Domain events of the returns workflow and NCR registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ReturnCreated {
        id: String,
        ncr_number: Option<String>,
    },
    ReturnReceived(String),
    ReturnGraded {
        id: String,
        disposition: Disposition,
    },
    ReturnDocumented(String),
    ReturnCompleted(String),
    ReturnSyncedFromNcr {
        return_id: String,
        ncr_no: String,
    },
    NcrCreated {
        id: String,
        ncr_no: String,
    },
    NcrUpdated(String),
    NcrCanceled {
        id: String,
        by: String,
    },
}

impl Event {
    /// Status a return reached, for the events that advance one.
    pub fn return_status(&self) -> Option<ReturnStatus> {
        match self {
            Event::ReturnCreated { .. } => Some(ReturnStatus::Requested),
            Event::ReturnReceived(_) => Some(ReturnStatus::Received),
            Event::ReturnGraded { .. } => Some(ReturnStatus::Graded),
            Event::ReturnDocumented(_) => Some(ReturnStatus::Documented),
            Event::ReturnCompleted(_) => Some(ReturnStatus::Completed),
            _ => None,
        }
    }
}

/// Creates the event channel used by services and the processor.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::ReturnCreated { id, ncr_number } => {
                info!(return_id = %id, ncr_number = ?ncr_number, "Return requested");
            }
            Event::ReturnGraded { id, disposition } => {
                info!(return_id = %id, disposition = %disposition, "Return graded");
            }
            Event::ReturnReceived(id) | Event::ReturnDocumented(id) | Event::ReturnCompleted(id) => {
                info!(
                    return_id = %id,
                    status = ?event.return_status(),
                    "Return advanced"
                );
            }
            Event::ReturnSyncedFromNcr { return_id, ncr_no } => {
                info!(return_id = %return_id, ncr_no = %ncr_no, "Return synced from NCR");
            }
            Event::NcrCreated { id, ncr_no } => {
                info!(ncr_id = %id, ncr_no = %ncr_no, "NCR created");
            }
            Event::NcrUpdated(id) => {
                info!(ncr_id = %id, "NCR updated");
            }
            Event::NcrCanceled { id, by } => {
                info!(ncr_id = %id, canceled_by = %by, "NCR canceled");
            }
        }
    }

    warn!("Event processing loop has ended");
}
