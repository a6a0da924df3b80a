use std::sync::Arc;

use crate::{
    events::EventSender,
    services::{ncr::NcrService, returns::ReturnService, Clock},
    store::RecordStore,
};

pub mod health;
pub mod ncr;
pub mod reports;
pub mod returns;
pub(crate) mod sse;

/// Service container shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub returns: Arc<ReturnService>,
    pub ncr: Arc<NcrService>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
        clock: Arc<dyn Clock>,
        batch_max_selection: usize,
    ) -> Self {
        let returns = Arc::new(ReturnService::new(
            store.clone(),
            event_sender.clone(),
            clock.clone(),
            batch_max_selection,
        ));
        let ncr = Arc::new(NcrService::new(
            store,
            event_sender,
            clock,
            returns.clone(),
        ));
        Self { returns, ncr }
    }
}
