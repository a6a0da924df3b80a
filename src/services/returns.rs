use crate::{
    auth::{consts as perm, Operator},
    commands::{
        returns::{
            BatchOutcome, CompleteReturnCommand, ConfirmDocumentedCommand, CreateReturnCommand,
            GradeReturnCommand, GradeReturnRequest, ReceiveReturnCommand, ReturnDraft,
        },
        Command,
    },
    errors::ServiceError,
    events::EventSender,
    models::{Disposition, ReturnRecord, ReturnStatus},
    queries::{
        return_queries::{DispositionBoard, DispositionBoardQuery, GetReturnQuery, ListReturnsQuery},
        Query,
    },
    services::Clock,
    store::{Collection, LiveCollection, RecordStore},
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Service for the return pipeline: intake, grading, batch execution and close-out.
#[derive(Clone)]
pub struct ReturnService {
    store: Arc<dyn RecordStore>,
    event_sender: Arc<EventSender>,
    clock: Arc<dyn Clock>,
    batch_max_selection: usize,
}

impl ReturnService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
        clock: Arc<dyn Clock>,
        batch_max_selection: usize,
    ) -> Self {
        Self {
            store,
            event_sender,
            clock,
            batch_max_selection,
        }
    }

    /// Lists returns, optionally restricted to one pipeline stage
    #[instrument(skip(self, operator), fields(operator = %operator.name))]
    pub async fn list_returns(
        &self,
        operator: &Operator,
        status: Option<ReturnStatus>,
    ) -> Result<Vec<ReturnRecord>, ServiceError> {
        operator.require(perm::RETURNS_READ)?;
        ListReturnsQuery { status }.execute(self.store.as_ref()).await
    }

    #[instrument(skip(self, operator), fields(operator = %operator.name))]
    pub async fn get_return(
        &self,
        operator: &Operator,
        return_id: &str,
    ) -> Result<ReturnRecord, ServiceError> {
        operator.require(perm::RETURNS_READ)?;
        GetReturnQuery {
            return_id: return_id.to_string(),
        }
        .execute(self.store.as_ref())
        .await
    }

    /// Graded returns grouped into the five execution buckets
    #[instrument(skip(self, operator), fields(operator = %operator.name))]
    pub async fn disposition_board(
        &self,
        operator: &Operator,
    ) -> Result<DispositionBoard, ServiceError> {
        operator.require(perm::RETURNS_READ)?;
        DispositionBoardQuery.execute(self.store.as_ref()).await
    }

    /// Live view of the returns collection.
    pub async fn watch_returns(
        &self,
        operator: &Operator,
    ) -> Result<LiveCollection<ReturnRecord>, ServiceError> {
        operator.require(perm::RETURNS_READ)?;
        let receiver = self.store.subscribe(Collection::Returns).await?;
        Ok(LiveCollection::new(receiver))
    }

    /// Files a new return request
    #[instrument(skip(self, operator, draft), fields(operator = %operator.name))]
    pub async fn create_return(
        &self,
        operator: &Operator,
        draft: ReturnDraft,
    ) -> Result<ReturnRecord, ServiceError> {
        operator.require(perm::RETURNS_CREATE)?;
        let command = CreateReturnCommand {
            draft,
            requested_on: self.clock.today(),
        };
        command
            .execute(self.store.clone(), self.event_sender.clone())
            .await
    }

    /// Marks a requested return as physically received
    #[instrument(skip(self, operator), fields(operator = %operator.name))]
    pub async fn receive_return(
        &self,
        operator: &Operator,
        return_id: &str,
    ) -> Result<ReturnRecord, ServiceError> {
        operator.require(perm::RETURNS_RECEIVE)?;
        let command = ReceiveReturnCommand {
            return_id: return_id.to_string(),
            received_on: self.clock.today(),
        };
        command
            .execute(self.store.clone(), self.event_sender.clone())
            .await
    }

    /// Records condition and disposition of a received return
    #[instrument(skip(self, operator, grade), fields(operator = %operator.name))]
    pub async fn grade_return(
        &self,
        operator: &Operator,
        return_id: &str,
        grade: GradeReturnRequest,
    ) -> Result<ReturnRecord, ServiceError> {
        operator.require(perm::RETURNS_GRADE)?;
        let command = GradeReturnCommand {
            return_id: return_id.to_string(),
            grade,
            graded_on: self.clock.today(),
        };
        command
            .execute(self.store.clone(), self.event_sender.clone())
            .await
    }

    /// Confirms execution for a selection of graded returns. Each record
    /// advances or fails on its own.
    #[instrument(skip(self, operator, ids), fields(operator = %operator.name, selected = ids.len()))]
    pub async fn confirm_documented(
        &self,
        operator: &Operator,
        ids: Vec<String>,
        disposition: Option<Disposition>,
    ) -> Result<BatchOutcome, ServiceError> {
        operator.require(perm::RETURNS_DOCUMENT)?;
        let command = ConfirmDocumentedCommand {
            ids,
            disposition,
            documented_on: self.clock.today(),
            max_selection: self.batch_max_selection,
        };
        let outcome = command
            .execute(self.store.clone(), self.event_sender.clone())
            .await?;
        info!(summary = %outcome.summary(), "Documented batch processed");
        Ok(outcome)
    }

    /// Closes a documented return
    #[instrument(skip(self, operator), fields(operator = %operator.name))]
    pub async fn complete_return(
        &self,
        operator: &Operator,
        return_id: &str,
    ) -> Result<ReturnRecord, ServiceError> {
        operator.require(perm::RETURNS_COMPLETE)?;
        let command = CompleteReturnCommand {
            return_id: return_id.to_string(),
            completed_on: self.clock.today(),
        };
        command
            .execute(self.store.clone(), self.event_sender.clone())
            .await
    }
}
