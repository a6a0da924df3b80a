use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Query;
use crate::{
    commands::returns::load_return,
    errors::ServiceError,
    models::{Disposition, ReturnRecord, ReturnStatus},
    store::{decode_snapshot, Collection, RecordStore},
};

/// Loads every return record, ordered by id.
pub async fn all_returns(store: &dyn RecordStore) -> Result<Vec<ReturnRecord>, ServiceError> {
    let documents = store.list(Collection::Returns).await?;
    Ok(decode_snapshot(&documents))
}

/// Single return by id.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetReturnQuery {
    pub return_id: String,
}

#[async_trait]
impl Query for GetReturnQuery {
    type Result = ReturnRecord;

    async fn execute(&self, store: &dyn RecordStore) -> Result<Self::Result, ServiceError> {
        load_return(store, &self.return_id).await
    }
}

/// Pipeline stage list. Without a status every return is listed.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListReturnsQuery {
    pub status: Option<ReturnStatus>,
}

impl ListReturnsQuery {
    pub fn apply(&self, records: Vec<ReturnRecord>) -> Vec<ReturnRecord> {
        match self.status {
            Some(status) => records.into_iter().filter(|r| r.status == status).collect(),
            None => records,
        }
    }
}

#[async_trait]
impl Query for ListReturnsQuery {
    type Result = Vec<ReturnRecord>;

    async fn execute(&self, store: &dyn RecordStore) -> Result<Self::Result, ServiceError> {
        let records = self.apply(all_returns(store).await?);
        debug!(status = ?self.status, count = records.len(), "Listed returns");
        Ok(records)
    }
}

/// One column of the disposition board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardBucket {
    pub disposition: Disposition,
    pub label: &'static str,
    pub records: Vec<ReturnRecord>,
}

/// Graded returns grouped by disposition, awaiting batch execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispositionBoard {
    pub buckets: Vec<BoardBucket>,
}

impl DispositionBoard {
    /// Projects the board from the full record list. Buckets always appear,
    /// in fixed order, even when empty.
    pub fn project(records: &[ReturnRecord]) -> Self {
        let buckets = Disposition::BUCKETS
            .iter()
            .map(|&disposition| BoardBucket {
                disposition,
                label: disposition.label(),
                records: records
                    .iter()
                    .filter(|r| r.in_bucket(disposition))
                    .cloned()
                    .collect(),
            })
            .collect();
        DispositionBoard { buckets }
    }

    pub fn bucket(&self, disposition: Disposition) -> Option<&BoardBucket> {
        self.buckets.iter().find(|b| b.disposition == disposition)
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.records.len()).sum()
    }
}

#[derive(Debug, Default)]
pub struct DispositionBoardQuery;

#[async_trait]
impl Query for DispositionBoardQuery {
    type Result = DispositionBoard;

    async fn execute(&self, store: &dyn RecordStore) -> Result<Self::Result, ServiceError> {
        Ok(DispositionBoard::project(&all_returns(store).await?))
    }
}
