use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use super::{return_queries::all_returns, Query};
use crate::{
    commands::ncr::load_ncr,
    errors::ServiceError,
    models::{optional_date, ActionCategory, NcrItem, NcrRecord, NcrStatus, ReturnRecord, ReturnStatus},
    store::{decode_snapshot, Collection, RecordStore},
};

/// Loads every NCR document, ordered by id, with lines normalized to a list.
pub async fn all_ncrs(store: &dyn RecordStore) -> Result<Vec<NcrRecord>, ServiceError> {
    let documents = store.list(Collection::NcrReports).await?;
    Ok(decode_snapshot(&documents))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetNcrQuery {
    pub ncr_id: String,
}

#[async_trait]
impl Query for GetNcrQuery {
    type Result = NcrRecord;

    async fn execute(&self, store: &dyn RecordStore) -> Result<Self::Result, ServiceError> {
        load_ncr(store, &self.ncr_id).await
    }
}

/// Filter on the status of the return raised from an NCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReturnStatusFilter {
    #[default]
    All,
    NotReturned,
    Status(ReturnStatus),
}

impl FromStr for ReturnStatusFilter {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "" | "All" => Ok(ReturnStatusFilter::All),
            "NotReturned" => Ok(ReturnStatusFilter::NotReturned),
            other => other
                .parse::<ReturnStatus>()
                .map(ReturnStatusFilter::Status)
                .map_err(|_| format!("unknown return status filter: {}", other)),
        }
    }
}

impl TryFrom<String> for ReturnStatusFilter {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ReturnStatusFilter> for String {
    fn from(filter: ReturnStatusFilter) -> Self {
        match filter {
            ReturnStatusFilter::All => "All".to_string(),
            ReturnStatusFilter::NotReturned => "NotReturned".to_string(),
            ReturnStatusFilter::Status(status) => status.to_string(),
        }
    }
}

impl ReturnStatusFilter {
    fn accepts(self, linked: Option<ReturnStatus>) -> bool {
        match self {
            ReturnStatusFilter::All => true,
            ReturnStatusFilter::NotReturned => linked.is_none(),
            ReturnStatusFilter::Status(status) => linked == Some(status),
        }
    }
}

/// NCR list criteria. Every criterion is optional; an empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NcrFilter {
    #[serde(with = "optional_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(with = "optional_date")]
    pub end_date: Option<NaiveDate>,
    pub query: Option<String>,
    pub action: Option<ActionCategory>,
    pub has_cost: Option<bool>,
    pub return_status: ReturnStatusFilter,
}

impl NcrFilter {
    fn in_range(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }

    fn matches_query(&self, ncr: &NcrRecord) -> bool {
        let needle = match self.query.as_deref().map(str::trim) {
            None | Some("") => return true,
            Some(q) => q.to_lowercase(),
        };
        ncr.header.ncr_no.to_lowercase().contains(&needle)
            || ncr.header.problem_detail.to_lowercase().contains(&needle)
            || ncr.items.iter().any(|item| item.matches_text(&needle))
    }

    fn matches_action(&self, ncr: &NcrRecord) -> bool {
        match self.action {
            None => true,
            Some(ActionCategory::Reject) => ncr.header.actions.is_reject(),
            Some(ActionCategory::Scrap) => ncr.header.actions.is_scrap(),
        }
    }

    /// Header-level match; `linked` is the status of the return raised from it.
    pub fn matches(&self, ncr: &NcrRecord, linked: Option<ReturnStatus>) -> bool {
        self.in_range(ncr.header.date)
            && self.matches_query(ncr)
            && self.matches_action(ncr)
            && self.has_cost.map_or(true, |wanted| ncr.has_cost() == wanted)
            && self.return_status.accepts(linked)
    }
}

/// Status of the first return (in id order) whose `ncrNumber` equals `ncr_no`.
pub fn linked_return_status(ncr_no: &str, returns: &[ReturnRecord]) -> Option<ReturnStatus> {
    let ncr_no = ncr_no.trim();
    if ncr_no.is_empty() {
        return None;
    }
    returns
        .iter()
        .find(|r| r.ncr_number.as_deref().map(str::trim) == Some(ncr_no))
        .map(|r| r.status)
}

/// One display/export row: an NCR header paired with one of its lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NcrRow {
    pub ncr_id: String,
    pub ncr_no: String,
    pub date: NaiveDate,
    pub status: NcrStatus,
    pub problem_detail: String,
    pub action: Option<ActionCategory>,
    pub item_index: usize,
    pub item: NcrItem,
    pub return_status: Option<ReturnStatus>,
}

/// Applies `filter` and expands each matching NCR into one row per line.
/// Documents without lines produce no rows.
pub fn expand_rows(ncrs: &[NcrRecord], returns: &[ReturnRecord], filter: &NcrFilter) -> Vec<NcrRow> {
    ncrs.iter()
        .filter_map(|ncr| {
            let linked = linked_return_status(&ncr.header.ncr_no, returns);
            filter.matches(ncr, linked).then_some((ncr, linked))
        })
        .flat_map(|(ncr, linked)| {
            ncr.items.iter().enumerate().map(move |(index, item)| NcrRow {
                ncr_id: ncr.header.id.clone(),
                ncr_no: ncr.header.display_no().to_string(),
                date: ncr.header.date,
                status: ncr.header.status,
                problem_detail: ncr.header.problem_detail.clone(),
                action: ncr.header.actions.category(),
                item_index: index,
                item: item.clone(),
                return_status: linked,
            })
        })
        .collect()
}

/// Filtered NCR rows, newest document first.
#[derive(Debug, Default)]
pub struct ListNcrRowsQuery {
    pub filter: NcrFilter,
}

#[async_trait]
impl Query for ListNcrRowsQuery {
    type Result = Vec<NcrRow>;

    async fn execute(&self, store: &dyn RecordStore) -> Result<Self::Result, ServiceError> {
        let mut ncrs = all_ncrs(store).await?;
        let returns = all_returns(store).await?;
        ncrs.sort_by(|a, b| b.header.date.cmp(&a.header.date));

        let rows = expand_rows(&ncrs, &returns, &self.filter);
        debug!(documents = ncrs.len(), rows = rows.len(), "Filtered NCR rows");
        Ok(rows)
    }
}
