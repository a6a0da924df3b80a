use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use super::optional_date;
use super::return_record::ActionFlags;
use crate::store::{to_document, Document, StoreError};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
pub enum NcrStatus {
    #[default]
    Open,
    Closed,
    Canceled,
}

impl NcrStatus {
    pub fn is_canceled(self) -> bool {
        self == NcrStatus::Canceled
    }
}

/// Problem checklist of an NCR document. Any subset may be ticked.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProblemFlags {
    pub problem_damaged: bool,
    pub problem_lost: bool,
    pub problem_mixed: bool,
    pub problem_wrong_inv: bool,
    pub problem_late: bool,
    pub problem_duplicate: bool,
    pub problem_wrong: bool,
    pub problem_incomplete: bool,
    pub problem_over: bool,
    pub problem_wrong_info: bool,
    pub problem_short_expiry: bool,
    pub problem_transport_damage: bool,
    pub problem_accident: bool,
    pub problem_other: bool,
    pub problem_other_text: Option<String>,
}

impl ProblemFlags {
    /// Every fixed checklist entry with its tick state, in form order.
    pub fn checklist(&self) -> [(&'static str, bool); 13] {
        [
            ("Damaged", self.problem_damaged),
            ("Lost", self.problem_lost),
            ("Mixed product", self.problem_mixed),
            ("Wrong vs invoice", self.problem_wrong_inv),
            ("Late delivery", self.problem_late),
            ("Duplicate delivery", self.problem_duplicate),
            ("Wrong delivery", self.problem_wrong),
            ("Incomplete delivery", self.problem_incomplete),
            ("Over delivery", self.problem_over),
            ("Wrong information", self.problem_wrong_info),
            ("Short expiry", self.problem_short_expiry),
            ("Damaged in transport", self.problem_transport_damage),
            ("Accident", self.problem_accident),
        ]
    }

    /// Labels of the ticked problems, in form order.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .checklist()
            .iter()
            .filter(|(_, ticked)| *ticked)
            .map(|(label, _)| label.to_string())
            .collect();

        if self.problem_other {
            if let Some(text) = self
                .problem_other_text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
            {
                labels.push(format!("Other: {}", text));
            }
        }
        labels
    }
}

/// One line of an NCR document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NcrItem {
    pub id: Option<String>,
    pub product_code: String,
    pub product_name: String,
    pub customer_name: String,
    pub branch: String,
    pub destination_customer: String,
    pub quantity: Decimal,
    pub unit: String,
    pub price_bill: Decimal,
    #[serde(with = "optional_date")]
    pub expiry_date: Option<NaiveDate>,
    pub problem_source: String,
    pub has_cost: bool,
    pub cost_amount: Decimal,
    pub cost_responsible: Option<String>,
    pub ref_no: Option<String>,
    pub neo_ref_no: Option<String>,
}

impl NcrItem {
    /// An item carries cost when it is flagged or has a non-zero amount.
    pub fn carries_cost(&self) -> bool {
        self.has_cost || !self.cost_amount.is_zero()
    }

    /// Case-insensitive substring match over the searchable item fields.
    /// `needle` must already be lowercase.
    pub fn matches_text(&self, needle: &str) -> bool {
        [
            &self.customer_name,
            &self.product_name,
            &self.product_code,
            &self.branch,
            &self.destination_customer,
            &self.problem_source,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Everything on an NCR document except its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NcrHeader {
    pub id: String,
    #[serde(default)]
    pub ncr_no: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub to_dept: Option<String>,
    #[serde(default)]
    pub copy_to: Option<String>,
    #[serde(default)]
    pub founder: Option<String>,
    #[serde(default)]
    pub po_no: Option<String>,
    #[serde(default)]
    pub problem_detail: String,
    #[serde(default)]
    pub status: NcrStatus,
    #[serde(flatten)]
    pub problems: ProblemFlags,
    #[serde(flatten)]
    pub actions: ActionFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_by: Option<String>,
}

impl NcrHeader {
    /// Number shown to operators; old documents without one fall back to the id.
    pub fn display_no(&self) -> &str {
        if self.ncr_no.trim().is_empty() {
            &self.id
        } else {
            &self.ncr_no
        }
    }
}

/// The two stored shapes of NCR lines. Documents written before multi-line
/// NCRs carry a single embedded `item`.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemShape {
    LegacySingle(NcrItem),
    ItemList(Vec<NcrItem>),
}

impl ItemShape {
    pub fn from_fields(items: Option<Vec<NcrItem>>, item: Option<NcrItem>) -> Self {
        match (items, item) {
            (Some(items), _) if !items.is_empty() => ItemShape::ItemList(items),
            (_, Some(item)) => ItemShape::LegacySingle(item),
            (items, None) => ItemShape::ItemList(items.unwrap_or_default()),
        }
    }

    pub fn into_items(self) -> Vec<NcrItem> {
        match self {
            ItemShape::LegacySingle(item) => vec![item],
            ItemShape::ItemList(items) => items,
        }
    }
}

/// Raw stored document, before line normalization.
#[derive(Debug, Deserialize)]
struct NcrDocument {
    #[serde(flatten)]
    header: NcrHeader,
    #[serde(default)]
    items: Option<Vec<NcrItem>>,
    #[serde(default)]
    item: Option<NcrItem>,
}

/// One non-conformance document. Lines are always a list internally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NcrDocument")]
pub struct NcrRecord {
    #[serde(flatten)]
    pub header: NcrHeader,
    pub items: Vec<NcrItem>,
}

impl From<NcrDocument> for NcrRecord {
    fn from(doc: NcrDocument) -> Self {
        NcrRecord {
            header: doc.header,
            items: ItemShape::from_fields(doc.items, doc.item).into_items(),
        }
    }
}

impl NcrRecord {
    pub fn is_canceled(&self) -> bool {
        self.header.status.is_canceled()
    }

    pub fn has_cost(&self) -> bool {
        self.items.iter().any(NcrItem::carries_cost)
    }
}

/// Partial update of an NCR document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NcrPatch {
    pub date: Option<NaiveDate>,
    pub to_dept: Option<String>,
    pub copy_to: Option<String>,
    pub founder: Option<String>,
    pub po_no: Option<String>,
    pub problem_detail: Option<String>,
    pub status: Option<NcrStatus>,
    pub problems: Option<ProblemFlags>,
    pub actions: Option<ActionFlags>,
    pub items: Option<Vec<NcrItem>>,
}

impl NcrPatch {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.to_dept.is_none()
            && self.copy_to.is_none()
            && self.founder.is_none()
            && self.po_no.is_none()
            && self.problem_detail.is_none()
            && self.status.is_none()
            && self.problems.is_none()
            && self.actions.is_none()
            && self.items.is_none()
    }

    /// Flattens the patch into store fields. Writing `items` also drops a
    /// legacy single `item` so the new list is authoritative.
    pub fn to_document(&self) -> Result<Document, StoreError> {
        let mut doc = Document::new();
        let mut put = |key: &str, value: Value| {
            doc.insert(key.to_string(), value);
        };

        if let Some(date) = self.date {
            put("date", Value::String(date.format("%Y-%m-%d").to_string()));
        }
        for (key, value) in [
            ("toDept", &self.to_dept),
            ("copyTo", &self.copy_to),
            ("founder", &self.founder),
            ("poNo", &self.po_no),
            ("problemDetail", &self.problem_detail),
        ] {
            if let Some(text) = value {
                put(key, Value::String(text.clone()));
            }
        }
        if let Some(status) = self.status {
            put("status", Value::String(status.to_string()));
        }
        if let Some(items) = &self.items {
            put("items", serde_json::to_value(items)?);
            put("item", Value::Null);
        }

        if let Some(problems) = &self.problems {
            doc.extend(to_document(problems)?);
        }
        if let Some(actions) = &self.actions {
            doc.extend(to_document(actions)?);
        }
        Ok(doc)
    }
}
