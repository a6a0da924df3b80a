use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::optional_date;

/// Lifecycle of a returned unit. Transitions are strictly linear.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
pub enum ReturnStatus {
    #[default]
    Requested,
    Received,
    Graded,
    Documented,
    Completed,
}

impl ReturnStatus {
    /// The only status this one may advance to.
    pub fn next(self) -> Option<ReturnStatus> {
        match self {
            ReturnStatus::Requested => Some(ReturnStatus::Received),
            ReturnStatus::Received => Some(ReturnStatus::Graded),
            ReturnStatus::Graded => Some(ReturnStatus::Documented),
            ReturnStatus::Documented => Some(ReturnStatus::Completed),
            ReturnStatus::Completed => None,
        }
    }

    pub fn can_advance_to(self, target: ReturnStatus) -> bool {
        self.next() == Some(target)
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    pub fn all() -> impl Iterator<Item = ReturnStatus> {
        ReturnStatus::iter()
    }
}

/// Outcome of grading. The fixed set covers what the QC screen offers; anything
/// else the inspector types is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemCondition {
    #[default]
    Unknown,
    New,
    BoxDamage,
    WetBox,
    LabelDefect,
    Expired,
    Damaged,
    Defective,
    Other(String),
}

impl ItemCondition {
    pub fn is_unknown(&self) -> bool {
        matches!(self, ItemCondition::Unknown)
    }

    /// Saleable-looking conditions; the rest are grouped as bad.
    pub fn is_good(&self) -> bool {
        matches!(
            self,
            ItemCondition::New
                | ItemCondition::BoxDamage
                | ItemCondition::WetBox
                | ItemCondition::LabelDefect
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            ItemCondition::Unknown => "Unknown",
            ItemCondition::New => "New",
            ItemCondition::BoxDamage => "BoxDamage",
            ItemCondition::WetBox => "WetBox",
            ItemCondition::LabelDefect => "LabelDefect",
            ItemCondition::Expired => "Expired",
            ItemCondition::Damaged => "Damaged",
            ItemCondition::Defective => "Defective",
            ItemCondition::Other(text) => text,
        }
    }
}

impl From<String> for ItemCondition {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "" | "Unknown" => ItemCondition::Unknown,
            "New" => ItemCondition::New,
            "BoxDamage" => ItemCondition::BoxDamage,
            "WetBox" => ItemCondition::WetBox,
            "LabelDefect" => ItemCondition::LabelDefect,
            "Expired" => ItemCondition::Expired,
            "Damaged" => ItemCondition::Damaged,
            "Defective" => ItemCondition::Defective,
            other => ItemCondition::Other(other.to_string()),
        }
    }
}

impl From<&str> for ItemCondition {
    fn from(raw: &str) -> Self {
        ItemCondition::from(raw.to_string())
    }
}

impl From<ItemCondition> for String {
    fn from(condition: ItemCondition) -> Self {
        condition.as_str().to_string()
    }
}

/// Decided fate of a graded item.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum Disposition {
    #[default]
    Pending,
    #[serde(rename = "RTV")]
    #[strum(serialize = "RTV")]
    Rtv,
    Restock,
    Recycle,
    InternalUse,
    Claim,
}

impl Disposition {
    /// Execution buckets in board order.
    pub const BUCKETS: [Disposition; 5] = [
        Disposition::Rtv,
        Disposition::Restock,
        Disposition::Recycle,
        Disposition::InternalUse,
        Disposition::Claim,
    ];

    pub fn is_pending(self) -> bool {
        self == Disposition::Pending
    }

    pub fn label(self) -> &'static str {
        match self {
            Disposition::Pending => "Pending",
            Disposition::Rtv => "Return to vendor",
            Disposition::Restock => "Restock / sell",
            Disposition::Recycle => "Scrap",
            Disposition::InternalUse => "Internal use",
            Disposition::Claim => "Insurance claim",
        }
    }
}

/// Disposition-specific payload captured at grading time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispositionDetails {
    /// Truck route for RTV.
    pub disposition_route: Option<String>,
    /// Buyer name for Restock.
    pub seller_name: Option<String>,
    pub contact_phone: Option<String>,
    pub internal_use_detail: Option<String>,
    pub claim_company: Option<String>,
    pub claim_coordinator: Option<String>,
    pub claim_phone: Option<String>,
}

impl DispositionDetails {
    /// Names of the required sub-fields that are blank for `disposition`.
    pub fn missing_for(&self, disposition: Disposition) -> Vec<&'static str> {
        let required: Vec<(&'static str, Option<&str>)> = match disposition {
            Disposition::Rtv => vec![("dispositionRoute", self.disposition_route.as_deref())],
            Disposition::Restock => vec![("sellerName", self.seller_name.as_deref())],
            Disposition::InternalUse => {
                vec![("internalUseDetail", self.internal_use_detail.as_deref())]
            }
            Disposition::Claim => vec![("claimCompany", self.claim_company.as_deref())],
            Disposition::Recycle | Disposition::Pending => Vec::new(),
        };
        required
            .into_iter()
            .filter(|(_, value)| super::is_blank(*value))
            .map(|(name, _)| name)
            .collect()
    }

    /// Keeps only the sub-fields that belong to `disposition`, trimmed.
    pub fn retain_for(&self, disposition: Disposition) -> DispositionDetails {
        let keep = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        match disposition {
            Disposition::Rtv => DispositionDetails {
                disposition_route: keep(&self.disposition_route),
                ..Default::default()
            },
            Disposition::Restock => DispositionDetails {
                seller_name: keep(&self.seller_name),
                contact_phone: keep(&self.contact_phone),
                ..Default::default()
            },
            Disposition::InternalUse => DispositionDetails {
                internal_use_detail: keep(&self.internal_use_detail),
                ..Default::default()
            },
            Disposition::Claim => DispositionDetails {
                claim_company: keep(&self.claim_company),
                claim_coordinator: keep(&self.claim_coordinator),
                claim_phone: keep(&self.claim_phone),
                ..Default::default()
            },
            Disposition::Recycle | Disposition::Pending => DispositionDetails::default(),
        }
    }
}

/// Action flags shared by NCR documents and the returns they spawn.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionFlags {
    pub action_reject: bool,
    pub action_reject_qty: Decimal,
    pub action_reject_sort: bool,
    pub action_reject_sort_qty: Decimal,
    pub action_rework: bool,
    pub action_rework_qty: Decimal,
    pub action_rework_method: Option<String>,
    pub action_special_acceptance: bool,
    pub action_special_acceptance_qty: Decimal,
    pub action_special_acceptance_reason: Option<String>,
    pub action_scrap: bool,
    pub action_scrap_qty: Decimal,
    pub action_scrap_replace: bool,
    pub action_scrap_replace_qty: Decimal,
}

/// Coarse action grouping used by NCR filters and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum ActionCategory {
    Reject,
    Scrap,
}

impl ActionFlags {
    pub fn is_reject(&self) -> bool {
        self.action_reject || self.action_reject_sort
    }

    pub fn is_scrap(&self) -> bool {
        self.action_scrap
    }

    /// Reject wins over Scrap when both are ticked.
    pub fn category(&self) -> Option<ActionCategory> {
        if self.is_reject() {
            Some(ActionCategory::Reject)
        } else if self.is_scrap() {
            Some(ActionCategory::Scrap)
        } else {
            None
        }
    }

    /// Whether the document asks for goods to come back.
    pub fn triggers_return(&self) -> bool {
        self.category().is_some()
    }
}

/// One returned unit/line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRecord {
    pub id: String,
    pub branch: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub ref_no: String,
    #[serde(default)]
    pub neo_ref_no: Option<String>,
    #[serde(default)]
    pub ncr_number: Option<String>,
    pub product_code: String,
    pub product_name: String,
    pub customer_name: String,
    #[serde(default)]
    pub destination_customer: Option<String>,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub price_bill: Decimal,
    #[serde(default)]
    pub price_sell: Decimal,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default, with = "optional_date")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub problem_type: Option<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(flatten)]
    pub actions: ActionFlags,
    #[serde(default)]
    pub status: ReturnStatus,
    #[serde(default)]
    pub condition: ItemCondition,
    #[serde(default)]
    pub disposition: Disposition,
    #[serde(flatten)]
    pub disposition_details: DispositionDetails,
    pub date_requested: NaiveDate,
    #[serde(default, with = "optional_date")]
    pub date_received: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub date_graded: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub date_documented: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub date_completed: Option<NaiveDate>,
}

pub(crate) fn default_category() -> String {
    "General".to_string()
}

impl ReturnRecord {
    /// Whether the record sits in the given disposition execution bucket.
    pub fn in_bucket(&self, disposition: Disposition) -> bool {
        self.status == ReturnStatus::Graded && self.disposition == disposition
    }

    /// Grading invariant: condition and disposition are either both unset
    /// (before Graded) or both set (Graded and later).
    pub fn grading_consistent(&self) -> bool {
        let graded = self.status >= ReturnStatus::Graded;
        if graded {
            !self.condition.is_unknown() && !self.disposition.is_pending()
        } else {
            self.condition.is_unknown() && self.disposition.is_pending()
        }
    }
}

/// Partial update of a return record. Only `Some` fields are written.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReturnStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_received: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_graded: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_documented: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_completed: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<ItemCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
    /// Written as a whole so stale sub-fields of another disposition are cleared.
    #[serde(flatten)]
    pub disposition_details: Option<DispositionDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_bill: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_customer: Option<String>,
}

impl ReturnPatch {
    pub fn advance(status: ReturnStatus, on: NaiveDate) -> Self {
        let mut patch = ReturnPatch {
            status: Some(status),
            ..Default::default()
        };
        match status {
            ReturnStatus::Requested => {}
            ReturnStatus::Received => patch.date_received = Some(on),
            ReturnStatus::Graded => patch.date_graded = Some(on),
            ReturnStatus::Documented => patch.date_documented = Some(on),
            ReturnStatus::Completed => patch.date_completed = Some(on),
        }
        patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(ReturnStatus::Requested, ReturnStatus::Received, true)]
    #[case(ReturnStatus::Received, ReturnStatus::Graded, true)]
    #[case(ReturnStatus::Graded, ReturnStatus::Documented, true)]
    #[case(ReturnStatus::Documented, ReturnStatus::Completed, true)]
    #[case(ReturnStatus::Requested, ReturnStatus::Graded, false)]
    #[case(ReturnStatus::Graded, ReturnStatus::Received, false)]
    #[case(ReturnStatus::Completed, ReturnStatus::Requested, false)]
    #[case(ReturnStatus::Received, ReturnStatus::Received, false)]
    fn transitions_are_linear(
        #[case] from: ReturnStatus,
        #[case] to: ReturnStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_advance_to(to), allowed);
    }

    #[test]
    fn only_completed_is_terminal() {
        let terminal: Vec<_> = ReturnStatus::all().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![ReturnStatus::Completed]);
    }

    #[rstest]
    #[case("New", ItemCondition::New)]
    #[case("WetBox", ItemCondition::WetBox)]
    #[case("", ItemCondition::Unknown)]
    #[case("   ", ItemCondition::Unknown)]
    #[case("Unknown", ItemCondition::Unknown)]
    #[case("Pallet crushed", ItemCondition::Other("Pallet crushed".into()))]
    fn condition_parsing(#[case] raw: &str, #[case] expected: ItemCondition) {
        assert_eq!(ItemCondition::from(raw), expected);
    }

    #[test]
    fn condition_serializes_as_plain_string() {
        let value = serde_json::to_value(ItemCondition::Other("Torn seal".into())).unwrap();
        assert_eq!(value, json!("Torn seal"));
        let value = serde_json::to_value(ItemCondition::LabelDefect).unwrap();
        assert_eq!(value, json!("LabelDefect"));
    }

    #[test]
    fn disposition_uses_store_spelling() {
        assert_eq!(serde_json::to_value(Disposition::Rtv).unwrap(), json!("RTV"));
        assert_eq!("RTV".parse::<Disposition>().unwrap(), Disposition::Rtv);
        assert_eq!(
            serde_json::from_value::<Disposition>(json!("InternalUse")).unwrap(),
            Disposition::InternalUse
        );
    }

    #[test]
    fn missing_sub_fields_depend_on_disposition() {
        let details = DispositionDetails {
            seller_name: Some("Somchai".into()),
            ..Default::default()
        };
        assert_eq!(details.missing_for(Disposition::Rtv), vec!["dispositionRoute"]);
        assert!(details.missing_for(Disposition::Restock).is_empty());
        assert!(details.missing_for(Disposition::Recycle).is_empty());
        assert_eq!(details.missing_for(Disposition::Claim), vec!["claimCompany"]);
    }

    #[test]
    fn retain_for_drops_foreign_sub_fields() {
        let details = DispositionDetails {
            disposition_route: Some(" North line ".into()),
            claim_company: Some("Acme Insurance".into()),
            ..Default::default()
        };
        let kept = details.retain_for(Disposition::Rtv);
        assert_eq!(kept.disposition_route.as_deref(), Some("North line"));
        assert!(kept.claim_company.is_none());
    }

    #[test]
    fn action_category_prefers_reject() {
        let flags = ActionFlags {
            action_reject_sort: true,
            action_scrap: true,
            ..Default::default()
        };
        assert_eq!(flags.category(), Some(ActionCategory::Reject));
        assert!(!ActionFlags::default().triggers_return());
    }

    #[test]
    fn advance_patch_sets_matching_date() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let doc = serde_json::to_value(ReturnPatch::advance(ReturnStatus::Documented, day)).unwrap();
        assert_eq!(doc, json!({"status": "Documented", "dateDocumented": "2024-06-01"}));
    }

    #[test]
    fn record_loads_from_store_shape() {
        let record: ReturnRecord = serde_json::from_value(json!({
            "id": "RT-2024-88",
            "branch": "Phitsanulok",
            "date": "2024-01-05",
            "refNo": "INV-1",
            "productCode": "P-1",
            "productName": "Water 600ml",
            "customerName": "Shop A",
            "quantity": 3,
            "unit": "case",
            "priceBill": 120,
            "amount": 360,
            "expiryDate": "",
            "status": "Graded",
            "condition": "BoxDamage",
            "disposition": "RTV",
            "dispositionRoute": "North",
            "actionReject": true,
            "dateRequested": "2024-01-05",
            "dateGraded": "2024-01-07"
        }))
        .unwrap();

        assert_eq!(record.disposition, Disposition::Rtv);
        assert_eq!(record.condition, ItemCondition::BoxDamage);
        assert_eq!(record.disposition_details.disposition_route.as_deref(), Some("North"));
        assert!(record.actions.action_reject);
        assert!(record.expiry_date.is_none());
        assert_eq!(record.category, "General");
        assert!(record.grading_consistent());
    }
}
