pub mod ncr;
pub mod return_record;

pub use ncr::{ItemShape, NcrHeader, NcrItem, NcrPatch, NcrRecord, NcrStatus, ProblemFlags};
pub use return_record::{
    ActionCategory, ActionFlags, Disposition, DispositionDetails, ItemCondition, ReturnPatch,
    ReturnRecord, ReturnStatus,
};

/// Dates written by the old web client are either `YYYY-MM-DD` or an empty
/// string; both must load.
pub(crate) mod optional_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Treats `None`, empty and whitespace-only strings alike.
pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
