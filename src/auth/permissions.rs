/*!
 * # Permissions Module
 *
 * Capabilities are `resource:action` strings. `resource:*` grants every
 * action on a resource and `*` grants everything.
 */

use lazy_static::lazy_static;
use std::collections::HashMap;

/// Permission definition
#[derive(Debug, Clone)]
pub struct Permission {
    pub name: String,
    pub description: String,
    pub resource_type: String,
    pub action: String,
}

/// Resource types
pub struct Resources;

impl Resources {
    pub const RETURNS: &'static str = "returns";
    pub const NCR: &'static str = "ncr";
    pub const REPORTS: &'static str = "reports";
}

/// Permission string constants for compile-time safety
pub mod consts {
    // Returns
    pub const RETURNS_READ: &str = "returns:read";
    pub const RETURNS_CREATE: &str = "returns:create";
    pub const RETURNS_RECEIVE: &str = "returns:receive";
    pub const RETURNS_GRADE: &str = "returns:grade";
    pub const RETURNS_DOCUMENT: &str = "returns:document";
    pub const RETURNS_COMPLETE: &str = "returns:complete";

    // NCR
    pub const NCR_READ: &str = "ncr:read";
    pub const NCR_CREATE: &str = "ncr:create";
    pub const NCR_UPDATE: &str = "ncr:update";
    pub const NCR_CANCEL: &str = "ncr:cancel";

    // Reports
    pub const REPORTS_EXPORT: &str = "reports:export";
}

/// Format a permission string
pub fn format_permission(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}

lazy_static! {
    pub static ref PERMISSIONS: HashMap<String, Permission> = {
        let catalog: [(&str, &str, &str); 11] = [
            (Resources::RETURNS, "read", "View return records, stage lists and the disposition board"),
            (Resources::RETURNS, "create", "File return requests, including from an NCR item"),
            (Resources::RETURNS, "receive", "Mark requested returns as physically received"),
            (Resources::RETURNS, "grade", "Record condition and disposition of received returns"),
            (Resources::RETURNS, "document", "Confirm execution of graded returns in batches"),
            (Resources::RETURNS, "complete", "Close out documented returns"),
            (Resources::NCR, "read", "View and print NCR documents"),
            (Resources::NCR, "create", "Raise new NCR documents"),
            (Resources::NCR, "update", "Edit open or closed NCR documents"),
            (Resources::NCR, "cancel", "Cancel NCR documents"),
            (Resources::REPORTS, "export", "Export the NCR report as CSV"),
        ];

        catalog
            .iter()
            .map(|(resource, action, description)| {
                let name = format_permission(resource, action);
                (
                    name.clone(),
                    Permission {
                        name,
                        description: description.to_string(),
                        resource_type: resource.to_string(),
                        action: action.to_string(),
                    },
                )
            })
            .collect()
    };
}

/// Whether `granted` (possibly a wildcard) covers `required`.
pub fn is_permission_implied(granted: &str, required: &str) -> bool {
    if granted == "*" || granted == required {
        return true;
    }
    match granted.strip_suffix(":*") {
        Some(resource) => required
            .split_once(':')
            .map_or(false, |(required_resource, _)| required_resource == resource),
        None => false,
    }
}
