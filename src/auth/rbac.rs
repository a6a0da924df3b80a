/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Fixed roles and the capabilities they grant.
 */

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use super::permissions::{consts, is_permission_implied};

/// Role definition with associated permissions
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
}

fn role(name: &str, description: &str, permissions: &[&str]) -> (String, Role) {
    (
        name.to_string(),
        Role {
            name: name.to_string(),
            description: description.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        },
    )
}

lazy_static! {
    pub static ref ROLES: HashMap<String, Role> = [
        role("admin", "Administrator with full access", &["*"]),
        role(
            "qc_manager",
            "Quality manager: every return and NCR action, including cancel",
            &["returns:*", "ncr:*", consts::REPORTS_EXPORT],
        ),
        role(
            "warehouse",
            "Warehouse staff: intake, grading and execution of returns",
            &[
                consts::RETURNS_READ,
                consts::RETURNS_RECEIVE,
                consts::RETURNS_GRADE,
                consts::RETURNS_DOCUMENT,
                consts::RETURNS_COMPLETE,
                consts::NCR_READ,
            ],
        ),
        role(
            "branch_clerk",
            "Branch clerk: files return requests and NCRs",
            &[
                consts::RETURNS_READ,
                consts::RETURNS_CREATE,
                consts::NCR_READ,
                consts::NCR_CREATE,
            ],
        ),
        role(
            "viewer",
            "Read-only access with report export",
            &[consts::RETURNS_READ, consts::NCR_READ, consts::REPORTS_EXPORT],
        ),
    ]
    .into_iter()
    .collect();
}

/// RBAC service resolving roles to permissions
#[derive(Clone, Default)]
pub struct RbacService;

impl RbacService {
    pub fn new() -> Self {
        Self
    }

    /// Get a role by name
    pub fn get_role(&self, role_name: &str) -> Option<&'static Role> {
        ROLES.get(role_name)
    }

    /// Union of the permissions of all named roles. Unknown roles grant nothing.
    pub fn get_permissions_for_roles(&self, role_names: &[String]) -> HashSet<String> {
        let mut permissions = HashSet::new();

        for role_name in role_names {
            match ROLES.get(role_name) {
                Some(role) => permissions.extend(role.permissions.iter().cloned()),
                None => warn!("Role not found: {}", role_name),
            }
        }

        permissions
    }

    /// Check if a granted permission covers a required permission
    pub fn check_permission(&self, user_permission: &str, required_permission: &str) -> bool {
        is_permission_implied(user_permission, required_permission)
    }
}
