/*!
 * # Authentication and Authorization Module
 *
 * Operators authenticate with `Authorization: Bearer <token>`. Tokens are
 * never stored: configuration carries the hex SHA-256 of each operator's
 * token together with the operator's roles. Roles resolve to capability
 * strings (see [`permissions`]) which services check before every action.
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::OperatorConfig;
use crate::errors::ServiceError;

mod permissions;
mod rbac;

pub use permissions::*;
pub use rbac::*;

/// An authenticated operator and the capabilities granted by their roles.
#[derive(Debug, Clone)]
pub struct Operator {
    pub name: String,
    pub roles: Vec<String>,
    permissions: HashSet<String>,
}

impl Operator {
    pub fn new(name: impl Into<String>, roles: Vec<String>) -> Self {
        let permissions = RbacService::new().get_permissions_for_roles(&roles);
        Self {
            name: name.into(),
            roles,
            permissions,
        }
    }

    /// Check if the operator has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if any granted permission covers `permission`
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|granted| is_permission_implied(granted, permission))
    }

    /// Fails with `Forbidden` unless the operator holds `permission`.
    pub fn require(&self, permission: &str) -> Result<(), ServiceError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            warn!(operator = %self.name, permission = %permission, "Permission denied");
            Err(ServiceError::Forbidden(format!(
                "operator '{}' lacks permission '{}'",
                self.name, permission
            )))
        }
    }
}

/// Hex SHA-256 of a bearer token, as stored in configuration.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Lookup of configured operators by token digest.
#[derive(Debug, Default)]
pub struct OperatorDirectory {
    by_digest: HashMap<String, Operator>,
}

impl OperatorDirectory {
    pub fn from_config(operators: &[OperatorConfig]) -> Self {
        let by_digest = operators
            .iter()
            .map(|op| {
                (
                    op.token_sha256.to_ascii_lowercase(),
                    Operator::new(op.name.clone(), op.roles.clone()),
                )
            })
            .collect();
        Self { by_digest }
    }

    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }

    pub fn authenticate(&self, token: &str) -> Option<Operator> {
        self.by_digest.get(&token_digest(token)).cloned()
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Operator
where
    S: Send + Sync,
    Arc<OperatorDirectory>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let directory = Arc::<OperatorDirectory>::from_ref(state);

        let token = bearer_token(parts)
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

        match directory.authenticate(token) {
            Some(operator) => {
                debug!(operator = %operator.name, "Operator authenticated");
                Ok(operator)
            }
            None => {
                warn!("Rejected request with unknown bearer token");
                Err(ServiceError::Unauthorized("unknown bearer token".to_string()))
            }
        }
    }
}
