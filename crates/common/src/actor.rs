//! Authenticated actors.
//!
//! Authentication happens upstream; this core only receives the result and
//! authorizes by role and ownership.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UserId;

/// Role of the actor performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// A shopper who owns orders.
    Customer,

    /// A seller whose products appear as line items in orders.
    Merchant,

    /// Back-office operator with unrestricted access.
    Administrator,

    /// The platform itself (payment outcomes, webhooks).
    System,
}

impl ActorRole {
    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Customer => "customer",
            ActorRole::Merchant => "merchant",
            ActorRole::Administrator => "administrator",
            ActorRole::System => "system",
        }
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a role name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown actor role: {0}")]
pub struct ParseRoleError(pub String);

impl std::str::FromStr for ActorRole {
    type Err = ParseRoleError;

    /// Parses externally supplied roles. `system` is internal and never
    /// accepted from the outside.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(ActorRole::Customer),
            "merchant" => Ok(ActorRole::Merchant),
            "administrator" | "admin" => Ok(ActorRole::Administrator),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// An already-authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: ActorRole,
}

impl Actor {
    /// Creates an actor with the given id and role.
    pub fn new(id: UserId, role: ActorRole) -> Self {
        Self { id, role }
    }

    pub fn customer(id: UserId) -> Self {
        Self::new(id, ActorRole::Customer)
    }

    pub fn merchant(id: UserId) -> Self {
        Self::new(id, ActorRole::Merchant)
    }

    pub fn administrator(id: UserId) -> Self {
        Self::new(id, ActorRole::Administrator)
    }

    /// The platform actor used for payment outcomes and webhooks.
    ///
    /// Its id is the nil UUID so history entries written by the platform
    /// are recognizable.
    pub fn system() -> Self {
        Self::new(UserId::from_uuid(uuid::Uuid::nil()), ActorRole::System)
    }

    /// Returns true for roles that bypass ownership checks.
    pub fn is_privileged(&self) -> bool {
        matches!(self.role, ActorRole::Administrator | ActorRole::System)
    }
}
