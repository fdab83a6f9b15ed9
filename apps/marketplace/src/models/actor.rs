// apps/marketplace/src/models/actor.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Buyer,
  Supplier,
  Admin,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Role::Buyer => "buyer",
      Role::Supplier => "supplier",
      Role::Admin => "admin",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = AppError;

  fn from_str(value: &str) -> AppResult<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "buyer" => Ok(Role::Buyer),
      "supplier" => Ok(Role::Supplier),
      "admin" => Ok(Role::Admin),
      other => Err(AppError::Auth(format!("Unknown role '{}'", other))),
    }
  }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Actor {
  pub user_id: Uuid,
  pub role: Role,
}

impl Actor {
  pub fn new(user_id: Uuid, role: Role) -> Self {
    Self { user_id, role }
  }

  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }

  pub fn require(&self, allowed: &[Role]) -> AppResult<()> {
    if allowed.contains(&self.role) {
      Ok(())
    } else {
      Err(AppError::Forbidden(format!(
        "Role '{}' may not perform this operation",
        self.role
      )))
    }
  }
}
