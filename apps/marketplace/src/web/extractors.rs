// apps/marketplace/src/web/extractors.rs

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Actor, Role};

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

fn header<'a>(req: &'a HttpRequest, name: &str) -> Result<&'a str, AppError> {
  req
    .headers()
    .get(name)
    .and_then(|value| value.to_str().ok())
    .ok_or_else(|| AppError::Auth(format!("Missing or unreadable {} header", name)))
}

fn actor_from_headers(req: &HttpRequest) -> Result<Actor, AppError> {
  let user_id = Uuid::parse_str(header(req, USER_ID_HEADER)?)
    .map_err(|_| AppError::Auth(format!("{} must be a UUID", USER_ID_HEADER)))?;
  let role: Role = header(req, USER_ROLE_HEADER)?.parse()?;
  Ok(Actor::new(user_id, role))
}

/// The caller, as asserted by the gateway in front of this service.
impl FromRequest for Actor {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let actor = actor_from_headers(req);
    if let Err(e) = &actor {
      warn!(path = %req.path(), "Rejected request without a valid identity: {}", e);
    }
    ready(actor)
  }
}

/// `Idempotency-Key` header, trimmed; absent when missing or blank.
pub fn idempotency_key(req: &HttpRequest) -> Option<String> {
  req
    .headers()
    .get("Idempotency-Key")
    .and_then(|value| value.to_str().ok())
    .map(|key| key.trim().to_string())
    .filter(|key| !key.is_empty())
}
