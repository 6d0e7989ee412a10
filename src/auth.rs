//! Caller identity
//!
//! Token verification happens upstream; by the time a request reaches this
//! service the gateway has put the verified user id into a header
//! (`x-user-id` unless configured otherwise).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// The authenticated owner of every row a request touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub i64);

impl Owner {
    pub fn id(&self) -> i64 {
        self.0
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = state.config().auth.user_header.as_str();
        let raw = parts
            .headers
            .get(header)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {header} header")))?;

        parse_owner(raw.to_str().unwrap_or_default())
            .ok_or_else(|| AppError::Unauthorized(format!("invalid {header} header")))
    }
}

fn parse_owner(raw: &str) -> Option<Owner> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0).map(Owner)
}
