use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::user::Role;
use crate::utils::token::decode_access_token;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| Error::Unauthorized("Malformed subject".to_string()))
    }

    pub fn role(&self) -> Result<Role> {
        self.role
            .as_deref()
            .unwrap_or_default()
            .parse::<Role>()
            .map_err(|_| Error::Unauthorized("Unknown role".to_string()))
    }

    pub fn is_staff(&self) -> bool {
        self.role().map(|r| r.is_staff()).unwrap_or(false)
    }

    /// Fails with `Forbidden` unless the caller holds one of `allowed`.
    pub fn require_role(&self, allowed: &[Role]) -> Result<Role> {
        let role = self.role()?;
        if allowed.contains(&role) {
            Ok(role)
        } else {
            Err(Error::Forbidden(format!(
                "Role '{}' may not perform this action",
                role.as_str()
            )))
        }
    }
}

fn unauthorized(code: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": code }))).into_response()
}

pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(auth_header) = req.headers().get(AUTHORIZATION) else {
        return unauthorized("missing_authorization");
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return unauthorized("bad_authorization");
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return unauthorized("unsupported_scheme");
    };

    match decode_access_token(token, state.auth_service.jwt_secret()) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "rejected bearer token");
            unauthorized("invalid_token")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Option<&str>) -> Claims {
        Claims {
            sub: Uuid::new_v4().to_string(),
            exp: 0,
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn role_checks() {
        let teacher = claims(Some("teacher"));
        assert!(teacher.is_staff());
        assert!(teacher.require_role(&[Role::Teacher, Role::Admin]).is_ok());
        assert!(matches!(
            teacher.require_role(&[Role::Student]),
            Err(Error::Forbidden(_))
        ));

        let student = claims(Some("student"));
        assert!(!student.is_staff());
    }

    #[test]
    fn missing_role_is_unauthorized() {
        let c = claims(None);
        assert!(!c.is_staff());
        assert!(matches!(c.role(), Err(Error::Unauthorized(_))));
    }

    #[test]
    fn malformed_subject() {
        let mut c = claims(Some("student"));
        c.sub = "42".to_string();
        assert!(matches!(c.user_id(), Err(Error::Unauthorized(_))));
    }
}
