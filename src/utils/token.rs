use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::user::Role;

/// Issues an HS256 bearer token for `user_id` valid for `ttl_hours`.
pub fn issue_access_token(
    user_id: Uuid,
    role: Role,
    secret: &str,
    ttl_hours: i64,
) -> Result<(String, DateTime<Utc>)> {
    if ttl_hours <= 0 {
        return Err(Error::Config("JWT_TTL_HOURS must be positive".to_string()));
    }
    let expires_at = Utc::now() + Duration::hours(ttl_hours);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expires_at.timestamp() as usize,
        role: Some(role.as_str().to_string()),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, expires_at))
}

pub fn decode_access_token(token: &str, secret: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_decodes_with_same_secret() {
        let user_id = Uuid::new_v4();
        let (token, expires_at) =
            issue_access_token(user_id, Role::Teacher, "s3cret", 2).unwrap();
        assert!(expires_at > Utc::now());

        let claims = decode_access_token(&token, "s3cret").unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.role().unwrap(), Role::Teacher);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, _) = issue_access_token(Uuid::new_v4(), Role::Student, "a", 1).unwrap();
        assert!(matches!(decode_access_token(&token, "b"), Err(Error::Jwt(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: (Utc::now() - Duration::hours(1)).timestamp() as usize,
            role: Some("student".to_string()),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"k"),
        )
        .unwrap();
        assert!(decode_access_token(&token, "k").is_err());
    }

    #[test]
    fn non_positive_ttl_is_a_config_error() {
        let res = issue_access_token(Uuid::new_v4(), Role::Student, "k", 0);
        assert!(matches!(res, Err(Error::Config(_))));
    }
}
