use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::Role;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub role: Role,
    pub exp: usize,  // Expiration timestamp
}

pub fn generate_token(user_id: Uuid, role: Role, secret: &str, ttl_days: i64) -> Result<String, AppError> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(ttl_days))
        .ok_or_else(|| AppError::InternalServerError("Invalid token lifetime".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::InternalServerError("Token generation error".to_string()))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(jsonwebtoken::Algorithm::HS256),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates_with_same_secret() {
        let user_id = Uuid::new_v4();
        let token = generate_token(user_id, Role::Admin, "secret", 1).unwrap();
        let claims = validate_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = generate_token(Uuid::new_v4(), Role::Employee, "one", 1).unwrap();
        assert!(validate_token(&token, "two").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = generate_token(Uuid::new_v4(), Role::Employee, "secret", -2).unwrap();
        assert!(validate_token(&token, "secret").is_err());
    }
}
