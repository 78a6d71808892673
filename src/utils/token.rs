use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorMessage, HttpError};

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal id issued by the identity provider
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

pub fn create_token(
    principal: &str,
    secret: &[u8],
    expires_in_minutes: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    if principal.is_empty() {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
    }

    let now = Utc::now();
    let iat = now.timestamp() as usize;
    let exp = (now + Duration::minutes(expires_in_minutes)).timestamp() as usize;
    let claims = TokenClaims {
        sub: principal.to_string(),
        iat,
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Principal carried by a valid token.
pub fn decode_token<T: Into<String>>(token: T, secret: &[u8]) -> Result<String, HttpError> {
    let decoded = decode::<TokenClaims>(
        &token.into(),
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    );

    match decoded {
        Ok(token) => Ok(token.claims.sub),
        Err(_) => Err(HttpError::unauthorized(ErrorMessage::InvalidToken.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_carries_principal() {
        let secret = b"test-secret";
        let token = create_token("acc-1", secret, 10).unwrap();
        assert_eq!(decode_token(token, secret).unwrap(), "acc-1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_token("acc-1", b"one", 10).unwrap();
        assert!(decode_token(token, b"two").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = create_token("acc-1", b"secret", -10).unwrap();
        assert!(decode_token(token, b"secret").is_err());
    }
}
