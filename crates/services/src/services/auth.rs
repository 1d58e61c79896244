//! Bearer-token verification for requests from the identity provider.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::AuthConfig;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication is not configured: set AUTH_JWT_PUBLIC_KEY or AUTH_JWT_SECRET")]
    NotConfigured,
    #[error("invalid verification key: {0}")]
    InvalidKey(String),
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exp: i64,
}

/// The caller a verified token speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub identity: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl AuthenticatedUser {
    pub fn email_or_empty(&self) -> &str {
        self.email.as_deref().unwrap_or_default()
    }
}

/// Extracts the token from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[derive(Clone)]
pub struct AuthVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl AuthVerifier {
    /// RS256 against the provider's PEM public key.
    pub fn from_rsa_pem(pem: &str) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(Self::with_key(key, Algorithm::RS256))
    }

    /// HS256 with a shared secret.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        match (&config.jwt_public_key, &config.jwt_secret) {
            (Some(pem), _) => Self::from_rsa_pem(pem),
            (None, Some(secret)) => Ok(Self::from_secret(secret.expose_secret().as_bytes())),
            (None, None) => Err(AuthError::NotConfigured),
        }
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        Self { key, validation }
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidToken("empty subject".to_string()));
        }
        Ok(AuthenticatedUser {
            identity: claims.sub,
            email: claims.email,
            name: claims.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use secrecy::SecretString;

    use super::*;

    const SECRET: &[u8] = b"test-signing-secret";

    fn token(sub: &str, email: Option<&str>, exp_offset: i64, secret: &[u8]) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            email: email.map(str::to_string),
            name: None,
            exp: Utc::now().timestamp() + exp_offset,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn test_valid_token() {
        let verifier = AuthVerifier::from_secret(SECRET);
        let user = verifier
            .verify(&token("user_1", Some("a@example.com"), 3600, SECRET))
            .unwrap();
        assert_eq!(user.identity, "user_1");
        assert_eq!(user.email_or_empty(), "a@example.com");
    }

    #[test]
    fn test_rejects_expired_and_forged() {
        let verifier = AuthVerifier::from_secret(SECRET);
        assert!(matches!(
            verifier.verify(&token("user_1", None, -3600, SECRET)),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            verifier.verify(&token("user_1", None, 3600, b"other-secret")),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            verifier.verify("not-a-jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer   abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn test_from_config() {
        assert!(matches!(
            AuthVerifier::from_config(&AuthConfig::default()),
            Err(AuthError::NotConfigured)
        ));
        let config = AuthConfig {
            jwt_public_key: None,
            jwt_secret: Some(SecretString::from("s3cret")),
        };
        assert!(AuthVerifier::from_config(&config).is_ok());

        let config = AuthConfig {
            jwt_public_key: Some("not a pem".to_string()),
            jwt_secret: None,
        };
        assert!(matches!(
            AuthVerifier::from_config(&config),
            Err(AuthError::InvalidKey(_))
        ));
    }
}
