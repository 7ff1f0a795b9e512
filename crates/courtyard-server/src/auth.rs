//! WebSocket upgrade tokens.
//!
//! The portal's auth/session layer issues short-lived HS256 tokens; this
//! module validates one at the upgrade and extracts the resident identity
//! the chat runtime will trust from then on.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by an upgrade token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Resident email, the stable identity key.
    pub sub: String,
    /// Display name shown to other members.
    pub name: String,
    /// Optional avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Expiry, seconds since the Unix epoch.
    pub exp: usize,
}

/// Validate a token and return its claims.
pub fn validate_token(
    secret: &str,
    token: &str,
) -> Result<TokenClaims, jsonwebtoken::errors::Error> {
    let data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Issue an upgrade token. Used by the portal's session layer when handing
/// a logged-in resident to the chat endpoint.
pub fn issue_token(
    secret: &str,
    email: &str,
    name: &str,
    avatar: Option<String>,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (chrono::Utc::now().timestamp() + ttl_secs) as usize;
    let claims = TokenClaims {
        sub: email.to_string(),
        name: name.to_string(),
        avatar,
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-long-enough-for-hs256";

    #[test]
    fn test_issue_and_validate_round_trip() {
        let token = issue_token(
            SECRET,
            "ana@example.com",
            "Ana",
            Some("https://cdn.example.com/ana.png".to_string()),
            300,
        )
        .unwrap();

        let claims = validate_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, "ana@example.com");
        assert_eq!(claims.name, "Ana");
        assert_eq!(
            claims.avatar.as_deref(),
            Some("https://cdn.example.com/ana.png")
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = issue_token(SECRET, "ana@example.com", "Ana", None, 300).unwrap();
        assert!(validate_token("some-other-secret", &token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        // Well past the default validation leeway.
        let token = issue_token(SECRET, "ana@example.com", "Ana", None, -300).unwrap();
        let err = validate_token(SECRET, &token).unwrap_err();
        assert!(matches!(
            err.kind(),
            jsonwebtoken::errors::ErrorKind::ExpiredSignature
        ));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(validate_token(SECRET, "not.a.token").is_err());
    }
}
