//! # rf-auth-simple
//!
//! Argon2-based implementation of `AuthProvider`.
//! Handles password hashing and signed, expiring bearer tokens.
//!
//! A token is `base64url(payload).base64url(hmac)` where the payload is
//! `<user_id>:<expiry_unix>`. Only the user id goes into the token; role
//! checks always go through the database, so a demoted account cannot keep
//! acting on a stale claim.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rf_core::error::{AppError, Result};
use rf_core::traits::AuthProvider;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub struct SimpleAuthProvider {
    /// Secret for token signatures (e.g., from an environment variable).
    secret: Vec<u8>,
    token_ttl: Duration,
}

impl SimpleAuthProvider {
    pub fn new(secret: &str, token_ttl_minutes: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            token_ttl: Duration::minutes(token_ttl_minutes),
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Storage(format!("hmac init: {e}")))
    }

    fn issue_token_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<String> {
        let expiry = now + self.token_ttl;
        let payload = format!("{user_id}:{}", expiry.timestamp());

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }
}

fn unauthorized(reason: &str) -> AppError {
    AppError::Unauthorized(reason.to_string())
}

impl AuthProvider for SimpleAuthProvider {
    /// Hashes with a fresh random salt; the PHC string carries everything
    /// needed for later verification.
    fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Storage(format!("password hashing: {e}")))
    }

    /// Verifies if a provided password matches a stored Argon2 hash.
    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    fn issue_token(&self, user_id: Uuid) -> Result<String> {
        self.issue_token_at(user_id, Utc::now())
    }

    /// Checks signature (constant-time) and expiry, returning the subject.
    fn verify_token(&self, token: &str) -> Result<Uuid> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or_else(|| unauthorized("malformed token"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| unauthorized("malformed token"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| unauthorized("malformed token"))?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| unauthorized("invalid token signature"))?;

        let payload = String::from_utf8(payload).map_err(|_| unauthorized("malformed token"))?;
        let (user_id, expiry) = payload
            .split_once(':')
            .ok_or_else(|| unauthorized("malformed token"))?;
        let expiry: i64 = expiry.parse().map_err(|_| unauthorized("malformed token"))?;

        if Utc::now().timestamp() > expiry {
            return Err(unauthorized("please log in again"));
        }
        Uuid::parse_str(user_id).map_err(|_| unauthorized("malformed token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SimpleAuthProvider {
        SimpleAuthProvider::new("test-secret", 30)
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let auth = provider();
        let hash = auth.hash_password("hunter22").unwrap();
        assert!(auth.verify_password("hunter22", &hash));
        assert!(!auth.verify_password("hunter23", &hash));
        assert!(!auth.verify_password("hunter22", "not-a-phc-string"));
    }

    #[test]
    fn token_round_trip() {
        let auth = provider();
        let user_id = Uuid::now_v7();
        let token = auth.issue_token(user_id).unwrap();
        assert_eq!(auth.verify_token(&token).unwrap(), user_id);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let auth = provider();
        let token = auth.issue_token(Uuid::now_v7()).unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        assert!(auth.verify_token(&tampered).is_err());

        // Payload swapped for another user, signature kept.
        let signature = token.split_once('.').unwrap().1;
        let forged_payload =
            URL_SAFE_NO_PAD.encode(format!("{}:{}", Uuid::now_v7(), i64::MAX));
        assert!(auth
            .verify_token(&format!("{forged_payload}.{signature}"))
            .is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = provider();
        let token = auth
            .issue_token_at(Uuid::now_v7(), Utc::now() - Duration::hours(1))
            .unwrap();
        assert!(matches!(
            auth.verify_token(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn other_secret_cannot_verify() {
        let token = provider().issue_token(Uuid::now_v7()).unwrap();
        let other = SimpleAuthProvider::new("different-secret", 30);
        assert!(other.verify_token(&token).is_err());
    }
}
