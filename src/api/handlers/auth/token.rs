//! Signed bearer tokens: login sessions and pending-2FA tickets.
//!
//! Both ride the same HS256 keys but carry distinct `purpose` claims, so a
//! ticket can never be replayed as a session or vice versa. Tokens are not
//! stored server-side; validity is the signature plus the expiry claim, and
//! session callers re-check the account before trusting the claims.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const PURPOSE_SESSION: &str = "session";
const PURPOSE_TWO_FACTOR: &str = "two_factor";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

/// Claims carried by every token this service mints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: String,
    pub email: String,
    pub purpose: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Parse the subject back into an account id.
    ///
    /// # Errors
    /// Returns [`TokenError::Invalid`] if the subject is not a UUID.
    pub fn account_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Invalid)
    }
}

/// HS256 keys used to mint and verify tokens.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl SessionKeys {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 60;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Mint a login session token.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn mint_session(
        &self,
        user_id: Uuid,
        email: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String> {
        self.mint(user_id, email, PURPOSE_SESSION, ttl, now)
    }

    /// Mint a short-lived ticket that carries a pending 2FA login.
    ///
    /// The ticket never contains the code; the account's stored state stays
    /// authoritative for code verification.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn mint_two_factor_ticket(
        &self,
        user_id: Uuid,
        email: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String> {
        self.mint(user_id, email, PURPOSE_TWO_FACTOR, ttl, now)
    }

    fn mint(
        &self,
        user_id: Uuid,
        email: &str,
        purpose: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            purpose: purpose.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("failed to sign token")
    }

    /// Verify a login session token.
    ///
    /// # Errors
    /// [`TokenError::Expired`] past the expiry claim, [`TokenError::Invalid`]
    /// for signature, format, or purpose mismatches.
    pub fn verify_session(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, PURPOSE_SESSION)
    }

    /// Verify a pending-2FA ticket.
    ///
    /// # Errors
    /// Same split as [`Self::verify_session`].
    pub fn verify_two_factor_ticket(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, PURPOSE_TWO_FACTOR)
    }

    fn verify(&self, token: &str, purpose: &str) -> Result<Claims, TokenError> {
        let data =
            decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
                match err.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::Invalid,
                }
            })?;

        if data.claims.purpose != purpose {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }
}
