//! Dev token authentication.
//!
//! Tokens are `userId:email:signature` where the signature is the hex
//! HMAC-SHA256 of `userId:email` under the shared secret. The identity
//! collaborator that mints real sessions lives elsewhere; this scheme
//! only exists so the engine always receives a verified
//! [`PlayerIdentity`].

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use sabot_types::PlayerIdentity;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("jeton manquant")]
    Missing,
    #[error("jeton invalide")]
    Invalid,
}

#[derive(Clone)]
pub struct Authenticator {
    secret: Vec<u8>,
}

impl Authenticator {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign an identity into a token. Used by dev tooling and tests.
    pub fn mint(&self, identity: &PlayerIdentity) -> String {
        let claims = format!("{}:{}", identity.user_id, identity.email);
        let mac = self.sign(claims.as_bytes());
        format!("{claims}:{}", hex::encode(mac))
    }

    /// Verify a token and recover the identity it carries.
    pub fn verify(&self, token: &str) -> Result<PlayerIdentity, AuthError> {
        // The signature is colon-free hex, so splitting from the right
        // keeps any ':' inside the email with the claims.
        let (claims, signature) = token.rsplit_once(':').ok_or(AuthError::Invalid)?;
        let (user_id, email) = claims.split_once(':').ok_or(AuthError::Invalid)?;
        let user_id = user_id.parse::<u64>().map_err(|_| AuthError::Invalid)?;
        let email = email.to_string();

        let signature = hex::decode(signature).map_err(|_| AuthError::Invalid)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| AuthError::Invalid)?;
        mac.update(claims.as_bytes());
        mac.verify_slice(&signature).map_err(|_| AuthError::Invalid)?;

        Ok(PlayerIdentity { user_id, email })
    }

    fn sign(&self, claims: &[u8]) -> Vec<u8> {
        // new_from_slice only fails on unusable key sizes, which HMAC
        // does not have.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("hmac accepts any key length"),
        };
        mac.update(claims);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Pull the bearer token out of an `Authorization` header value.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> PlayerIdentity {
        PlayerIdentity {
            user_id: 42,
            email: "joueur@example.test".into(),
        }
    }

    #[test]
    fn test_mint_verify_round_trip() {
        let auth = Authenticator::new("top-secret");
        let token = auth.mint(&identity());
        assert_eq!(auth.verify(&token).unwrap(), identity());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = Authenticator::new("top-secret").mint(&identity());
        let other = Authenticator::new("other-secret");
        assert_eq!(other.verify(&token), Err(AuthError::Invalid));
    }

    #[test]
    fn test_tampered_claims_are_rejected() {
        let auth = Authenticator::new("top-secret");
        let token = auth.mint(&identity());
        let forged = token.replacen("42", "43", 1);
        assert_eq!(auth.verify(&forged), Err(AuthError::Invalid));
    }

    #[test]
    fn test_email_with_colon_round_trips() {
        let auth = Authenticator::new("top-secret");
        let odd = PlayerIdentity {
            user_id: 7,
            email: "weird:user@example.test".into(),
        };
        let token = auth.mint(&odd);
        assert_eq!(auth.verify(&token).unwrap(), odd);
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        let auth = Authenticator::new("top-secret");
        for token in ["", "abc", "1:mail", "x:mail:00", "1:mail:zz"] {
            assert_eq!(auth.verify(token), Err(AuthError::Invalid), "{token}");
        }
    }

    #[test]
    fn test_bearer_extraction() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token("Basic abc"), Err(AuthError::Missing));
        assert_eq!(bearer_token("Bearer "), Err(AuthError::Missing));
    }
}
