//! Stream Access Gate (C10, spec.md §4.10). Mints and verifies opaque,
//! short-lived tokens binding a normalized referring domain, so a CDN
//! edge can reject cross-domain replay without a database round trip.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use backplane_core::domain::whitelist::normalize_domain;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
}

pub type TokenResult<T> = std::result::Result<T, TokenError>;

#[derive(Debug, Clone, Copy)]
pub struct AccessTokenConfig {
    pub ttl_secs: i64,
    pub cookie_domain: Option<&'static str>,
}

impl Default for AccessTokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 4 * 3600,
            cookie_domain: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub domain: String,
    pub expires_at: i64,
}

/// Cookie attributes to hand back alongside a minted token (spec.md
/// §4.10: "domain scope from configuration, max-age aligned with token
/// lifetime").
#[derive(Debug, Clone)]
pub struct CookieAttrs {
    pub domain: Option<String>,
    pub max_age_secs: i64,
}

pub struct StreamAccessGate {
    key: Hmac<Sha256>,
    config: AccessTokenConfig,
}

impl StreamAccessGate {
    pub fn new(secret: &[u8], config: AccessTokenConfig) -> Self {
        Self {
            key: HmacSha256::new_from_slice(secret).expect("hmac accepts any key length"),
            config,
        }
    }

    /// Mint a token binding `domain` (normalized first) with an expiry
    /// `ttl_secs` in the future, plus the cookie attributes to send it
    /// with.
    pub fn mint(&self, domain: &str, now_unix: i64) -> (String, CookieAttrs) {
        let domain = normalize_domain(domain);
        let expires_at = now_unix + self.config.ttl_secs;
        let payload = format!("{domain}|{expires_at}");
        let mut mac = self.key.clone();
        mac.update(payload.as_bytes());
        let sig = mac.finalize().into_bytes();
        let token = format!(
            "{}.{}",
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            hex::encode(sig)
        );
        (
            token,
            CookieAttrs {
                domain: self.config.cookie_domain.map(|d| d.to_string()),
                max_age_secs: self.config.ttl_secs,
            },
        )
    }

    /// Verify `token` against `now_unix`, returning the bound domain iff
    /// the signature matches and the token has not expired.
    pub fn verify(&self, token: &str, now_unix: i64) -> TokenResult<VerifiedToken> {
        let (encoded_payload, sig_hex) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded_payload)
            .map_err(|_| TokenError::Malformed)?;
        let payload = String::from_utf8(payload_bytes).map_err(|_| TokenError::Malformed)?;
        let (domain, expires_at) = payload.split_once('|').ok_or(TokenError::Malformed)?;
        let expires_at: i64 = expires_at.parse().map_err(|_| TokenError::Malformed)?;

        let mut mac = self.key.clone();
        mac.update(payload.as_bytes());
        let expected = mac.finalize().into_bytes();
        let given = hex::decode(sig_hex).map_err(|_| TokenError::Malformed)?;
        if given.len() != expected.len() || !constant_time_eq(&given, &expected) {
            return Err(TokenError::BadSignature);
        }

        if now_unix >= expires_at {
            return Err(TokenError::Expired);
        }

        Ok(VerifiedToken {
            domain: domain.to_string(),
            expires_at,
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_verify_same_domain_within_ttl() {
        let gate = StreamAccessGate::new(b"top-secret", AccessTokenConfig::default());
        let (token, cookie) = gate.mint("https://sub.game1.com/embed", 1_000);
        let verified = gate.verify(&token, 1_000 + 3600).unwrap();
        assert_eq!(verified.domain, "sub.game1.com");
        assert_eq!(cookie.max_age_secs, 4 * 3600);
    }

    #[test]
    fn verify_rejects_after_expiry() {
        let gate = StreamAccessGate::new(b"top-secret", AccessTokenConfig::default());
        let (token, _) = gate.mint("sub.game1.com", 1_000);
        let err = gate.verify(&token, 1_000 + 4 * 3600 + 1).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let gate = StreamAccessGate::new(b"top-secret", AccessTokenConfig::default());
        let (mut token, _) = gate.mint("sub.game1.com", 1_000);
        token.push('0');
        let err = gate.verify(&token, 1_000).unwrap_err();
        assert!(matches!(err, TokenError::BadSignature | TokenError::Malformed));
    }

    #[test]
    fn different_secrets_do_not_cross_verify() {
        let gate_a = StreamAccessGate::new(b"secret-a", AccessTokenConfig::default());
        let gate_b = StreamAccessGate::new(b"secret-b", AccessTokenConfig::default());
        let (token, _) = gate_a.mint("sub.game1.com", 1_000);
        let err = gate_b.verify(&token, 1_000).unwrap_err();
        assert!(matches!(err, TokenError::BadSignature));
    }
}
