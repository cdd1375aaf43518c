use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{auth::claims::Claims, auth::repo_types::Role, config::JwtConfig, state::AppState};

/// Why a session token was rejected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
}

/// Classifies failures of a token that already has the `header.payload.signature` shape.
/// Anything that breaks the header or body of such a token is tampering.
impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::Malformed,
            _ => Self::InvalidSignature,
        }
    }
}

fn is_compact_jws(token: &str) -> bool {
    let mut parts = 0;
    for part in token.split('.') {
        if part.is_empty() {
            return false;
        }
        parts += 1;
    }
    parts == 3
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::seconds(cfg.ttl_minutes.saturating_mul(60)),
        }
    }

    /// Signs a token with the configured session TTL.
    pub fn sign(&self, subject: &str, role: &Role) -> anyhow::Result<String> {
        self.issue(subject, role, self.ttl)
    }

    pub fn issue(&self, subject: &str, role: &Role, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now
            .checked_add(ttl)
            .ok_or_else(|| anyhow::anyhow!("token expiry out of range (ttl {ttl})"))?;
        let claims = Claims {
            sub: subject.to_string(),
            role: role.clone(),
            iat: now.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(subject = %subject, role = %role, "jwt signed");
        Ok(token)
    }

    /// Never panics on untrusted input; every failure maps to a [`TokenError`].
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        if !is_compact_jws(token) {
            debug!("jwt rejected: not three segments");
            return Err(TokenError::Malformed);
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            TokenError::from(e)
        })?;
        debug!(subject = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 60 * 24,
        })
    }

    fn farmer() -> Role {
        Role::new("farmer")
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.sign("+260961234567", &farmer()).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, "+260961234567");
        assert_eq!(claims.role, farmer());
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys
            .issue("+260961234567", &farmer(), Duration::seconds(-5))
            .expect("sign");
        assert_eq!(keys.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn altered_signature_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.sign("+260961234567", &farmer()).expect("sign");
        let sig_start = token.rfind('.').unwrap() + 1;
        let mut bytes = token.into_bytes();
        bytes[sig_start + 4] = if bytes[sig_start + 4] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert_eq!(keys.verify(&tampered), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn any_altered_byte_is_an_invalid_signature() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.sign("+260961234567", &farmer()).expect("sign");
        for (i, b) in token.bytes().enumerate() {
            if b == b'.' {
                continue;
            }
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if b == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                keys.verify(&tampered),
                Err(TokenError::InvalidSignature),
                "byte {i} of {token}"
            );
        }
    }

    #[test]
    fn swapped_payload_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let victim = keys.sign("+260961234567", &farmer()).unwrap();
        let attacker = keys.sign("+260970000000", &Role::new("admin")).unwrap();

        let v: Vec<&str> = victim.split('.').collect();
        let a: Vec<&str> = attacker.split('.').collect();
        let forged = format!("{}.{}.{}", v[0], a[1], v[2]);
        assert_eq!(keys.verify(&forged), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let ours = make_keys("our-secret", "iss", "aud");
        let theirs = make_keys("their-secret", "iss", "aud");
        let token = theirs.sign("+260961234567", &farmer()).unwrap();
        assert_eq!(ours.verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert_eq!(keys.verify(""), Err(TokenError::Malformed));
        assert_eq!(keys.verify("not-a-jwt"), Err(TokenError::Malformed));
        assert_eq!(keys.verify("a..c"), Err(TokenError::Malformed));
        assert_eq!(keys.verify("a.b.c.d"), Err(TokenError::Malformed));
        assert_eq!(keys.verify(".b.c"), Err(TokenError::Malformed));
    }

    #[test]
    fn undecodable_segments_count_as_tampering() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert_eq!(keys.verify("a.b.c"), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn oversized_ttl_is_an_error_not_a_panic() {
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "dev-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 1_000_000_000_000,
        });
        assert!(keys.sign("+260961234567", &farmer()).is_err());
        assert!(keys
            .issue("+260961234567", &farmer(), Duration::MAX)
            .is_err());
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let good = make_keys("same-secret", "iss", "good-aud");
        let bad = make_keys("same-secret", "iss", "bad-aud");
        let token = good.sign("+260961234567", &farmer()).unwrap();
        assert!(bad.verify(&token).is_err());
    }
}
