use anyhow::Result;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

const TOKEN_ISSUER: &str = "agora";

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Issues and verifies PASETO v4.local access tokens. Sessions and refresh
/// tokens belong to the account service; this side only needs the subject.
#[derive(Clone)]
pub struct AuthService {
    access_key: [u8; 32],
    access_ttl_minutes: u64,
}

impl AuthService {
    pub fn new(access_key: [u8; 32], access_ttl_minutes: u64) -> Self {
        Self {
            access_key,
            access_ttl_minutes,
        }
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<AccessToken> {
        let duration = std::time::Duration::from_secs(self.access_ttl_minutes * 60);
        let mut claims = Claims::new_expires_in(&duration)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&user_id.to_string())?;
        claims.add_additional("typ", "access")?;
        let expires_at =
            OffsetDateTime::now_utc() + Duration::minutes(self.access_ttl_minutes as i64);

        let key = SymmetricKey::<V4>::from(&self.access_key)?;
        let token = local::encrypt(&key, &claims, None, None)?;
        Ok(AccessToken { token, expires_at })
    }

    pub fn authenticate_access_token(&self, token: &str) -> Result<Option<AuthSession>> {
        let claims = match self.decrypt_claims(token)? {
            Some(claims) => claims,
            None => return Ok(None),
        };
        if !has_token_type(&claims, "access") {
            return Ok(None);
        }
        Ok(claim_uuid(&claims, "sub").map(|user_id| AuthSession { user_id }))
    }

    fn decrypt_claims(&self, token: &str) -> Result<Option<Claims>> {
        let key = SymmetricKey::<V4>::from(&self.access_key)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_ISSUER);

        let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        Ok(trusted.payload_claims().cloned())
    }
}

fn claim_uuid(claims: &Claims, name: &str) -> Option<Uuid> {
    claims
        .get_claim(name)
        .and_then(|value| value.as_str())
        .and_then(|value| Uuid::parse_str(value).ok())
}

fn has_token_type(claims: &Claims, expected: &str) -> bool {
    claims
        .get_claim("typ")
        .and_then(|value| value.as_str())
        .map(|value| value == expected)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_authenticates_its_subject() {
        let service = AuthService::new([7u8; 32], 15);
        let user_id = Uuid::new_v4();

        let issued = service.issue_access_token(user_id).unwrap();
        let session = service
            .authenticate_access_token(&issued.token)
            .unwrap()
            .expect("token should verify");

        assert_eq!(session.user_id, user_id);
        assert!(issued.expires_at > OffsetDateTime::now_utc());
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let issuer = AuthService::new([1u8; 32], 15);
        let verifier = AuthService::new([2u8; 32], 15);
        let issued = issuer.issue_access_token(Uuid::new_v4()).unwrap();

        assert!(verifier
            .authenticate_access_token(&issued.token)
            .unwrap()
            .is_none());
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let key_bytes = [4u8; 32];
        let service = AuthService::new(key_bytes, 15);
        let mut claims = Claims::new().unwrap();
        claims.issuer(TOKEN_ISSUER).unwrap();
        claims.audience(TOKEN_ISSUER).unwrap();
        claims.subject("alice").unwrap();
        claims.add_additional("typ", "access").unwrap();
        let key = SymmetricKey::<V4>::from(&key_bytes).unwrap();
        let token = local::encrypt(&key, &claims, None, None).unwrap();

        assert!(service.authenticate_access_token(&token).unwrap().is_none());
    }

    #[test]
    fn garbage_token_is_rejected() {
        let service = AuthService::new([3u8; 32], 15);
        assert!(service
            .authenticate_access_token("not-a-paseto")
            .unwrap()
            .is_none());
    }
}
