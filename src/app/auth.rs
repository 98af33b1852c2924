use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use sha2::{Digest, Sha256};
use sqlx::Row;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::users::UserService;
use crate::domain::user::User;
use crate::infra::db::Db;

const TOKEN_ISSUER: &str = "yatube";
const TOKEN_TYPE: &str = "session";

/// Identity resolved from a valid session token.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: i64,
    pub username: String,
    pub session_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    session_key: [u8; 32],
    session_ttl_hours: u64,
}

impl AuthService {
    pub fn new(db: Db, session_key: [u8; 32], session_ttl_hours: u64) -> Self {
        Self {
            db,
            session_key,
            session_ttl_hours,
        }
    }

    /// Creates a user. Without a password the account cannot log in until one
    /// is set, which is how fixture and imported users are created.
    pub async fn create_user(
        &self,
        username: &str,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<User> {
        let password_hash = match password {
            Some(password) => hash_password(password)?,
            None => String::new(),
        };

        let user_id = sqlx::query(
            "INSERT INTO users (username, email, password_hash, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(OffsetDateTime::now_utc())
        .execute(self.db.pool())
        .await?
        .last_insert_rowid();

        UserService::new(self.db.clone())
            .get_user(user_id)
            .await?
            .ok_or_else(|| anyhow!("user {} vanished after insert", user_id))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Option<IssuedSession>> {
        let row = sqlx::query("SELECT id, password_hash FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let user_id: i64 = row.try_get("id")?;
        let password_hash: String = row.try_get("password_hash")?;
        if password_hash.is_empty() {
            return Ok(None);
        }

        if !verify_password(password, &password_hash)? {
            return Ok(None);
        }

        let session = self.start_session(user_id).await?;
        Ok(Some(session))
    }

    pub async fn start_session(&self, user_id: i64) -> Result<IssuedSession> {
        let session_id = Uuid::new_v4();
        let (claims, expires_at) = self.build_session_claims(user_id, session_id)?;
        let key = SymmetricKey::<V4>::from(&self.session_key)?;
        let token = local::encrypt(&key, &claims, None, None)?;

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id.to_string())
        .bind(user_id)
        .bind(hash_token(&token))
        .bind(expires_at)
        .execute(self.db.pool())
        .await?;

        tracing::debug!(user_id, session_id = %session_id, "session started");

        Ok(IssuedSession { token, expires_at })
    }

    pub async fn authenticate(&self, token: &str) -> Result<Option<AuthSession>> {
        let claims = match self.decrypt_claims(token)? {
            Some(claims) => claims,
            None => return Ok(None),
        };
        if !has_token_type(&claims) {
            return Ok(None);
        }
        let user_id = claim_user_id(&claims)?;
        let session_id = claim_session_id(&claims)?;

        let row = sqlx::query(
            "SELECT s.expires_at, u.username \
             FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.id = ?1 AND s.user_id = ?2 AND s.token_hash = ?3 AND s.revoked_at IS NULL",
        )
        .bind(session_id.to_string())
        .bind(user_id)
        .bind(hash_token(token))
        .fetch_optional(self.db.pool())
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let expires_at: OffsetDateTime = row.try_get("expires_at")?;
        if expires_at <= OffsetDateTime::now_utc() {
            return Ok(None);
        }

        Ok(Some(AuthSession {
            user_id,
            username: row.try_get("username")?,
            session_id,
        }))
    }

    pub async fn logout(&self, token: &str) -> Result<bool> {
        let session = match self.authenticate(token).await? {
            Some(session) => session,
            None => return Ok(false),
        };

        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = ?2 WHERE id = ?1 AND revoked_at IS NULL",
        )
        .bind(session.session_id.to_string())
        .bind(OffsetDateTime::now_utc())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    fn decrypt_claims(&self, token: &str) -> Result<Option<Claims>> {
        let key = SymmetricKey::<V4>::from(&self.session_key)?;
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

    fn build_session_claims(
        &self,
        user_id: i64,
        session_id: Uuid,
    ) -> Result<(Claims, OffsetDateTime)> {
        let duration = std::time::Duration::from_secs(self.session_ttl_hours * 60 * 60);
        let mut claims = Claims::new_expires_in(&duration)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&user_id.to_string())?;
        claims.token_identifier(&session_id.to_string())?;
        claims.add_additional("typ", TOKEN_TYPE)?;
        let expires_at =
            OffsetDateTime::now_utc() + Duration::hours(self.session_ttl_hours as i64);
        Ok((claims, expires_at))
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {}", err))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("failed to parse password hash: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn claim_str<'a>(claims: &'a Claims, name: &str) -> Result<&'a str> {
    claims
        .get_claim(name)
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("missing {} claim", name))
}

fn claim_user_id(claims: &Claims) -> Result<i64> {
    Ok(claim_str(claims, "sub")?.parse()?)
}

fn claim_session_id(claims: &Claims) -> Result<Uuid> {
    Ok(Uuid::parse_str(claim_str(claims, "jti")?)?)
}

fn has_token_type(claims: &Claims) -> bool {
    claims
        .get_claim("typ")
        .and_then(|value| value.as_str())
        .map(|value| value == TOKEN_TYPE)
        .unwrap_or(false)
}
