//! # Authentication
//!
//! [`AuthService`] stays inside the `auth` module. Other modules only see the
//! middleware record built by [`middleware`], and most of them import just its
//! `authenticate` field.
//!
//! Passwords are stored as Argon2id PHC strings. Sessions carry an HS256 JWT
//! signed with the configured `jwt_secret`, valid for [`TOKEN_TTL_SECS`].

use crate::app::{App, Request};
use crate::db::Database;
use crate::error::ShopError;
use crate::model::{Credentials, NewUser, Role, User, UserId};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use modwire::Record;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument, warn};

/// Seven days.
pub const TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: u32,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("db", &self.db.url())
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn new(db: Database, jwt_secret: impl Into<String>) -> Self {
        let secret = jwt_secret.into();
        Self {
            db,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    #[instrument(skip(self, new), fields(email = %new.email))]
    pub async fn register(&self, new: NewUser) -> Result<User, ShopError> {
        validate_registration(&new)?;
        let hash = hash_password(&new.password)?;
        let user = self
            .db
            .insert_user(&new.email, &new.first_name, &new.last_name, hash, Role::Customer)
            .await?;
        info!(user = %user.id, "User registered");
        Ok(user)
    }

    pub async fn login(&self, credentials: Credentials) -> Result<User, ShopError> {
        let stored = self
            .db
            .user_by_email(&credentials.email)
            .await
            .ok_or(ShopError::InvalidCredentials)?;
        if !verify_password(&credentials.password, &stored.password_hash) {
            debug!(email = %credentials.email, "Password mismatch");
            return Err(ShopError::InvalidCredentials);
        }
        Ok(stored.user)
    }

    pub fn generate_token(&self, user: UserId) -> Result<String, ShopError> {
        let now = unix_now();
        let claims = Claims {
            sub: user.0,
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ShopError::Config(format!("token signing failed: {e}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<UserId, ShopError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                ShopError::InvalidToken
            })?;
        Ok(UserId(data.claims.sub))
    }

    pub async fn user(&self, id: UserId) -> Option<User> {
        self.db.user(id).await
    }

    pub fn session(&self, user: User) -> Result<Session, ShopError> {
        let token = self.generate_token(user.id)?;
        Ok(Session { user, token })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Argon2id hash in PHC string form.
fn hash_password(password: &str) -> Result<String, ShopError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ShopError::Config(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "Stored password hash is unreadable");
            false
        }
    }
}

fn validate_registration(new: &NewUser) -> Result<(), ShopError> {
    if !new.email.contains('@') {
        return Err(ShopError::BadRequest("email is invalid".to_string()));
    }
    if new.password.len() < 6 {
        return Err(ShopError::BadRequest(
            "password must have at least 6 characters".to_string(),
        ));
    }
    if new.first_name.trim().is_empty() || new.last_name.trim().is_empty() {
        return Err(ShopError::BadRequest("name is required".to_string()));
    }
    Ok(())
}

/// Resolves the caller of a request from its bearer token.
#[derive(Debug, Clone)]
pub struct Authenticate {
    auth: Arc<AuthService>,
}

impl Authenticate {
    pub async fn user(&self, request: &Request) -> Result<User, ShopError> {
        let token = request
            .header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ShopError::Unauthenticated)?;
        let id = self.auth.verify_token(token)?;
        self.auth.user(id).await.ok_or(ShopError::InvalidToken)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl RequireAdmin {
    pub fn check(&self, user: &User) -> Result<(), ShopError> {
        match user.role {
            Role::Admin => Ok(()),
            Role::Customer => Err(ShopError::Forbidden),
        }
    }
}

/// The exported `auth_middleware` record: `{ authenticate, require_admin }`.
pub fn middleware(auth: Arc<AuthService>) -> Record {
    Record::new()
        .with("authenticate", Authenticate { auth })
        .with("require_admin", RequireAdmin)
}

pub fn routes(app: &App, auth: Arc<AuthService>, authenticate: Authenticate) {
    let service = Arc::clone(&auth);
    app.post("/auth/register", move |req| register(Arc::clone(&service), req));
    let service = Arc::clone(&auth);
    app.post("/auth/login", move |req| login(Arc::clone(&service), req));
    app.get("/auth/me", move |req| me(authenticate.clone(), req));
}

async fn register(auth: Arc<AuthService>, req: Request) -> Result<Session, ShopError> {
    let user = auth.register(req.json()?).await?;
    auth.session(user)
}

async fn login(auth: Arc<AuthService>, req: Request) -> Result<Session, ShopError> {
    let user = auth.login(req.json()?).await?;
    auth.session(user)
}

async fn me(authenticate: Authenticate, req: Request) -> Result<User, ShopError> {
    authenticate.user(&req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(Database::connect("memory://auth").unwrap(), "secret")
    }

    fn alice() -> NewUser {
        NewUser {
            email: "alice@example.com".into(),
            password: "hunter22".into(),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
        }
    }

    #[test]
    fn test_tokens_are_bound_to_secret() {
        let auth = service();
        let token = auth.generate_token(UserId(4)).unwrap();
        assert_eq!(auth.verify_token(&token).unwrap(), UserId(4));

        let other = AuthService::new(Database::connect("memory://x").unwrap(), "other");
        assert!(matches!(other.verify_token(&token), Err(ShopError::InvalidToken)));
        assert!(auth.verify_token("4").is_err());
        assert!(auth.verify_token("5.zz").is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let auth = service();
        let now = unix_now();
        let stale = Claims {
            sub: 4,
            iat: now - 2 * TOKEN_TTL_SECS,
            exp: now - TOKEN_TTL_SECS,
        };
        let token = encode(&Header::new(Algorithm::HS256), &stale, &auth.encoding).unwrap();
        assert!(matches!(auth.verify_token(&token), Err(ShopError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_passwords_are_stored_as_argon2() {
        let auth = service();
        auth.register(alice()).await.unwrap();
        let stored = auth.db.user_by_email("alice@example.com").await.unwrap();
        assert!(stored.password_hash.starts_with("$argon2id$"));
        assert!(!stored.password_hash.contains("hunter22"));
        assert!(verify_password("hunter22", &stored.password_hash));
        assert!(!verify_password("hunter23", &stored.password_hash));
        assert!(!verify_password("hunter22", "not a phc string"));
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let auth = service();
        let user = auth.register(alice()).await.unwrap();
        assert_eq!(user.role, Role::Customer);

        let logged_in = auth
            .login(Credentials {
                email: "alice@example.com".into(),
                password: "hunter22".into(),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let wrong = auth
            .login(Credentials {
                email: "alice@example.com".into(),
                password: "nope".into(),
            })
            .await;
        assert!(matches!(wrong, Err(ShopError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_authenticate_reads_bearer_header() {
        let auth = Arc::new(service());
        let user = auth.register(alice()).await.unwrap();
        let record = middleware(Arc::clone(&auth));
        let authenticate = record.get::<Authenticate>("authenticate").unwrap();

        let request = Request::get("/cart").with_bearer(&auth.generate_token(user.id).unwrap());
        assert_eq!(authenticate.user(&request).await.unwrap(), user);
        assert!(matches!(
            authenticate.user(&Request::get("/cart")).await,
            Err(ShopError::Unauthenticated)
        ));

        let admin = record.get::<RequireAdmin>("require_admin").unwrap();
        assert!(matches!(admin.check(&user), Err(ShopError::Forbidden)));
    }
}
