use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::{error, info, warn};

use crate::auth::dto::{AuthResponse, PublicUser};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo::{NewUser, UserPatch, UserStore};
use crate::error::AppError;

/// Registration, login and token verification over an injected user store.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self { users, keys }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthResponse, AppError> {
        let email = email.trim().to_lowercase();

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "registration email already taken");
            return Err(AppError::Conflict(
                "User already exists with this email".into(),
            ));
        }

        let password_hash = hash_password(password).map_err(|e| {
            error!(error = %e, "hash_password failed");
            AppError::Internal(e.to_string())
        })?;

        let user = match self
            .users
            .create(NewUser {
                email,
                password_hash,
                name: name.to_string(),
            })
            .await
        {
            Ok(user) => user,
            // A concurrent registration can still hit the unique index.
            Err(e) if is_unique_violation(&e) => {
                warn!("registration lost a race on the email index");
                return Err(AppError::Conflict(
                    "User already exists with this email".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let token = self.sign_token(user.id)?;
        info!(user_id = user.id, email = %user.email, "user registered");
        Ok(AuthResponse {
            user: user.into(),
            token,
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AppError> {
        let email = email.trim().to_lowercase();

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                warn!(email = %email, "login unknown email");
                return Err(AppError::Auth("Invalid credentials".into()));
            }
        };

        if !user.is_active {
            warn!(user_id = user.id, "login on deactivated account");
            return Err(AppError::Auth("Account is deactivated".into()));
        }

        let ok = verify_password(password, &user.password_hash).map_err(|e| {
            error!(error = %e, "verify_password failed");
            AppError::Internal(e.to_string())
        })?;
        if !ok {
            warn!(user_id = user.id, "login invalid password");
            return Err(AppError::Auth("Invalid credentials".into()));
        }

        let token = self.sign_token(user.id)?;
        info!(user_id = user.id, email = %user.email, "user logged in");
        Ok(AuthResponse {
            user: user.into(),
            token,
        })
    }

    /// Decode and validate a bearer token, returning the embedded user id.
    pub fn verify_token(&self, token: &str) -> Result<i32, AppError> {
        let claims = self.keys.verify_access(token).map_err(|_| {
            warn!("token verification failed");
            AppError::Auth("Invalid token".into())
        })?;
        Ok(claims.sub)
    }

    pub async fn current_user(&self, user_id: i32) -> Result<PublicUser, AppError> {
        match self.users.find_by_id(user_id).await? {
            Some(user) => Ok(user.into()),
            None => {
                warn!(user_id, "token subject no longer exists");
                Err(AppError::Auth("User not found".into()))
            }
        }
    }

    pub async fn update_profile(&self, user_id: i32, name: &str) -> Result<PublicUser, AppError> {
        let patch = UserPatch {
            name: Some(name.to_string()),
            ..UserPatch::default()
        };
        match self.users.update(user_id, patch).await? {
            Some(user) => {
                info!(user_id, "profile updated");
                Ok(user.into())
            }
            None => {
                warn!(user_id, "profile update for unknown user");
                Err(AppError::Auth("User not found".into()))
            }
        }
    }

    fn sign_token(&self, user_id: i32) -> Result<String, AppError> {
        self.keys.sign_access(user_id).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            AppError::Internal(e.to_string())
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// Extractor giving handlers the authenticated user id from the
/// `Authorization: Bearer` header.
pub struct AuthUser(pub i32);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthService::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Auth("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Auth("Invalid Authorization header".into()))?;

        let user_id = auth.verify_token(token)?;
        Ok(AuthUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtKeys;
    use crate::config::JwtConfig;
    use crate::testing::FakeUserStore;

    fn make_service() -> AuthService {
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "test-secret".into(),
            ttl_minutes: 5,
        });
        AuthService::new(Arc::new(FakeUserStore::new()), keys)
    }

    #[tokio::test]
    async fn register_normalizes_email_and_issues_token() {
        let auth = make_service();
        let res = auth
            .register("  A@X.com ", "password1", "A")
            .await
            .expect("register");
        assert_eq!(res.user.email, "a@x.com");
        assert_eq!(res.user.name, "A");
        let user_id = auth.verify_token(&res.token).expect("token decodes");
        assert_eq!(user_id, res.user.id);
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let auth = make_service();
        auth.register("a@x.com", "password1", "A")
            .await
            .expect("first register");
        let err = auth
            .register("a@x.com", "different-password", "B")
            .await
            .unwrap_err();
        match err {
            AppError::Conflict(msg) => assert_eq!(msg, "User already exists with this email"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_treats_case_variants_as_the_same_email() {
        let auth = make_service();
        auth.register("a@x.com", "password1", "A")
            .await
            .expect("first register");
        let err = auth.register("A@X.COM", "password1", "A").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_uses_one_message_for_bad_email_and_bad_password() {
        let auth = make_service();
        auth.register("a@x.com", "password1", "A")
            .await
            .expect("register");

        let unknown = auth.login("nobody@x.com", "password1").await.unwrap_err();
        let wrong = auth.login("a@x.com", "wrong-password").await.unwrap_err();
        match (unknown, wrong) {
            (AppError::Auth(a), AppError::Auth(b)) => {
                assert_eq!(a, b);
                assert_eq!(a, "Invalid credentials");
            }
            other => panic!("expected auth errors, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_rejects_deactivated_account() {
        let auth = make_service();
        let res = auth
            .register("a@x.com", "password1", "A")
            .await
            .expect("register");
        auth.users
            .update(
                res.user.id,
                UserPatch {
                    is_active: Some(false),
                    ..UserPatch::default()
                },
            )
            .await
            .expect("deactivate");

        let err = auth.login("a@x.com", "password1").await.unwrap_err();
        match err {
            AppError::Auth(msg) => assert_eq!(msg, "Account is deactivated"),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_roundtrip_succeeds() {
        let auth = make_service();
        auth.register("a@x.com", "password1", "A")
            .await
            .expect("register");
        let res = auth.login("a@x.com", "password1").await.expect("login");
        assert_eq!(res.user.email, "a@x.com");
        assert!(auth.verify_token(&res.token).is_ok());
    }

    #[tokio::test]
    async fn verify_token_rejects_garbage() {
        let auth = make_service();
        let err = auth.verify_token("not-a-token").unwrap_err();
        match err {
            AppError::Auth(msg) => assert_eq!(msg, "Invalid token"),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn current_user_rejects_vanished_subject() {
        let auth = make_service();
        let err = auth.current_user(999).await.unwrap_err();
        match err {
            AppError::Auth(msg) => assert_eq!(msg, "User not found"),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_profile_changes_the_name() {
        let auth = make_service();
        let res = auth
            .register("a@x.com", "password1", "A")
            .await
            .expect("register");
        let updated = auth
            .update_profile(res.user.id, "Renamed")
            .await
            .expect("update profile");
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.email, "a@x.com");
    }
}
