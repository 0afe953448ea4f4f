use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::jwt::JwtKeys;
use crate::auth::repo::{UserRepository, UserStore};
use crate::auth::services::AuthService;
use crate::config::AppConfig;
use crate::posts::repo::{PostRepository, PostStore};
use crate::posts::services::PostService;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
    pub posts: PostService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        Ok(Self::from_parts(db, config))
    }

    /// Wires the services against live Postgres repositories.
    pub fn from_parts(db: PgPool, config: Arc<AppConfig>) -> Self {
        let users = Arc::new(UserRepository::new(db.clone()));
        let posts = Arc::new(PostRepository::new(db.clone()));
        Self::with_stores(db, config, users, posts)
    }

    /// Wires the services against caller-supplied stores.
    pub fn with_stores(
        db: PgPool,
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        posts: Arc<dyn PostStore>,
    ) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        Self {
            db,
            auth: AuthService::new(users, keys),
            posts: PostService::new(posts),
            config,
        }
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
