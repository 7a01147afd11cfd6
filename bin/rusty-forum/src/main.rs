//! # Rusty-Forum Binary
//!
//! The entry point that assembles the application based on compile-time
//! features.

use std::sync::Arc;

use actix_files::Files;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use rf_api::handlers::AppState;
use rf_services::{PostService, UserService};

// Feature-gated imports: the binary is compiled to order
#[cfg(feature = "db-sqlite")]
use rf_db_sqlite::SqliteForumRepo;

#[cfg(feature = "storage-local")]
use rf_storage_local::LocalImageStore;

#[cfg(feature = "auth-simple")]
use rf_auth_simple::SimpleAuthProvider;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let database_url = env_or("DATABASE_URL", "sqlite:rusty_forum.db");
    let bind_addr = env_or("BIND_ADDR", "127.0.0.1:8080");
    let upload_dir = env_or("UPLOAD_DIR", "./data/post_images");
    let upload_prefix = env_or("UPLOAD_URL_PREFIX", "/static/post_images");
    let token_ttl: i64 = env_or("TOKEN_TTL_MINUTES", "30")
        .parse()
        .context("TOKEN_TTL_MINUTES must be a number of minutes")?;
    let session_secret = match std::env::var("SESSION_SECRET") {
        Ok(secret) => secret,
        Err(_) => {
            // Tokens become invalid on restart without a configured secret.
            log::warn!("SESSION_SECRET not set, using an ephemeral development secret");
            uuid::Uuid::now_v7().to_string()
        }
    };

    // 1. Initialize database implementation
    #[cfg(feature = "db-sqlite")]
    let repo = Arc::new(
        SqliteForumRepo::new(&database_url)
            .await
            .context("failed to init SQLite")?,
    );

    // 2. Initialize storage implementation
    #[cfg(feature = "storage-local")]
    let store = Arc::new(LocalImageStore::new(
        upload_dir.clone().into(),
        upload_prefix.clone(),
    ));
    std::fs::create_dir_all(&upload_dir).context("failed to create the upload directory")?;

    // 3. Initialize auth implementation
    #[cfg(feature = "auth-simple")]
    let auth = Arc::new(SimpleAuthProvider::new(&session_secret, token_ttl));

    // 4. Wrap in AppState (dynamic dispatch keeps the services plugin-agnostic)
    let state = web::Data::new(AppState {
        posts: PostService::new(repo.clone(), store.clone()),
        users: UserService::new(repo, store, auth.clone()),
        auth,
    });

    log::info!("rusty-forum listening on http://{bind_addr}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(rf_api::middleware::cors_policy())
            .wrap(rf_api::middleware::standard_middleware())
            .configure(rf_api::configure_routes)
            // The uploaded images are plain static files.
            .service(Files::new(&upload_prefix, &upload_dir))
    })
    .bind(&bind_addr)?
    .run()
    .await?;
    Ok(())
}
