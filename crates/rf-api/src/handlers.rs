//! # rf-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the domain
//! services. Wire DTOs live here; the services speak domain types only.

use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt;
use rf_core::error::AppError;
use rf_core::models::{Order, PostFilter, Role, User, VoteType};
use rf_core::traits::AuthProvider;
use rf_services::{PostService, UserService};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Uploads are cut off while streaming, well before the store's own check.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// State shared across all workers.
pub struct AppState {
    pub posts: PostService,
    pub users: UserService,
    pub auth: Arc<dyn AuthProvider>,
}

// ── Wire DTOs ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub title: Option<String>,
    pub body: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub body: String,
}

#[derive(Deserialize)]
pub struct ListPostsQuery {
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub title: Option<String>,
    pub parent_id: Option<Uuid>,
    pub order_by: Option<String>,
    pub user_vote: Option<String>,
    pub show_comments: Option<bool>,
}

#[derive(Deserialize)]
pub struct VoteQuery {
    pub vote_type: String,
}

#[derive(Serialize)]
pub struct ImageResponse {
    pub id: Uuid,
    pub url: String,
}

// ── Identity helpers ────────────────────────────────────────────────────────

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// The authenticated requester, or 401.
fn require_user(state: &AppState, req: &HttpRequest) -> Result<Uuid, ApiError> {
    let token = bearer_token(req)
        .ok_or_else(|| ApiError(AppError::Unauthorized("missing bearer token".to_string())))?;
    state.auth.verify_token(token).map_err(ApiError)
}

/// Reads allow anonymous access; a valid token upgrades them to a viewer.
fn optional_viewer(state: &AppState, req: &HttpRequest) -> Option<Uuid> {
    bearer_token(req).and_then(|token| state.auth.verify_token(token).ok())
}

/// Drains the multipart stream for the `image` field, enforcing the size
/// cap while streaming.
async fn read_image_field(mut payload: Multipart) -> Result<(Vec<u8>, String), ApiError> {
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError(AppError::InvalidArgument(format!("bad multipart body: {e}"))))?
    {
        if field.name() != "image" {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_default();

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            ApiError(AppError::InvalidArgument(format!("bad multipart body: {e}")))
        })? {
            if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(ApiError(AppError::InvalidArgument(
                    "image exceeds the upload size limit".to_string(),
                )));
            }
            data.extend_from_slice(&chunk);
        }
        return Ok((data, content_type));
    }
    Err(ApiError(AppError::InvalidArgument(
        "missing image field".to_string(),
    )))
}

// ── Auth ────────────────────────────────────────────────────────────────────

pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let (token, _user) = state.users.login(&body.email, &body.password).await?;
    Ok(HttpResponse::Ok().json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
    }))
}

// ── Users ───────────────────────────────────────────────────────────────────

pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = state
        .users
        .register(&body.name, &body.email, &body.password)
        .await?;
    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

pub async fn current_user(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user(&state, &req)?;
    let user = state.users.get_user(user_id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

pub async fn read_user(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let user = state.users.get_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

pub async fn update_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user(&state, &req)?;
    state.users.update_user(user_id, &body.name, &body.email).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn update_password(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UpdatePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user(&state, &req)?;
    state
        .users
        .update_password(user_id, &body.old_password, &body.new_password)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn upload_profile_image(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user(&state, &req)?;
    let (data, content_type) = read_image_field(payload).await?;
    let url = state
        .users
        .set_profile_image(user_id, data, &content_type)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "url": url })))
}

pub async fn read_profile_image(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let image = state.users.profile_image(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "url": image.url })))
}

pub async fn delete_profile_image(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user(&state, &req)?;
    state.users.delete_profile_image(user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ── Posts ───────────────────────────────────────────────────────────────────

pub async fn create_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let author = require_user(&state, &req)?;
    let body = body.into_inner();
    let view = state
        .posts
        .create_post(author, body.title, body.body, body.parent_id)
        .await?;
    Ok(HttpResponse::Created().json(view))
}

pub async fn read_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let viewer = optional_viewer(&state, &req);
    let view = state.posts.get_post(path.into_inner(), viewer).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn list_posts(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<ListPostsQuery>,
) -> Result<HttpResponse, ApiError> {
    let viewer = optional_viewer(&state, &req);
    let order: Order = query
        .order_by
        .as_deref()
        .unwrap_or("date")
        .parse()
        .map_err(ApiError)?;

    // Restricting to "posts I voted X on" only makes sense for a known
    // viewer.
    let voted_by = match &query.user_vote {
        Some(raw) => {
            let vote_type: VoteType = raw.parse().map_err(ApiError)?;
            let viewer = viewer.ok_or_else(|| {
                ApiError(AppError::Unauthorized(
                    "the vote filter requires authentication".to_string(),
                ))
            })?;
            Some((viewer, vote_type))
        }
        None => None,
    };

    let filter = PostFilter {
        author_id: query.user_id,
        author_name: query.username.clone(),
        title: query.title.clone(),
        parent_id: query.parent_id,
        voted_by,
        show_comments: query.show_comments.unwrap_or(false),
    };
    let views = state.posts.list_posts(&filter, order, viewer).await?;
    Ok(HttpResponse::Ok().json(views))
}

pub async fn update_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let requester = require_user(&state, &req)?;
    let body = body.into_inner();
    state
        .posts
        .update_post(path.into_inner(), requester, body.title, body.body)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn delete_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let requester = require_user(&state, &req)?;
    state.posts.delete_post(path.into_inner(), requester).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn vote(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
    query: web::Query<VoteQuery>,
) -> Result<HttpResponse, ApiError> {
    let voter = require_user(&state, &req)?;
    let vote_type: VoteType = query.vote_type.parse().map_err(ApiError)?;
    let outcome = state
        .posts
        .cast_vote(path.into_inner(), voter, vote_type)
        .await?;
    Ok(HttpResponse::Created().json(outcome))
}

pub async fn upload_post_image(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let requester = require_user(&state, &req)?;
    let (data, content_type) = read_image_field(payload).await?;
    let image = state
        .posts
        .add_post_image(path.into_inner(), requester, data, &content_type)
        .await?;
    Ok(HttpResponse::Ok().json(ImageResponse {
        id: image.id,
        url: image.url,
    }))
}

pub async fn read_post_images(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let images = state.posts.post_images(path.into_inner()).await?;
    let body: Vec<ImageResponse> = images
        .into_iter()
        .map(|image| ImageResponse {
            id: image.id,
            url: image.url,
        })
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

pub async fn delete_post_image(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, ApiError> {
    let requester = require_user(&state, &req)?;
    let (post_id, image_id) = path.into_inner();
    state
        .posts
        .delete_post_image(post_id, requester, image_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use rf_auth_simple::SimpleAuthProvider;
    use rf_db_sqlite::SqliteForumRepo;
    use rf_storage_local::LocalImageStore;

    async fn state() -> web::Data<AppState> {
        let repo = Arc::new(SqliteForumRepo::new("sqlite::memory:").await.unwrap());
        let store = Arc::new(LocalImageStore::new(
            std::env::temp_dir().join(format!("rf-api-{}", Uuid::now_v7())),
            "/static/post_images".to_string(),
        ));
        let auth = Arc::new(SimpleAuthProvider::new("test-secret", 30));
        web::Data::new(AppState {
            posts: PostService::new(repo.clone(), store.clone()),
            users: UserService::new(repo, store, auth.clone()),
            auth,
        })
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .configure(crate::configure_routes),
            )
            .await
        };
    }

    macro_rules! register_and_login {
        ($app:expr, $name:expr) => {{
            let email = format!("{}@example.com", $name);
            let req = test::TestRequest::post()
                .uri("/user/")
                .set_json(serde_json::json!({
                    "name": $name, "email": email, "password": "secret1"
                }))
                .to_request();
            let resp = test::call_service(&$app, req).await;
            assert_eq!(resp.status().as_u16(), 201);

            let req = test::TestRequest::post()
                .uri("/auth/token")
                .set_json(serde_json::json!({ "email": email, "password": "secret1" }))
                .to_request();
            let body: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
            body["access_token"].as_str().unwrap().to_string()
        }};
    }

    fn auth_header(token: &str) -> (header::HeaderName, String) {
        (header::AUTHORIZATION, format!("Bearer {token}"))
    }

    #[actix_web::test]
    async fn post_and_comment_flow() {
        let state = state().await;
        let app = app!(state);
        let alice = register_and_login!(app, "alice");
        let bob = register_and_login!(app, "bob");

        // Alice opens a post; it starts with her own upvote.
        let req = test::TestRequest::post()
            .uri("/post/")
            .insert_header(auth_header(&alice))
            .set_json(serde_json::json!({ "title": "hello", "body": "hello world" }))
            .to_request();
        let post: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(post["upvote_count"], 1);
        assert_eq!(post["comment_count"], 0);
        assert_eq!(post["current_user_vote"], "up");
        let post_id = post["id"].as_str().unwrap().to_string();

        // Bob comments.
        let req = test::TestRequest::post()
            .uri("/post/")
            .insert_header(auth_header(&bob))
            .set_json(serde_json::json!({ "body": "hi!", "parent_id": post_id }))
            .to_request();
        let comment: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(comment["parent_id"], post_id.as_str());

        // The tree comes back nested, with Bob's own view projected.
        let req = test::TestRequest::get()
            .uri(&format!("/post/{post_id}"))
            .insert_header(auth_header(&bob))
            .to_request();
        let tree: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(tree["comment_count"], 1);
        assert_eq!(tree["comments"][0]["body"], "hi!");
        assert_eq!(tree["comments"][0]["current_user_vote"], "up");
        assert_eq!(tree["current_user_vote"], serde_json::Value::Null);
    }

    #[actix_web::test]
    async fn vote_toggles_and_switches() {
        let state = state().await;
        let app = app!(state);
        let alice = register_and_login!(app, "alice");
        let bob = register_and_login!(app, "bob");

        let req = test::TestRequest::post()
            .uri("/post/")
            .insert_header(auth_header(&alice))
            .set_json(serde_json::json!({ "body": "vote on me" }))
            .to_request();
        let post: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let post_id = post["id"].as_str().unwrap().to_string();

        let vote_uri = format!("/post/{post_id}/vote/?vote_type=down");
        let req = test::TestRequest::post()
            .uri(&vote_uri)
            .insert_header(auth_header(&bob))
            .to_request();
        let outcome: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(outcome["action"], "added");
        assert_eq!(outcome["downvote_count"], 1);

        // Same vote again: removed, back to baseline.
        let req = test::TestRequest::post()
            .uri(&vote_uri)
            .insert_header(auth_header(&bob))
            .to_request();
        let outcome: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(outcome["action"], "removed");
        assert_eq!(outcome["downvote_count"], 0);
        assert_eq!(outcome["current_user_vote"], serde_json::Value::Null);

        // Unknown vote type fails fast.
        let req = test::TestRequest::post()
            .uri(&format!("/post/{post_id}/vote/?vote_type=sideways"))
            .insert_header(auth_header(&bob))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[actix_web::test]
    async fn foreign_update_is_forbidden_and_anonymous_create_is_unauthorized() {
        let state = state().await;
        let app = app!(state);
        let alice = register_and_login!(app, "alice");
        let mallory = register_and_login!(app, "mallory");

        let req = test::TestRequest::post()
            .uri("/post/")
            .insert_header(auth_header(&alice))
            .set_json(serde_json::json!({ "body": "mine" }))
            .to_request();
        let post: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let post_id = post["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::put()
            .uri(&format!("/post/{post_id}"))
            .insert_header(auth_header(&mallory))
            .set_json(serde_json::json!({ "body": "defaced" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 403);

        let req = test::TestRequest::post()
            .uri("/post/")
            .set_json(serde_json::json!({ "body": "anonymous" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 401);
    }

    #[actix_web::test]
    async fn list_rejects_unknown_order_mode() {
        let state = state().await;
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/post/?order_by=karma")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[actix_web::test]
    async fn duplicate_registration_conflicts() {
        let state = state().await;
        let app = app!(state);
        let _alice = register_and_login!(app, "alice");

        let req = test::TestRequest::post()
            .uri("/user/")
            .set_json(serde_json::json!({
                "name": "alice2", "email": "alice@example.com", "password": "secret1"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 409);
    }
}
