//! # rf-api
//!
//! The web routing and orchestration layer for Rusty-Forum.

pub mod error;
pub mod handlers;
pub mod middleware;

pub use handlers::AppState;

use actix_web::web;

/// Configures the routes for the forum API.
///
/// Scoped configuration lets the main binary mount everything under a
/// different prefix if needed (e.g., /api/v1/).
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/auth").route("/token", web::post().to(handlers::login)))
        .service(
            web::scope("/user")
                .route("/", web::post().to(handlers::register))
                .route("/", web::get().to(handlers::current_user))
                .route("/", web::put().to(handlers::update_user))
                .route("/password", web::put().to(handlers::update_password))
                .route("/profile", web::post().to(handlers::upload_profile_image))
                .route("/profile", web::delete().to(handlers::delete_profile_image))
                .route("/{user_id}", web::get().to(handlers::read_user))
                .route("/{user_id}/profile", web::get().to(handlers::read_profile_image)),
        )
        .service(
            web::scope("/post")
                .route("/", web::post().to(handlers::create_post))
                .route("/", web::get().to(handlers::list_posts))
                .route("/{post_id}", web::get().to(handlers::read_post))
                .route("/{post_id}", web::put().to(handlers::update_post))
                .route("/{post_id}", web::delete().to(handlers::delete_post))
                .route("/{post_id}/vote/", web::post().to(handlers::vote))
                .route("/{post_id}/image/", web::post().to(handlers::upload_post_image))
                .route("/{post_id}/images", web::get().to(handlers::read_post_images))
                .route(
                    "/{post_id}/image/{image_id}",
                    web::delete().to(handlers::delete_post_image),
                ),
        );
}
