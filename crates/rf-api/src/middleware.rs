//! rusty-forum/crates/rf-api/src/middleware.rs
//!
//! Shared middleware for logging and cross-origin access.

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::Logger;

// Returns a standard access logger:
// remote-ip "request-line" status-code response-size "referrer" "user-agent"
pub fn standard_middleware() -> Logger {
    Logger::default()
}

// Configures CORS (Cross-Origin Resource Sharing)
// The PWA frontend is served from a different origin than the API.
pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(3600)
}
