//! Maps the core error taxonomy onto HTTP responses.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use rf_core::error::AppError;

/// Newtype so `AppError` can travel through actix as a response.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            AppError::NotFound(_, _) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Storage details stay in the logs, not in the response body.
        let detail = match &self.0 {
            AppError::Storage(_) => {
                log::error!("{}", self.0);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "detail": detail }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_stable_status_codes() {
        let cases = [
            (AppError::not_found("post", 1), 404),
            (AppError::Forbidden("nope".into()), 403),
            (AppError::Unauthorized("who".into()), 401),
            (AppError::Conflict("dup".into()), 409),
            (AppError::InvalidArgument("bad".into()), 400),
            (AppError::Storage("boom".into()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError(err).status_code().as_u16(), code);
        }
    }
}
