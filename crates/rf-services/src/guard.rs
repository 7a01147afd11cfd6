//! Ownership check applied before any mutating operation on a post or its
//! images.

use rf_core::error::{AppError, Result};
use rf_core::models::Post;
use uuid::Uuid;

pub fn require_owner(post: &Post, requester: Uuid) -> Result<()> {
    if post.author_id == requester {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "post {} is not owned by the requester",
            post.id
        )))
    }
}
