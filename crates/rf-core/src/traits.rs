//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//!
//! Transaction boundaries live behind single methods: an implementation of
//! `create_post`, `cast_vote` or `delete_post` must apply all of its row and
//! counter mutations atomically, or none of them.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Image, NewPost, PostFilter, PostRecord, User, VoteOutcome, VoteType,
};

/// Data persistence contract for posts, votes and post images.
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Creates a post or comment in one transaction: inserts the row,
    /// increments `comment_count` along the whole ancestor chain and seeds
    /// the author's own upvote.
    async fn create_post(&self, post: NewPost) -> Result<PostRecord>;

    async fn get_post(&self, id: Uuid) -> Result<Option<PostRecord>>;

    /// All descendants of `root` (every level), ordered oldest first.
    /// Does not include `root` itself.
    async fn list_descendants(&self, root: Uuid) -> Result<Vec<PostRecord>>;

    /// Filtered listing; ordering is the caller's concern.
    async fn list_posts(&self, filter: &PostFilter) -> Result<Vec<PostRecord>>;

    async fn update_post(&self, id: Uuid, title: Option<String>, body: String) -> Result<()>;

    /// Deletes the post row; the storage layer cascades to all descendant
    /// posts, their images and their votes. Returns the blob URLs orphaned
    /// by the cascade so the caller can clean up the store.
    async fn delete_post(&self, id: Uuid) -> Result<Vec<String>>;

    /// Applies the add/switch/remove voting protocol for (post, user) and
    /// maintains the post's counters in the same transaction.
    async fn cast_vote(&self, post_id: Uuid, user_id: Uuid, vote_type: VoteType)
        -> Result<VoteOutcome>;

    /// The given user's votes across a set of posts, keyed by post id.
    async fn votes_by_user(&self, user_id: Uuid, post_ids: &[Uuid])
        -> Result<HashMap<Uuid, VoteType>>;

    // Post image records
    async fn insert_post_image(&self, post_id: Uuid, url: &str) -> Result<Image>;
    async fn images_for_posts(&self, post_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Image>>>;
    async fn get_image(&self, image_id: Uuid) -> Result<Option<Image>>;
    async fn delete_image(&self, image_id: Uuid) -> Result<()>;
}

/// Data persistence contract for accounts and profile images.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Inserts a new account with the `user` role. A duplicate email is a
    /// `Conflict`.
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn update_user(&self, id: Uuid, name: &str, email: &str) -> Result<()>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()>;

    /// Replaces the user's profile image record, returning the URL of the
    /// record it displaced, if any.
    async fn set_profile_image(&self, user_id: Uuid, url: &str) -> Result<Option<String>>;
    async fn get_profile_image(&self, user_id: Uuid) -> Result<Option<Image>>;
    /// Removes the profile image record, returning its URL if one existed.
    async fn delete_profile_image(&self, user_id: Uuid) -> Result<Option<String>>;
}

/// Blob storage contract for uploaded images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Validates and saves raw bytes, returning a resolvable URL.
    async fn store(&self, data: Vec<u8>, content_type: &str) -> Result<String>;

    /// Removes the blob behind `url`. Idempotent: a missing file is not an
    /// error.
    async fn delete(&self, url: &str) -> Result<()>;
}

/// Identity contract: password hashing and bearer tokens.
pub trait AuthProvider: Send + Sync {
    fn hash_password(&self, password: &str) -> Result<String>;
    fn verify_password(&self, password: &str, hash: &str) -> bool;

    /// Issues a signed, expiring token for the given account.
    fn issue_token(&self, user_id: Uuid) -> Result<String>;

    /// Verifies signature and expiry, returning the account id.
    fn verify_token(&self, token: &str) -> Result<Uuid>;
}
