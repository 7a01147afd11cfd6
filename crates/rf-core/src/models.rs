//! # Domain Models
//!
//! These structs represent the core entities of Rusty-Forum.
//! We use UUID v7 for time-ordered, globally unique identification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(AppError::InvalidArgument(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Up => "up",
            VoteType::Down => "down",
        }
    }

    pub fn opposite(&self) -> VoteType {
        match self {
            VoteType::Up => VoteType::Down,
            VoteType::Down => VoteType::Up,
        }
    }
}

impl std::str::FromStr for VoteType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteType::Up),
            "down" => Ok(VoteType::Down),
            other => Err(AppError::InvalidArgument(format!(
                "unknown vote type: {other}"
            ))),
        }
    }
}

/// What `cast_vote` did with the caller's existing vote, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Added,
    Removed,
    Changed,
}

/// Listing order for posts. Parsing an unknown mode is an error,
/// there is no silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Date,
    Popularity,
}

impl std::str::FromStr for Order {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(Order::Date),
            "popularity" => Ok(Order::Popularity),
            other => Err(AppError::InvalidArgument(format!(
                "unknown order value: {other}"
            ))),
        }
    }
}

/// A registered account. Owns posts and at most one live profile image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string, never the plaintext.
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The fundamental unit of conversation. Top-level posts and comments share
/// this table: a non-null `parent_id` makes the row a comment.
///
/// `comment_count`, `upvote_count` and `downvote_count` are denormalized and
/// maintained transactionally; they always equal the true aggregates over
/// descendant posts / live votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    /// Comments carry no title.
    pub title: Option<String>,
    pub body: String,
    /// Self-reference into the posts table; null for top-level posts.
    pub parent_id: Option<Uuid>,
    /// Count of ALL descendants, not just direct children.
    pub comment_count: i64,
    pub upvote_count: i64,
    pub downvote_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A post row joined with its author's public name, as repositories return it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub post: Post,
    pub author_name: String,
}

/// One user's vote on one post. At most one per (post, user) pair,
/// enforced by a unique constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub vote_type: VoteType,
}

/// An uploaded image. Owned by exactly one of a user (profile image)
/// or a post (attachment), never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub post_id: Option<Uuid>,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Input for creating a post or comment.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub title: Option<String>,
    pub body: String,
    pub parent_id: Option<Uuid>,
}

/// Conjunctive, independently optional listing filters.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub author_id: Option<Uuid>,
    /// Case-insensitive substring over the author's name.
    pub author_name: Option<String>,
    /// Case-insensitive substring over the title.
    pub title: Option<String>,
    /// Direct children of this post.
    pub parent_id: Option<Uuid>,
    /// Posts the given viewer voted this way on.
    pub voted_by: Option<(Uuid, VoteType)>,
    /// When false (the default) only top-level posts are returned.
    pub show_comments: bool,
}

/// Result of a `cast_vote` call: the action taken plus the post's counters
/// as committed by the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub action: VoteAction,
    pub upvote_count: i64,
    pub downvote_count: i64,
    pub current_user_vote: Option<VoteType>,
}

/// The response-shape projection of a post: author summary, counters,
/// attached image URLs, the viewer's own vote and the nested comments.
/// Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: Uuid,
    pub author: AuthorSummary,
    pub title: Option<String>,
    pub body: String,
    pub parent_id: Option<Uuid>,
    pub comment_count: i64,
    pub upvote_count: i64,
    pub downvote_count: i64,
    pub created_at: DateTime<Utc>,
    pub image_urls: Vec<String>,
    pub current_user_vote: Option<VoteType>,
    pub comments: Vec<PostView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub name: String,
}

impl PostView {
    /// Builds the projection of a single record with empty comments and no
    /// viewer vote; both are filled in by the service layer.
    pub fn from_record(record: PostRecord) -> Self {
        let PostRecord { post, author_name } = record;
        PostView {
            id: post.id,
            author: AuthorSummary {
                id: post.author_id,
                name: author_name,
            },
            title: post.title,
            body: post.body,
            parent_id: post.parent_id,
            comment_count: post.comment_count,
            upvote_count: post.upvote_count,
            downvote_count: post.downvote_count,
            created_at: post.created_at,
            image_urls: Vec::new(),
            current_user_vote: None,
            comments: Vec::new(),
        }
    }
}
