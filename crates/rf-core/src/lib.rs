//! rusty-forum/crates/rf-core/src/lib.rs
//!
//! The central domain models and interface definitions for Rusty-Forum.

pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::models::*;
    use uuid::Uuid;

    #[test]
    fn test_post_view_from_record() {
        let id = Uuid::now_v7();
        let author_id = Uuid::now_v7();
        let record = PostRecord {
            post: Post {
                id,
                author_id,
                title: Some("Hello Rust!".to_string()),
                body: "first".to_string(),
                parent_id: None,
                comment_count: 0,
                upvote_count: 1,
                downvote_count: 0,
                created_at: chrono::Utc::now(),
            },
            author_name: "alice".to_string(),
        };

        let view = PostView::from_record(record);
        assert_eq!(view.id, id);
        assert_eq!(view.author.id, author_id);
        assert_eq!(view.author.name, "alice");
        assert!(view.comments.is_empty());
        assert!(view.current_user_vote.is_none());
    }

    #[test]
    fn test_order_parsing_rejects_unknown_mode() {
        assert_eq!(Order::from_str("date").unwrap(), Order::Date);
        assert_eq!(Order::from_str("popularity").unwrap(), Order::Popularity);
        assert!(Order::from_str("karma").is_err());
    }

    #[test]
    fn test_vote_type_round_trip() {
        assert_eq!(VoteType::from_str("up").unwrap(), VoteType::Up);
        assert_eq!(VoteType::from_str("down").unwrap(), VoteType::Down);
        assert_eq!(VoteType::Up.opposite(), VoteType::Down);
        assert!(VoteType::from_str("sideways").is_err());
    }
}
