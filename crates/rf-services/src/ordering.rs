//! Listing order as a pure comparator over post records.

use std::cmp::Ordering;

use rf_core::models::{Order, PostRecord};

/// Returns the deterministic comparator for a listing mode.
///
/// `Date` sorts newest first. `Popularity` sorts by upvotes descending.
/// Creation time and then id break ties, so equal keys still produce a
/// stable, reproducible order.
pub fn comparator(order: Order) -> impl Fn(&PostRecord, &PostRecord) -> Ordering {
    move |a, b| {
        let (a, b) = (&a.post, &b.post);
        match order {
            Order::Date => b
                .created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id)),
            Order::Popularity => b
                .upvote_count
                .cmp(&a.upvote_count)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id)),
        }
    }
}

pub fn sort_posts(posts: &mut [PostRecord], order: Order) {
    posts.sort_by(comparator(order));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rf_core::models::Post;
    use uuid::Uuid;

    fn record(upvotes: i64, age_minutes: i64) -> PostRecord {
        PostRecord {
            post: Post {
                id: Uuid::now_v7(),
                author_id: Uuid::now_v7(),
                title: None,
                body: "body".to_string(),
                parent_id: None,
                comment_count: 0,
                upvote_count: upvotes,
                downvote_count: 0,
                created_at: Utc::now() - Duration::minutes(age_minutes),
            },
            author_name: "author".to_string(),
        }
    }

    #[test]
    fn date_orders_newest_first() {
        let mut posts = vec![record(0, 30), record(0, 10), record(0, 20)];
        sort_posts(&mut posts, Order::Date);
        let ages: Vec<_> = posts
            .windows(2)
            .map(|w| w[0].post.created_at >= w[1].post.created_at)
            .collect();
        assert!(ages.iter().all(|newer| *newer));
    }

    #[test]
    fn popularity_orders_by_upvotes_descending() {
        let mut posts = vec![record(5, 0), record(9, 0), record(1, 0)];
        sort_posts(&mut posts, Order::Popularity);
        let counts: Vec<_> = posts.iter().map(|p| p.post.upvote_count).collect();
        assert_eq!(counts, vec![9, 5, 1]);
    }

    #[test]
    fn popularity_breaks_ties_by_recency() {
        let mut posts = vec![record(3, 60), record(3, 5)];
        sort_posts(&mut posts, Order::Popularity);
        assert!(posts[0].post.created_at > posts[1].post.created_at);
    }
}
