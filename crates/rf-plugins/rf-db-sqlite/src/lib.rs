//! # rf-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational
//! model and the `rf-core` domain models. All multi-row invariants (the
//! voting protocol, the ancestor comment-count walk, the subtree cascade)
//! are committed inside single transactions here.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rf_core::error::{AppError, Result};
use rf_core::models::{
    Image, NewPost, Post, PostFilter, PostRecord, Role, User, VoteAction, VoteOutcome, VoteType,
};
use rf_core::traits::{PostRepo, UserRepo};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Transaction};
use uuid::Uuid;

/// Walks longer than this are treated as corrupt data, not deep threads.
const MAX_ANCESTOR_DEPTH: usize = 10_000;

const POST_SELECT: &str = "SELECT p.id, p.author_id, p.title, p.body, p.parent_id, \
     p.comment_count, p.upvote_count, p.downvote_count, p.created_at, \
     u.name AS author_name \
     FROM posts p JOIN users u ON u.id = p.author_id";

pub struct SqliteForumRepo {
    pool: SqlitePool,
}

// Helper for UUID conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> Uuid {
    Uuid::from_slice(blob).unwrap_or_default()
}

fn db_err(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation
            | sqlx::error::ErrorKind::ForeignKeyViolation => {
                return AppError::Conflict(db.message().to_string());
            }
            _ => {}
        }
    }
    AppError::Storage(e.to_string())
}

fn stored_vote_type(raw: &str) -> Result<VoteType> {
    VoteType::from_str(raw)
        .map_err(|_| AppError::Storage(format!("corrupt vote_type column: {raw}")))
}

fn stored_role(raw: &str) -> Result<Role> {
    Role::from_str(raw).map_err(|_| AppError::Storage(format!("corrupt role column: {raw}")))
}

fn post_from_row(row: &sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: blob_to_uuid(row.get::<Vec<u8>, _>("id").as_slice()),
        author_id: blob_to_uuid(row.get::<Vec<u8>, _>("author_id").as_slice()),
        title: row.get("title"),
        body: row.get("body"),
        parent_id: row
            .get::<Option<Vec<u8>>, _>("parent_id")
            .map(|blob| blob_to_uuid(&blob)),
        comment_count: row.get("comment_count"),
        upvote_count: row.get("upvote_count"),
        downvote_count: row.get("downvote_count"),
        created_at: row.get("created_at"),
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> PostRecord {
    PostRecord {
        post: post_from_row(row),
        author_name: row.get("author_name"),
    }
}

fn image_from_row(row: &sqlx::sqlite::SqliteRow) -> Image {
    Image {
        id: blob_to_uuid(row.get::<Vec<u8>, _>("id").as_slice()),
        user_id: row
            .get::<Option<Vec<u8>>, _>("user_id")
            .map(|blob| blob_to_uuid(&blob)),
        post_id: row
            .get::<Option<Vec<u8>>, _>("post_id")
            .map(|blob| blob_to_uuid(&blob)),
        url: row.get("url"),
        uploaded_at: row.get("uploaded_at"),
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: blob_to_uuid(row.get::<Vec<u8>, _>("id").as_slice()),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: stored_role(&row.get::<String, _>("role"))?,
        created_at: row.get("created_at"),
    })
}

impl SqliteForumRepo {
    /// Connects (creating the file if needed), enables foreign-key
    /// enforcement on every connection and applies the schema.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database exists per connection; a pool of them would
        // be a pool of unrelated databases.
        let pool_options = if url.contains(":memory:") || url.contains("mode=memory") {
            SqlitePoolOptions::new().max_connections(1)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_options.connect_with(options).await.map_err(db_err)?;
        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS users (
                id            BLOB PRIMARY KEY,
                name          TEXT NOT NULL,
                email         TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role          TEXT NOT NULL DEFAULT 'user',
                created_at    TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS posts (
                id             BLOB PRIMARY KEY,
                author_id      BLOB NOT NULL REFERENCES users(id),
                title          TEXT,
                body           TEXT NOT NULL,
                parent_id      BLOB REFERENCES posts(id) ON DELETE CASCADE,
                comment_count  INTEGER NOT NULL DEFAULT 0,
                upvote_count   INTEGER NOT NULL DEFAULT 0,
                downvote_count INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS images (
                id          BLOB PRIMARY KEY,
                user_id     BLOB REFERENCES users(id) ON DELETE CASCADE,
                post_id     BLOB REFERENCES posts(id) ON DELETE CASCADE,
                url         TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                CHECK ((user_id IS NULL) <> (post_id IS NULL))
            )",
            "CREATE TABLE IF NOT EXISTS votes (
                id        BLOB PRIMARY KEY,
                post_id   BLOB NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id   BLOB NOT NULL REFERENCES users(id),
                vote_type TEXT NOT NULL,
                UNIQUE (post_id, user_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_posts_parent ON posts(parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id)",
            "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_images_post ON images(post_id)",
            "CREATE INDEX IF NOT EXISTS idx_images_user ON images(user_id)",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    /// Direct pool access, used by tests to assert on raw rows.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_record(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<PostRecord> {
        let sql = format!("{POST_SELECT} WHERE p.id = ?");
        let row = sqlx::query(&sql)
            .bind(uuid_to_blob(id))
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(record_from_row(&row))
    }

    async fn bump_counter(
        tx: &mut Transaction<'_, Sqlite>,
        post_id: Uuid,
        vote_type: VoteType,
        delta: i64,
    ) -> Result<()> {
        let column = match vote_type {
            VoteType::Up => "upvote_count",
            VoteType::Down => "downvote_count",
        };
        let sql = format!("UPDATE posts SET {column} = {column} + ? WHERE id = ?");
        sqlx::query(&sql)
            .bind(delta)
            .bind(uuid_to_blob(post_id))
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl PostRepo for SqliteForumRepo {
    /// Atomic operation: the post row, the comment-count roll-up along the
    /// ancestor chain, and the author's seed upvote commit together or not
    /// at all.
    async fn create_post(&self, new: NewPost) -> Result<PostRecord> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(parent_id) = new.parent_id {
            let parent = sqlx::query("SELECT id FROM posts WHERE id = ?")
                .bind(uuid_to_blob(parent_id))
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            if parent.is_none() {
                return Err(AppError::not_found("post", parent_id));
            }
        }

        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO posts (id, author_id, title, body, parent_id, \
             comment_count, upvote_count, downvote_count, created_at) \
             VALUES (?, ?, ?, ?, ?, 0, 0, 0, ?)",
        )
        .bind(uuid_to_blob(id))
        .bind(uuid_to_blob(new.author_id))
        .bind(new.title)
        .bind(new.body)
        .bind(new.parent_id.map(uuid_to_blob))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        // Roll the new comment up the whole ancestor chain so comment_count
        // stays a full-subtree total. Iterative; a revisited id means the
        // stored hierarchy has a cycle.
        let mut cursor = new.parent_id;
        let mut seen: HashSet<Uuid> = HashSet::new();
        while let Some(ancestor) = cursor {
            if !seen.insert(ancestor) || seen.len() > MAX_ANCESTOR_DEPTH {
                return Err(AppError::Storage(format!(
                    "cyclic post hierarchy detected at {ancestor}"
                )));
            }
            sqlx::query("UPDATE posts SET comment_count = comment_count + 1 WHERE id = ?")
                .bind(uuid_to_blob(ancestor))
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            cursor = sqlx::query("SELECT parent_id FROM posts WHERE id = ?")
                .bind(uuid_to_blob(ancestor))
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?
                .get::<Option<Vec<u8>>, _>("parent_id")
                .map(|blob| blob_to_uuid(&blob));
        }

        // Authors open their own posts with an upvote.
        sqlx::query("INSERT INTO votes (id, post_id, user_id, vote_type) VALUES (?, ?, ?, 'up')")
            .bind(uuid_to_blob(Uuid::now_v7()))
            .bind(uuid_to_blob(id))
            .bind(uuid_to_blob(new.author_id))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("UPDATE posts SET upvote_count = upvote_count + 1 WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let record = Self::fetch_record(&mut tx, id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(record)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<PostRecord>> {
        let sql = format!("{POST_SELECT} WHERE p.id = ?");
        let row = sqlx::query(&sql)
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|row| record_from_row(&row)))
    }

    async fn list_descendants(&self, root: Uuid) -> Result<Vec<PostRecord>> {
        let sql = format!(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM posts WHERE id = ?
                 UNION ALL
                 SELECT p.id FROM posts p JOIN subtree s ON p.parent_id = s.id
             )
             {POST_SELECT}
             WHERE p.id IN (SELECT id FROM subtree) AND p.id <> ?
             ORDER BY p.created_at ASC, p.id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(uuid_to_blob(root))
            .bind(uuid_to_blob(root))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn list_posts(&self, filter: &PostFilter) -> Result<Vec<PostRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(POST_SELECT);
        qb.push(" WHERE 1 = 1");

        if let Some(author_id) = filter.author_id {
            qb.push(" AND p.author_id = ").push_bind(uuid_to_blob(author_id));
        }
        if let Some(author_name) = &filter.author_name {
            qb.push(" AND LOWER(u.name) LIKE '%' || LOWER(")
                .push_bind(author_name.clone())
                .push(") || '%'");
        }
        if let Some(title) = &filter.title {
            qb.push(" AND LOWER(p.title) LIKE '%' || LOWER(")
                .push_bind(title.clone())
                .push(") || '%'");
        }
        if let Some(parent_id) = filter.parent_id {
            qb.push(" AND p.parent_id = ").push_bind(uuid_to_blob(parent_id));
        }
        if !filter.show_comments {
            qb.push(" AND p.parent_id IS NULL");
        }
        if let Some((viewer, vote_type)) = &filter.voted_by {
            qb.push(" AND EXISTS (SELECT 1 FROM votes v WHERE v.post_id = p.id AND v.user_id = ")
                .push_bind(uuid_to_blob(*viewer))
                .push(" AND v.vote_type = ")
                .push_bind(vote_type.as_str())
                .push(")");
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn update_post(&self, id: Uuid, title: Option<String>, body: String) -> Result<()> {
        let result = sqlx::query("UPDATE posts SET title = ?, body = ? WHERE id = ?")
            .bind(title)
            .bind(body)
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("post", id));
        }
        Ok(())
    }

    /// Collects the blob URLs owned by the whole subtree, then deletes the
    /// root row; foreign keys cascade to descendant posts, their images and
    /// all votes. The URLs are returned for post-commit store cleanup.
    async fn delete_post(&self, id: Uuid) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let exists = sqlx::query("SELECT id FROM posts WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(AppError::not_found("post", id));
        }

        let urls: Vec<String> = sqlx::query(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM posts WHERE id = ?
                 UNION ALL
                 SELECT p.id FROM posts p JOIN subtree s ON p.parent_id = s.id
             )
             SELECT i.url FROM images i WHERE i.post_id IN (SELECT id FROM subtree)
             ORDER BY i.uploaded_at ASC",
        )
        .bind(uuid_to_blob(id))
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?
        .iter()
        .map(|row| row.get("url"))
        .collect();

        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(urls)
    }

    /// The toggle/switch protocol. The vote row and both counters move in
    /// one transaction; the (post_id, user_id) unique index is the safety
    /// net under concurrent casts; the loser rolls back with a Conflict.
    async fn cast_vote(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        vote_type: VoteType,
    ) -> Result<VoteOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let post = sqlx::query("SELECT id FROM posts WHERE id = ?")
            .bind(uuid_to_blob(post_id))
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if post.is_none() {
            return Err(AppError::not_found("post", post_id));
        }

        let existing = sqlx::query("SELECT id, vote_type FROM votes WHERE post_id = ? AND user_id = ?")
            .bind(uuid_to_blob(post_id))
            .bind(uuid_to_blob(user_id))
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

        let (action, current_user_vote) = match existing {
            None => {
                sqlx::query(
                    "INSERT INTO votes (id, post_id, user_id, vote_type) VALUES (?, ?, ?, ?)",
                )
                .bind(uuid_to_blob(Uuid::now_v7()))
                .bind(uuid_to_blob(post_id))
                .bind(uuid_to_blob(user_id))
                .bind(vote_type.as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                Self::bump_counter(&mut tx, post_id, vote_type, 1).await?;
                (VoteAction::Added, Some(vote_type))
            }
            Some(row) => {
                let held = stored_vote_type(&row.get::<String, _>("vote_type"))?;
                let vote_id: Vec<u8> = row.get("id");
                if held == vote_type {
                    sqlx::query("DELETE FROM votes WHERE id = ?")
                        .bind(&vote_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;
                    Self::bump_counter(&mut tx, post_id, vote_type, -1).await?;
                    (VoteAction::Removed, None)
                } else {
                    sqlx::query("UPDATE votes SET vote_type = ? WHERE id = ?")
                        .bind(vote_type.as_str())
                        .bind(&vote_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;
                    Self::bump_counter(&mut tx, post_id, vote_type, 1).await?;
                    Self::bump_counter(&mut tx, post_id, held, -1).await?;
                    (VoteAction::Changed, Some(vote_type))
                }
            }
        };

        let counters = sqlx::query("SELECT upvote_count, downvote_count FROM posts WHERE id = ?")
            .bind(uuid_to_blob(post_id))
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let outcome = VoteOutcome {
            action,
            upvote_count: counters.get("upvote_count"),
            downvote_count: counters.get("downvote_count"),
            current_user_vote,
        };

        tx.commit().await.map_err(db_err)?;
        Ok(outcome)
    }

    async fn votes_by_user(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, VoteType>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT post_id, vote_type FROM votes WHERE user_id = ");
        qb.push_bind(uuid_to_blob(user_id));
        qb.push(" AND post_id IN (");
        let mut separated = qb.separated(", ");
        for id in post_ids {
            separated.push_bind(uuid_to_blob(*id));
        }
        qb.push(")");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        let mut votes = HashMap::with_capacity(rows.len());
        for row in rows {
            let post_id = blob_to_uuid(row.get::<Vec<u8>, _>("post_id").as_slice());
            votes.insert(post_id, stored_vote_type(&row.get::<String, _>("vote_type"))?);
        }
        Ok(votes)
    }

    async fn insert_post_image(&self, post_id: Uuid, url: &str) -> Result<Image> {
        let image = Image {
            id: Uuid::now_v7(),
            user_id: None,
            post_id: Some(post_id),
            url: url.to_string(),
            uploaded_at: Utc::now(),
        };
        sqlx::query("INSERT INTO images (id, post_id, url, uploaded_at) VALUES (?, ?, ?, ?)")
            .bind(uuid_to_blob(image.id))
            .bind(uuid_to_blob(post_id))
            .bind(&image.url)
            .bind(image.uploaded_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(image)
    }

    async fn images_for_posts(&self, post_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Image>>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, user_id, post_id, url, uploaded_at FROM images WHERE post_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in post_ids {
            separated.push_bind(uuid_to_blob(*id));
        }
        qb.push(") ORDER BY uploaded_at ASC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        let mut by_post: HashMap<Uuid, Vec<Image>> = HashMap::new();
        for row in &rows {
            let image = image_from_row(row);
            if let Some(post_id) = image.post_id {
                by_post.entry(post_id).or_default().push(image);
            }
        }
        Ok(by_post)
    }

    async fn get_image(&self, image_id: Uuid) -> Result<Option<Image>> {
        let row = sqlx::query("SELECT id, user_id, post_id, url, uploaded_at FROM images WHERE id = ?")
            .bind(uuid_to_blob(image_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|row| image_from_row(&row)))
    }

    async fn delete_image(&self, image_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(uuid_to_blob(image_id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("image", image_id));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepo for SqliteForumRepo {
    async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User> {
        let user = User {
            id: Uuid::now_v7(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role: Role::User,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(user.id))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match db_err(e) {
            AppError::Conflict(_) => {
                AppError::Conflict("email already in use, try logging in instead".to_string())
            }
            other => other,
        })?;
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| user_from_row(&row)).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| user_from_row(&row)).transpose()
    }

    async fn update_user(&self, id: Uuid, name: &str, email: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET name = ?, email = ? WHERE id = ?")
            .bind(name)
            .bind(email)
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await
            .map_err(|e| match db_err(e) {
                AppError::Conflict(_) => AppError::Conflict("email already in use".to_string()),
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("user", id));
        }
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("user", id));
        }
        Ok(())
    }

    /// Replaces the single live profile image record atomically, returning
    /// the displaced URL for store cleanup.
    async fn set_profile_image(&self, user_id: Uuid, url: &str) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let displaced: Option<String> =
            sqlx::query("SELECT url FROM images WHERE user_id = ?")
                .bind(uuid_to_blob(user_id))
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?
                .map(|row| row.get("url"));

        sqlx::query("DELETE FROM images WHERE user_id = ?")
            .bind(uuid_to_blob(user_id))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("INSERT INTO images (id, user_id, url, uploaded_at) VALUES (?, ?, ?, ?)")
            .bind(uuid_to_blob(Uuid::now_v7()))
            .bind(uuid_to_blob(user_id))
            .bind(url)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(displaced)
    }

    async fn get_profile_image(&self, user_id: Uuid) -> Result<Option<Image>> {
        let row = sqlx::query(
            "SELECT id, user_id, post_id, url, uploaded_at FROM images WHERE user_id = ?",
        )
        .bind(uuid_to_blob(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|row| image_from_row(&row)))
    }

    async fn delete_profile_image(&self, user_id: Uuid) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let url: Option<String> = sqlx::query("SELECT url FROM images WHERE user_id = ?")
            .bind(uuid_to_blob(user_id))
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .map(|row| row.get("url"));

        if url.is_some() {
            sqlx::query("DELETE FROM images WHERE user_id = ?")
                .bind(uuid_to_blob(user_id))
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(url)
    }
}
