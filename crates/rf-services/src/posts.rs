//! Post hierarchy management: create/read/list/update/delete, voting and
//! post image attachment, orchestrated over the persistence and blob-store
//! ports.

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;
use rf_core::error::{AppError, Result};
use rf_core::models::{
    Image, NewPost, Order, PostFilter, PostRecord, PostView, VoteOutcome, VoteType,
};
use rf_core::traits::{ImageStore, PostRepo};
use uuid::Uuid;

use crate::{guard, ordering, projection};

// Input limits, matching what clients are told to enforce.
pub const MAX_TITLE_LEN: usize = 1_000;
pub const MAX_BODY_LEN: usize = 5_000;

pub struct PostService {
    repo: Arc<dyn PostRepo>,
    store: Arc<dyn ImageStore>,
}

impl PostService {
    pub fn new(repo: Arc<dyn PostRepo>, store: Arc<dyn ImageStore>) -> Self {
        Self { repo, store }
    }

    /// Creates a post, or a comment when `parent_id` is given. The repository
    /// commits the insert, the ancestor comment-count walk and the author's
    /// seed upvote in one transaction.
    pub async fn create_post(
        &self,
        author_id: Uuid,
        title: Option<String>,
        body: String,
        parent_id: Option<Uuid>,
    ) -> Result<PostView> {
        validate_title(title.as_deref())?;
        validate_body(&body)?;

        let record = self
            .repo
            .create_post(NewPost {
                author_id,
                title,
                body,
                parent_id,
            })
            .await?;

        let mut view = PostView::from_record(record);
        // The seed upvote was committed with the insert.
        view.current_user_vote = Some(VoteType::Up);
        Ok(view)
    }

    /// Returns the post with its full nested comment tree. When a viewer is
    /// present, every node is annotated with that viewer's own vote.
    pub async fn get_post(&self, post_id: Uuid, viewer: Option<Uuid>) -> Result<PostView> {
        let root = self
            .repo
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("post", post_id))?;
        let descendants = self.repo.list_descendants(post_id).await?;

        let mut ids: Vec<Uuid> = Vec::with_capacity(descendants.len() + 1);
        ids.push(post_id);
        ids.extend(descendants.iter().map(|r| r.post.id));

        let mut images = self.repo.images_for_posts(&ids).await?;
        let mut root_view = assemble_tree(root, descendants, &mut images)?;

        if let Some(viewer) = viewer {
            let votes = self.repo.votes_by_user(viewer, &ids).await?;
            projection::annotate(&mut root_view, &votes);
        }
        Ok(root_view)
    }

    /// Filtered, ordered, flat listing. Projection is applied per returned
    /// post; nothing is nested here.
    pub async fn list_posts(
        &self,
        filter: &PostFilter,
        order: Order,
        viewer: Option<Uuid>,
    ) -> Result<Vec<PostView>> {
        let mut records = self.repo.list_posts(filter).await?;
        ordering::sort_posts(&mut records, order);

        let ids: Vec<Uuid> = records.iter().map(|r| r.post.id).collect();
        let mut images = self.repo.images_for_posts(&ids).await?;
        let votes = match viewer {
            Some(viewer) if !ids.is_empty() => self.repo.votes_by_user(viewer, &ids).await?,
            _ => HashMap::new(),
        };

        let mut views = Vec::with_capacity(records.len());
        for record in records {
            let mut view = PostView::from_record(record);
            view.image_urls = take_urls(&mut images, view.id);
            projection::annotate(&mut view, &votes);
            views.push(view);
        }
        Ok(views)
    }

    /// Updates title/body. The parent link is immutable and not even
    /// accepted as input.
    pub async fn update_post(
        &self,
        post_id: Uuid,
        requester: Uuid,
        title: Option<String>,
        body: String,
    ) -> Result<()> {
        let record = self.require_post(post_id).await?;
        guard::require_owner(&record.post, requester)?;
        validate_title(title.as_deref())?;
        validate_body(&body)?;
        self.repo.update_post(post_id, title, body).await
    }

    /// Deletes the post and its whole subtree. The database deletion commits
    /// first; the orphaned blobs are then removed from the store best-effort.
    /// A failed file deletion is logged and never reverses the commit.
    pub async fn delete_post(&self, post_id: Uuid, requester: Uuid) -> Result<()> {
        let record = self.require_post(post_id).await?;
        guard::require_owner(&record.post, requester)?;

        let orphaned = self.repo.delete_post(post_id).await?;
        for url in orphaned {
            if let Err(e) = self.store.delete(&url).await {
                warn!("failed to delete image blob {url}: {e}");
            }
        }
        Ok(())
    }

    /// Applies the toggle/switch voting protocol.
    pub async fn cast_vote(
        &self,
        post_id: Uuid,
        voter: Uuid,
        vote_type: VoteType,
    ) -> Result<VoteOutcome> {
        self.repo.cast_vote(post_id, voter, vote_type).await
    }

    /// Attaches an uploaded image to an owned post. The blob is written
    /// first; if recording it fails, the just-written blob is deleted again
    /// so no orphan survives.
    pub async fn add_post_image(
        &self,
        post_id: Uuid,
        requester: Uuid,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<Image> {
        let record = self.require_post(post_id).await?;
        guard::require_owner(&record.post, requester)?;

        let url = self.store.store(data, content_type).await?;
        match self.repo.insert_post_image(post_id, &url).await {
            Ok(image) => Ok(image),
            Err(e) => {
                if let Err(cleanup) = self.store.delete(&url).await {
                    warn!("failed to clean up unrecorded blob {url}: {cleanup}");
                }
                Err(e)
            }
        }
    }

    pub async fn post_images(&self, post_id: Uuid) -> Result<Vec<Image>> {
        self.require_post(post_id).await?;
        let mut images = self.repo.images_for_posts(&[post_id]).await?;
        Ok(images.remove(&post_id).unwrap_or_default())
    }

    /// Removes one attachment: the record first, then the blob best-effort.
    pub async fn delete_post_image(
        &self,
        post_id: Uuid,
        requester: Uuid,
        image_id: Uuid,
    ) -> Result<()> {
        let record = self.require_post(post_id).await?;
        guard::require_owner(&record.post, requester)?;

        let image = self
            .repo
            .get_image(image_id)
            .await?
            .filter(|img| img.post_id == Some(post_id))
            .ok_or_else(|| AppError::not_found("image", image_id))?;

        self.repo.delete_image(image_id).await?;
        if let Err(e) = self.store.delete(&image.url).await {
            warn!("failed to delete image blob {}: {e}", image.url);
        }
        Ok(())
    }

    async fn require_post(&self, post_id: Uuid) -> Result<PostRecord> {
        self.repo
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("post", post_id))
    }
}

/// Builds the nested view from the flat subtree rows.
///
/// Descendants arrive oldest first and a parent always predates its
/// children, so walking them newest first means every node's children are
/// already attached when the node itself is moved under its parent. Each
/// list is reversed once at that point to restore oldest-first display
/// order. A descendant whose parent is missing from the subtree means the
/// stored hierarchy is corrupt.
fn assemble_tree(
    root: PostRecord,
    descendants: Vec<PostRecord>,
    images: &mut HashMap<Uuid, Vec<Image>>,
) -> Result<PostView> {
    let root_id = root.post.id;
    let link_order: Vec<(Uuid, Option<Uuid>)> = descendants
        .iter()
        .map(|r| (r.post.id, r.post.parent_id))
        .collect();

    let mut views: HashMap<Uuid, PostView> = HashMap::with_capacity(descendants.len() + 1);
    for record in std::iter::once(root).chain(descendants) {
        let mut view = PostView::from_record(record);
        view.image_urls = take_urls(images, view.id);
        views.insert(view.id, view);
    }

    for &(id, parent_id) in link_order.iter().rev() {
        let mut child = views.remove(&id).ok_or_else(|| integrity_error(id))?;
        child.comments.reverse();
        let parent = parent_id
            .and_then(|pid| views.get_mut(&pid))
            .ok_or_else(|| integrity_error(id))?;
        parent.comments.push(child);
    }

    let mut root_view = views
        .remove(&root_id)
        .ok_or_else(|| integrity_error(root_id))?;
    root_view.comments.reverse();
    Ok(root_view)
}

fn take_urls(images: &mut HashMap<Uuid, Vec<Image>>, post_id: Uuid) -> Vec<String> {
    images
        .remove(&post_id)
        .map(|imgs| imgs.into_iter().map(|img| img.url).collect())
        .unwrap_or_default()
}

fn integrity_error(post_id: Uuid) -> AppError {
    AppError::Storage(format!(
        "post hierarchy is corrupt around post {post_id}"
    ))
}

fn validate_title(title: Option<&str>) -> Result<()> {
    if let Some(title) = title {
        if title.len() > MAX_TITLE_LEN {
            return Err(AppError::InvalidArgument(format!(
                "title exceeds {MAX_TITLE_LEN} characters"
            )));
        }
    }
    Ok(())
}

fn validate_body(body: &str) -> Result<()> {
    if body.is_empty() {
        return Err(AppError::InvalidArgument("body must not be empty".into()));
    }
    if body.len() > MAX_BODY_LEN {
        return Err(AppError::InvalidArgument(format!(
            "body exceeds {MAX_BODY_LEN} characters"
        )));
    }
    Ok(())
}
