use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::posts::dto::{CreatePostRequest, PostPage, UpdatePostRequest};
use crate::posts::repo::{NewPost, Post, PostChanges, PostStore, PostWithAuthor};

/// Business rules for posts. Persistence goes through the injected store.
#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
}

impl PostService {
    pub fn new(posts: Arc<dyn PostStore>) -> Self {
        Self { posts }
    }

    pub async fn create_post(
        &self,
        author_id: i32,
        req: &CreatePostRequest,
    ) -> Result<Post, AppError> {
        let is_published = req.is_published.unwrap_or(false);
        let post = self
            .posts
            .create(NewPost {
                title: req.title.clone(),
                content: req.content.clone(),
                excerpt: req.excerpt.clone(),
                slug: slugify(&req.title),
                is_published,
                author_id,
                published_at: is_published.then(OffsetDateTime::now_utc),
            })
            .await?;
        info!(post_id = post.id, author_id, "post created");
        Ok(post)
    }

    pub async fn get_post(&self, id: i32) -> Result<PostWithAuthor, AppError> {
        match self.posts.find_with_author(id).await? {
            Some(post) => Ok(post),
            None => Err(AppError::NotFound("Post not found".into())),
        }
    }

    pub async fn list_posts(
        &self,
        page: u32,
        limit: u32,
        published_only: bool,
    ) -> Result<PostPage<PostWithAuthor>, AppError> {
        let (fetch, offset) = page_bounds(page, limit);
        let posts = self.posts.list(published_only, fetch, offset).await?;
        let total = self.posts.count(published_only).await?;
        Ok(PostPage {
            posts,
            total,
            page,
            limit,
        })
    }

    /// Applies a partial update. `published_at` is stamped only on the
    /// false-to-true publish transition and never cleared afterwards.
    pub async fn update_post(
        &self,
        id: i32,
        patch: &UpdatePostRequest,
        author_id: Option<i32>,
    ) -> Result<Post, AppError> {
        let existing = match self.posts.find_by_id(id).await? {
            Some(post) => post,
            None => return Err(AppError::NotFound("Post not found".into())),
        };
        if let Some(author_id) = author_id {
            if existing.author_id != author_id {
                warn!(post_id = id, author_id, "update rejected for non-owner");
                return Err(AppError::Forbidden(
                    "Not authorized to update this post".into(),
                ));
            }
        }

        let published_at = match patch.is_published {
            Some(true) if !existing.is_published => Some(OffsetDateTime::now_utc()),
            _ => None,
        };
        let changes = PostChanges {
            title: patch.title.clone(),
            content: patch.content.clone(),
            excerpt: patch.excerpt.clone(),
            is_published: patch.is_published,
            published_at,
        };
        match self.posts.update(id, changes).await? {
            Some(post) => {
                info!(post_id = id, "post updated");
                Ok(post)
            }
            None => {
                error!(post_id = id, "update returned no row");
                Err(AppError::Internal("Failed to update post".into()))
            }
        }
    }

    pub async fn delete_post(&self, id: i32, author_id: Option<i32>) -> Result<(), AppError> {
        if let Some(author_id) = author_id {
            let existing = match self.posts.find_by_id(id).await? {
                Some(post) => post,
                None => return Err(AppError::NotFound("Post not found".into())),
            };
            if existing.author_id != author_id {
                warn!(post_id = id, author_id, "delete rejected for non-owner");
                return Err(AppError::Forbidden(
                    "Not authorized to delete this post".into(),
                ));
            }
        }
        if !self.posts.delete(id).await? {
            // The row can vanish between the ownership check and the delete.
            debug!(post_id = id, "delete affected no rows");
        }
        info!(post_id = id, "post deleted");
        Ok(())
    }

    pub async fn user_posts(
        &self,
        author_id: i32,
        page: u32,
        limit: u32,
    ) -> Result<PostPage<Post>, AppError> {
        let (fetch, offset) = page_bounds(page, limit);
        let posts = self.posts.list_by_author(author_id, fetch, offset).await?;
        let total = self.posts.count_by_author(author_id).await?;
        Ok(PostPage {
            posts,
            total,
            page,
            limit,
        })
    }
}

/// 1-indexed pagination to SQL limit/offset.
fn page_bounds(page: u32, limit: u32) -> (i64, i64) {
    let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
    (i64::from(limit), offset)
}

/// Derives a URL slug from a title. ASCII alphanumerics are kept
/// lowercased and runs of spaces or hyphens become a single hyphen;
/// every other character is dropped, tabs and other exotic whitespace
/// included. Equal titles produce equal slugs; uniqueness is not
/// enforced.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if (ch == ' ' || ch == '-') && !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
