use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

/// A blog post row. `published_at` stays null until the first publish.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub slug: String,
    pub is_published: bool,
    pub author_id: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
}

/// Public author fields joined onto post read views.
#[derive(Debug, Clone, Serialize)]
pub struct PostAuthor {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostWithAuthor {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<PostAuthor>,
}

#[derive(FromRow)]
struct PostWithAuthorRow {
    #[sqlx(flatten)]
    post: Post,
    author_name: Option<String>,
    author_email: Option<String>,
}

impl From<PostWithAuthorRow> for PostWithAuthor {
    fn from(row: PostWithAuthorRow) -> Self {
        let author = match (row.author_name, row.author_email) {
            (Some(name), Some(email)) => Some(PostAuthor { name, email }),
            _ => None,
        };
        Self {
            post: row.post,
            author,
        }
    }
}

#[derive(Debug)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub slug: String,
    pub is_published: bool,
    pub author_id: i32,
    pub published_at: Option<OffsetDateTime>,
}

/// Column-level patch. `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub is_published: Option<bool>,
    pub published_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, post: NewPost) -> Result<Post, sqlx::Error>;
    async fn find_by_id(&self, id: i32) -> Result<Option<Post>, sqlx::Error>;
    async fn find_with_author(&self, id: i32) -> Result<Option<PostWithAuthor>, sqlx::Error>;
    async fn list(
        &self,
        published_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostWithAuthor>, sqlx::Error>;
    async fn count(&self, published_only: bool) -> Result<i64, sqlx::Error>;
    async fn list_by_author(
        &self,
        author_id: i32,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, sqlx::Error>;
    async fn count_by_author(&self, author_id: i32) -> Result<i64, sqlx::Error>;
    async fn update(&self, id: i32, changes: PostChanges) -> Result<Option<Post>, sqlx::Error>;
    async fn delete(&self, id: i32) -> Result<bool, sqlx::Error>;
}

#[derive(Clone)]
pub struct PostRepository {
    db: PgPool,
}

impl PostRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PostStore for PostRepository {
    async fn create(&self, post: NewPost) -> Result<Post, sqlx::Error> {
        sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (title, content, excerpt, slug, is_published, author_id, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, title, content, excerpt, slug, is_published, author_id,
                      created_at, updated_at, published_at
            "#,
        )
        .bind(post.title)
        .bind(post.content)
        .bind(post.excerpt)
        .bind(post.slug)
        .bind(post.is_published)
        .bind(post.author_id)
        .bind(post.published_at)
        .fetch_one(&self.db)
        .await
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Post>, sqlx::Error> {
        sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, content, excerpt, slug, is_published, author_id,
                   created_at, updated_at, published_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
    }

    async fn find_with_author(&self, id: i32) -> Result<Option<PostWithAuthor>, sqlx::Error> {
        let row = sqlx::query_as::<_, PostWithAuthorRow>(
            r#"
            SELECT p.id, p.title, p.content, p.excerpt, p.slug, p.is_published, p.author_id,
                   p.created_at, p.updated_at, p.published_at,
                   u.name AS author_name, u.email AS author_email
            FROM posts p
            LEFT JOIN users u ON u.id = p.author_id
            WHERE p.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list(
        &self,
        published_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostWithAuthor>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PostWithAuthorRow>(
            r#"
            SELECT p.id, p.title, p.content, p.excerpt, p.slug, p.is_published, p.author_id,
                   p.created_at, p.updated_at, p.published_at,
                   u.name AS author_name, u.email AS author_email
            FROM posts p
            LEFT JOIN users u ON u.id = p.author_id
            WHERE (NOT $1) OR p.is_published
            ORDER BY p.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(published_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self, published_only: bool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM posts WHERE (NOT $1) OR is_published
            "#,
        )
        .bind(published_only)
        .fetch_one(&self.db)
        .await
    }

    async fn list_by_author(
        &self,
        author_id: i32,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, sqlx::Error> {
        sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, content, excerpt, slug, is_published, author_id,
                   created_at, updated_at, published_at
            FROM posts
            WHERE author_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(author_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
    }

    async fn count_by_author(&self, author_id: i32) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM posts WHERE author_id = $1
            "#,
        )
        .bind(author_id)
        .fetch_one(&self.db)
        .await
    }

    async fn update(&self, id: i32, changes: PostChanges) -> Result<Option<Post>, sqlx::Error> {
        sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                excerpt = COALESCE($4, excerpt),
                is_published = COALESCE($5, is_published),
                published_at = COALESCE($6, published_at),
                updated_at = now()
            WHERE id = $1
            RETURNING id, title, content, excerpt, slug, is_published, author_id,
                      created_at, updated_at, published_at
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.content)
        .bind(changes.excerpt)
        .bind(changes.is_published)
        .bind(changes.published_at)
        .fetch_optional(&self.db)
        .await
    }

    async fn delete(&self, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
