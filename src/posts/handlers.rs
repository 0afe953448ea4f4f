use axum::{
    extract::State,
    http::{header, HeaderName, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::services::AuthUser,
    error::AppError,
    posts::{
        dto::{
            CreatePostRequest, DeletePostResponse, ListPostsQuery, PageQuery, PostPage,
            UpdatePostRequest,
        },
        repo::{Post, PostWithAuthor},
    },
    state::AppState,
    validation::{PathId, ValidatedJson, ValidatedQuery},
};

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/:id",
            get(get_post).patch(update_post).delete(delete_post),
        )
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me/posts", get(my_posts))
}

#[instrument(skip(state, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidatedJson(payload): ValidatedJson<CreatePostRequest>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<Post>), AppError> {
    let post = state.posts.create_post(user_id, &payload).await?;
    let location = [(header::LOCATION, format!("/api/v1/posts/{}", post.id))];
    Ok((StatusCode::CREATED, location, Json(post)))
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<ListPostsQuery>,
) -> Result<Json<PostPage<PostWithAuthor>>, AppError> {
    let page = state
        .posts
        .list_posts(query.page, query.limit, query.published_only)
        .await?;
    Ok(Json(page))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    PathId(id): PathId,
) -> Result<Json<PostWithAuthor>, AppError> {
    let post = state.posts.get_post(id).await?;
    Ok(Json(post))
}

#[instrument(skip(state, payload))]
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathId(id): PathId,
    ValidatedJson(payload): ValidatedJson<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let post = state.posts.update_post(id, &payload, Some(user_id)).await?;
    Ok(Json(post))
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathId(id): PathId,
) -> Result<Json<DeletePostResponse>, AppError> {
    state.posts.delete_post(id, Some(user_id)).await?;
    Ok(Json(DeletePostResponse { success: true }))
}

#[instrument(skip(state))]
pub async fn my_posts(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidatedQuery(query): ValidatedQuery<PageQuery>,
) -> Result<Json<PostPage<Post>>, AppError> {
    let page = state
        .posts
        .user_posts(user_id, query.page, query.limit)
        .await?;
    Ok(Json(page))
}
