use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::{AppError, FieldError};

/// JSON body extractor that runs the declared field rules after
/// deserialization. Handlers behind it only ever see in-bounds values.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            AppError::Validation(vec![FieldError {
                field: "body".into(),
                message: e.body_text(),
            }])
        })?;
        value
            .validate()
            .map_err(|e| AppError::Validation(field_errors(&e)))?;
        Ok(Self(value))
    }
}

/// Query-string counterpart of [`ValidatedJson`].
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                AppError::Validation(vec![FieldError {
                    field: "query".into(),
                    message: e.body_text(),
                }])
            })?;
        value
            .validate()
            .map_err(|e| AppError::Validation(field_errors(&e)))?;
        Ok(Self(value))
    }
}

/// Path extractor for `:id` segments. Anything that is not a positive
/// integer is rejected here, before a handler runs.
pub struct PathId(pub i32);

#[async_trait]
impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| id_error("ID must be a number"))?;
        parse_id(&raw).map(Self)
    }
}

pub(crate) fn parse_id(raw: &str) -> Result<i32, AppError> {
    let id: i32 = raw.parse().map_err(|_| id_error("ID must be a number"))?;
    if id <= 0 {
        return Err(id_error("ID must be positive"));
    }
    Ok(id)
}

fn id_error(message: &str) -> AppError {
    AppError::Validation(vec![FieldError {
        field: "id".into(),
        message: message.into(),
    }])
}

fn field_errors(errors: &validator::ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    for (field, errs) in errors.field_errors() {
        for err in errs {
            let message = err
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("{field} is invalid"));
            out.push(FieldError {
                field: field.to_string(),
                message,
            });
        }
    }
    out
}
