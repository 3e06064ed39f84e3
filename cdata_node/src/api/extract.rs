//! Extractors whose rejections use the API error body

use axum::extract::{FromRequest, FromRequestParts};

use crate::api::ApiError;

/// `Json<T>` with malformed or mistyped bodies reported as 400 [`ApiError`]s
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query<T>` with the same rejection handling as [`ApiJson`]
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
