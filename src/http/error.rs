//! RFC 7807 problem responses and extractors that produce them.

use crate::error::GastownError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error crossing the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub GastownError);

impl From<GastownError> for ApiError {
    fn from(err: GastownError) -> Self {
        Self(err)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: String,
    title: String,
    status: u16,
    detail: String,
    code: &'static str,
}

impl ProblemDetails {
    #[must_use]
    pub fn from_error(err: &GastownError) -> Self {
        let status = status_of(err);
        Self {
            problem_type: "about:blank".to_string(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            status: status.as_u16(),
            detail: err.to_string(),
            code: err.code(),
        }
    }
}

fn status_of(err: &GastownError) -> StatusCode {
    StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        let mut response = (status, Json(ProblemDetails::from_error(&self.0))).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

/// JSON body whose parse failures render as 400 problems.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| {
                ApiError(GastownError::Validation(rejection.body_text()))
            })?;
        Ok(Self(value))
    }
}

/// Query string whose parse failures render as 400 problems.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| {
                ApiError(GastownError::Validation(rejection.body_text()))
            })?;
        Ok(Self(value))
    }
}

/// Parses a closed-enumeration query or body value.
///
/// # Errors
/// `Validation` naming the accepted values.
pub fn parse_enum<T>(value: &str) -> Result<T, GastownError>
where
    T: for<'a> TryFrom<&'a str, Error = String>,
{
    T::try_from(value).map_err(GastownError::Validation)
}

pub fn parse_optional<T>(value: Option<&str>) -> Result<Option<T>, GastownError>
where
    T: for<'a> TryFrom<&'a str, Error = String>,
{
    value.map(parse_enum::<T>).transpose()
}
