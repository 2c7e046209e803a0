use crate::api::v1::handler::ApiResponse;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tonic::{Code, Status};
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let rejection = if let Some(rejection) = err.find::<ApiRejection>() {
        rejection.clone()
    } else if err.is_not_found() {
        ApiRejection::new(ApiErrorCode::NotFound, StatusCode::NOT_FOUND)
    } else if err
        .find::<warp::filters::body::BodyDeserializeError>()
        .is_some()
        || err.find::<reject::InvalidHeader>().is_some()
        || err.find::<reject::UnsupportedMediaType>().is_some()
    {
        ApiRejection::new(ApiErrorCode::InvalidArgument, StatusCode::BAD_REQUEST)
    } else if err.find::<reject::PayloadTooLarge>().is_some() {
        ApiRejection::new(ApiErrorCode::InvalidArgument, StatusCode::PAYLOAD_TOO_LARGE)
    } else if err.find::<reject::LengthRequired>().is_some() {
        ApiRejection::new(ApiErrorCode::InvalidArgument, StatusCode::LENGTH_REQUIRED)
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        ApiRejection::new(ApiErrorCode::NotFound, StatusCode::METHOD_NOT_ALLOWED)
    } else {
        warn!("unhandled rejection: {:?}", err);
        ApiRejection::from(ApiErrorCode::Unavailable)
    };

    let json = warp::reply::json(&ApiResponse::<()>::err(
        rejection.code.clone(),
        rejection.code.to_string(),
    ));
    Ok(warp::reply::with_status(json, rejection.status))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

/// Error kinds as they appear in the JSON body. Messages are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Request is malformed or missing a field")]
    InvalidArgument,
    #[error("Username or email already exists")]
    AlreadyExists,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Account is not active")]
    AccountInactive,
    #[error("Not found")]
    NotFound,
    #[error("Request cancelled")]
    Cancelled,
    #[error("Service unavailable")]
    Unavailable,
}

impl ApiErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ApiErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ApiErrorCode::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiErrorCode::AccountInactive => StatusCode::FORBIDDEN,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::Cancelled => client_closed_request(),
            ApiErrorCode::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// 499, as nginx and grpc-gateway use for a cancelled request.
fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
}

/// Rejection carried through warp's filter chain to [`recover_error`].
#[derive(Debug, Clone)]
pub struct ApiRejection {
    pub code: ApiErrorCode,
    pub status: StatusCode,
}

impl ApiRejection {
    pub fn new(code: ApiErrorCode, status: StatusCode) -> Self {
        Self { code, status }
    }

    pub fn internal<E: std::fmt::Display>(error: E) -> Self {
        warn!("Internal error: {}", error);
        ApiRejection::from(ApiErrorCode::Unavailable)
    }
}

impl reject::Reject for ApiRejection {}

impl From<ApiErrorCode> for ApiRejection {
    fn from(code: ApiErrorCode) -> Self {
        let status = code.status();
        Self { code, status }
    }
}

impl From<Status> for ApiRejection {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::InvalidArgument => ApiErrorCode::InvalidArgument.into(),
            Code::AlreadyExists => ApiErrorCode::AlreadyExists.into(),
            Code::Unauthenticated => ApiErrorCode::InvalidCredentials.into(),
            Code::PermissionDenied => ApiErrorCode::AccountInactive.into(),
            Code::NotFound => ApiErrorCode::NotFound.into(),
            Code::Cancelled => ApiErrorCode::Cancelled.into(),
            Code::DeadlineExceeded => {
                ApiRejection::new(ApiErrorCode::Cancelled, StatusCode::GATEWAY_TIMEOUT)
            }
            Code::Unavailable => {
                warn!(message = status.message(), "rpc endpoint unreachable");
                ApiRejection::new(ApiErrorCode::Unavailable, StatusCode::SERVICE_UNAVAILABLE)
            }
            _ => {
                warn!(code = ?status.code(), message = status.message(), "rpc call failed");
                ApiErrorCode::Unavailable.into()
            }
        }
    }
}
