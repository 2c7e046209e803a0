use super::error::*;
use super::gateway::Gateway;
use crate::rpc::proto;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Account as rendered to HTTP clients.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AccountBody {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

impl TryFrom<proto::Account> for AccountBody {
    type Error = ApiRejection;

    fn try_from(account: proto::Account) -> Result<Self, Self::Error> {
        let created_at = DateTime::from_timestamp_millis(account.created_at_ms)
            .ok_or_else(|| ApiRejection::internal("created_at out of range"))?;
        let updated_at = DateTime::from_timestamp_millis(account.updated_at_ms)
            .ok_or_else(|| ApiRejection::internal("updated_at out of range"))?;

        Ok(AccountBody {
            id: account.id,
            username: account.username,
            email: account.email,
            created_at,
            updated_at,
            is_active: account.is_active,
        })
    }
}

fn account_body(account: Option<proto::Account>) -> Result<AccountBody, warp::Rejection> {
    account
        .ok_or_else(|| ApiRejection::internal("rpc response without account"))
        .and_then(AccountBody::try_from)
        .map_err(reject::custom)
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

pub async fn create_account(
    body: CreateAccountRequest,
    gateway: Gateway,
) -> Result<impl warp::Reply, warp::Rejection> {
    let request = gateway.request(proto::CreateAccountRequest {
        username: body.username,
        password: body.password,
        email: body.email,
    });
    let response = gateway
        .client()
        .create_account(request)
        .await
        .map_err(ApiRejection::from)
        .map_err(reject::custom)?;

    let account = account_body(response.into_inner().account)?;
    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::ok(account)),
        StatusCode::CREATED,
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    body: LoginRequest,
    gateway: Gateway,
) -> Result<impl warp::Reply, warp::Rejection> {
    let request = gateway.request(proto::AuthenticateRequest {
        username: body.username,
        password: body.password,
    });
    let response = gateway
        .client()
        .authenticate(request)
        .await
        .map_err(ApiRejection::from)
        .map_err(reject::custom)?;

    let account = account_body(response.into_inner().account)?;
    Ok(warp::reply::json(&ApiResponse::ok(account)))
}

pub async fn get_account(
    id: i64,
    gateway: Gateway,
) -> Result<impl warp::Reply, warp::Rejection> {
    let request = gateway.request(proto::GetAccountRequest { id });
    let response = gateway
        .client()
        .get_account(request)
        .await
        .map_err(ApiRejection::from)
        .map_err(reject::custom)?;

    let account = account_body(response.into_inner().account)?;
    Ok(warp::reply::json(&ApiResponse::ok(account)))
}
