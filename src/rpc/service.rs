use super::proto;
use super::proto::account_service_server::AccountService;
use super::status::status_from_error;
use crate::application_port::*;
use crate::domain_model::*;
use std::sync::Arc;
use tonic::{Request, Response, Status};

impl From<AccountView> for proto::Account {
    fn from(view: AccountView) -> Self {
        proto::Account {
            id: view.id.0,
            username: view.username,
            email: view.email,
            created_at_ms: view.created_at.timestamp_millis(),
            updated_at_ms: view.updated_at.timestamp_millis(),
            is_active: view.is_active,
        }
    }
}

/// Implements `AccountService` by delegating to a [`CredentialService`].
pub struct AccountRpcService {
    credential_service: Arc<dyn CredentialService>,
}

impl AccountRpcService {
    pub fn new(credential_service: Arc<dyn CredentialService>) -> Self {
        Self { credential_service }
    }
}

#[tonic::async_trait]
impl AccountService for AccountRpcService {
    async fn create_account(
        &self,
        request: Request<proto::CreateAccountRequest>,
    ) -> Result<Response<proto::CreateAccountResponse>, Status> {
        let body = request.into_inner();
        let account = self
            .credential_service
            .create_account(CreateAccountInput {
                username: body.username,
                password: body.password,
                email: body.email,
            })
            .await
            .map_err(status_from_error)?;

        Ok(Response::new(proto::CreateAccountResponse {
            account: Some(account.into_view().into()),
        }))
    }

    async fn authenticate(
        &self,
        request: Request<proto::AuthenticateRequest>,
    ) -> Result<Response<proto::AuthenticateResponse>, Status> {
        let body = request.into_inner();
        let account = self
            .credential_service
            .authenticate(AuthenticateInput {
                username: body.username,
                password: body.password,
            })
            .await
            .map_err(status_from_error)?;

        Ok(Response::new(proto::AuthenticateResponse {
            account: Some(account.into_view().into()),
        }))
    }

    async fn get_account(
        &self,
        request: Request<proto::GetAccountRequest>,
    ) -> Result<Response<proto::GetAccountResponse>, Status> {
        let id = AccountId(request.into_inner().id);
        let view = self
            .credential_service
            .get_account(id)
            .await
            .map_err(status_from_error)?;

        Ok(Response::new(proto::GetAccountResponse {
            account: Some(view.into()),
        }))
    }
}
