#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use warden::application_impl::*;
use warden::application_port::*;
use warden::domain_port::AccountRepo;
use warden::infra_memory::FakeAccountRepo;
use warden::rpc::AccountRpcService;
use warden::rpc::proto::account_service_server::AccountServiceServer;
use warden::server::Server;

pub fn cheap_hasher() -> Arc<dyn CredentialHasher> {
    Arc::new(
        Argon2PasswordHasher::new(HasherConfig {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        })
        .expect("valid argon2 params"),
    )
}

pub fn service_over(repo: Arc<dyn AccountRepo>) -> Arc<dyn CredentialService> {
    Arc::new(RealCredentialService::new(
        repo,
        cheap_hasher(),
        CredentialServiceConfig {
            request_timeout: Duration::from_secs(5),
        },
    ))
}

pub fn fake_service() -> (Arc<FakeAccountRepo>, Arc<dyn CredentialService>) {
    let repo = Arc::new(FakeAccountRepo::new());
    let service = service_over(repo.clone());
    (repo, service)
}

pub fn fake_server() -> (Arc<FakeAccountRepo>, Arc<Server>) {
    let (repo, service) = fake_service();
    let server = Arc::new(Server::from_parts(repo.clone(), service));
    (repo, server)
}

pub fn create_input(username: &str, password: &str, email: &str) -> CreateAccountInput {
    CreateAccountInput {
        username: username.to_string(),
        password: password.to_string(),
        email: email.to_string(),
    }
}

pub fn auth_input(username: &str, password: &str) -> AuthenticateInput {
    AuthenticateInput {
        username: username.to_string(),
        password: password.to_string(),
    }
}

/// Serves the account service alone on an ephemeral loopback port.
pub async fn spawn_rpc(service: Arc<dyn CredentialService>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(AccountServiceServer::new(AccountRpcService::new(service)))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    addr
}
