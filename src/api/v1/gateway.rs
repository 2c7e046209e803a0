use crate::rpc::proto::account_service_client::AccountServiceClient;
use std::net::SocketAddr;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// Loopback gRPC client used by every HTTP handler.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: AccountServiceClient<Channel>,
    request_timeout: Duration,
}

impl Gateway {
    /// Does not dial. The channel connects on first use and reconnects on
    /// its own after failures.
    pub fn connect_lazy(
        rpc_addr: SocketAddr,
        request_timeout: Duration,
    ) -> Result<Self, tonic::transport::Error> {
        let rpc_addr = loopback(rpc_addr);
        let channel = Endpoint::from_shared(format!("http://{rpc_addr}"))?
            .timeout(request_timeout)
            .connect_lazy();
        Ok(Self {
            client: AccountServiceClient::new(channel),
            request_timeout,
        })
    }

    pub fn client(&self) -> AccountServiceClient<Channel> {
        self.client.clone()
    }

    /// Wraps `message` with the gateway deadline as its `grpc-timeout`.
    pub fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.request_timeout);
        request
    }
}

// A listener bound to 0.0.0.0 or [::] is reached through the loopback address
// of the same family.
fn loopback(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
            SocketAddr::from(([127, 0, 0, 1], v4.port()))
        }
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
            SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, v6.port()))
        }
        other => other,
    }
}
