//! gRPC surface: generated `warden.account.v1` types and the service adapter
//! that forwards every call to the credential service.

pub mod proto {
    tonic::include_proto!("warden.account.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("account_descriptor");
}

mod service;
mod status;

pub use service::*;
pub use status::*;
