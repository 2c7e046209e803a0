mod credential_hasher_argon2;
mod credential_service_impl;

pub use credential_hasher_argon2::*;
pub use credential_service_impl::*;
