mod http_listener;
mod lifecycle;
mod server;

pub use lifecycle::*;
pub use server::*;
