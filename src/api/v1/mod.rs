mod error;
mod gateway;
mod handler;
mod router;

pub use error::*;
pub use gateway::Gateway;
pub use handler::{AccountBody, ApiResponse};
pub use router::routes;
