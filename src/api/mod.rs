pub mod v1;

pub use v1::{Gateway, recover_error};

use serde::Serialize;
use warp::Filter;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// All HTTP routes: `/health` plus the `/v1` gateway.
pub fn routes(
    gateway: Gateway,
) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    // Answers without touching the gateway or the store.
    let health = warp::get()
        .and(warp::path("health"))
        .and(warp::path::end())
        .map(|| warp::reply::json(&HealthResponse { status: "ok" }));

    let api_v1 = warp::path("v1").and(v1::routes(gateway));

    health
        .or(api_v1)
        .recover(recover_error)
        .with(warp::trace::request())
}
