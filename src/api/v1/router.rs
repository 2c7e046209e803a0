use super::gateway::Gateway;
use super::handler;
use std::convert::Infallible;
use warp::Filter;

const MAX_BODY_BYTES: u64 = 16 * 1024;

pub fn routes(
    gateway: Gateway,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let create_account = warp::post()
        .and(warp::path("accounts"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(gateway.clone()))
        .and_then(handler::create_account);

    let login = warp::post()
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(gateway.clone()))
        .and_then(handler::login);

    let get_account = warp::get()
        .and(warp::path("accounts"))
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(with(gateway))
        .and_then(handler::get_account);

    create_account.or(login).or(get_account)
}

fn with<T>(value: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone
where
    T: Clone + Send + Sync,
{
    warp::any().map(move || value.clone())
}
