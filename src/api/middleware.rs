//! Authentication runs once per request on the private router and stores the
//! resolved [`Identity`] as a request extension. Authorization is a per-route
//! layer carrying the permission code of that route.

use super::state::AppState;
use crate::{error::Error, model::Identity};
use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, VARY},
        HeaderValue,
    },
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::MethodRouter,
    Extension,
};
use std::sync::Arc;

pub async fn authenticate(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    let identity = {
        let header = match request.headers().get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| Error::InvalidToken)?),
            None => None,
        };
        state.resolver.authenticate(header).await?
    };

    request.extensions_mut().insert(identity);

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(VARY, HeaderValue::from_static("Authorization"));

    Ok(response)
}

pub async fn require_permission(
    State(code): State<&'static str>,
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    state.gate.authorize(&identity, code).await?;

    Ok(next.run(request).await)
}

/// Guard `route` with the permission `code`.
pub fn permit(code: &'static str, route: MethodRouter) -> MethodRouter {
    route.route_layer(from_fn_with_state(code, require_permission))
}
