use axum::{extract::Request, middleware::Next, response::Response};

use crate::context::{RequesterContext, RequesterRole};

/// Header the upstream gateway uses to forward the requester's role.
pub const ROLE_HEADER: &str = "x-user-role";

/// Attach a [`RequesterContext`] to every request. A missing header yields
/// the viewer role; handlers decide what viewers may do.
pub async fn requester_middleware(mut req: Request, next: Next) -> Response {
    let role = req
        .headers()
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(RequesterRole::parse)
        .unwrap_or(RequesterRole::Viewer);

    req.extensions_mut().insert(RequesterContext::new(role));

    next.run(req).await
}
