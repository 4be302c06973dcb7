use salvo::http::header::{HeaderName, HeaderValue};
use salvo::prelude::*;
use serde_json::{Map, Value};

use crate::core::{executor, matcher};
use crate::error::GatewayError;
use crate::models::{Method, RouteResponse};
use crate::state::AppState;

/// The per-request state machine: read body → authenticate → match → bind
/// parameters → execute → marshal. Every route in the table funnels through
/// here; the table, not the HTTP framework, decides what a path means.
#[handler]
pub async fn dispatch(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), GatewayError> {
    let state = depot
        .obtain::<AppState>()
        .map_err(|_| GatewayError::ServerConfiguration("application state missing".to_string()))?
        .clone();

    // Accumulated collaborator headers go on whatever leaves this handler,
    // error and short-circuit responses included.
    for contributor in state.header_contributors.iter() {
        for (name, value) in contributor.headers(req).await {
            if let (Ok(name), Ok(value)) =
                (name.parse::<HeaderName>(), HeaderValue::from_str(&value))
            {
                res.headers_mut().insert(name, value);
            }
        }
    }

    // Collaborator pre-filters (CORS preflight, static files) may answer
    // the request before any gateway processing happens.
    for filter in state.pre_filters.iter() {
        if let Some(resp) = filter.filter(req).await {
            write_response(res, resp);
            return Ok(());
        }
    }

    let method = Method::from_http(req.method()).ok_or(GatewayError::NotFound)?;
    let path = req.uri().path().to_string();

    let body = req
        .payload_with_max_size(state.config.body_limit)
        .await
        .map_err(|e| GatewayError::BadRequest(format!("unreadable body: {}", e)))?
        .to_vec();
    let body_obj = parse_body(&body)?;

    if state.config.hmac_enabled && !from_loopback(req) {
        verify_signature(req, &state, method.as_str(), &path, &body)?;
    }

    let (route, vars) = matcher::match_route(&state.routes, method, &path)
        .ok_or(GatewayError::NotFound)?;
    tracing::debug!(method = method.as_str(), %path, "route matched");

    // Path variables first, body fields overlay them on conflict.
    let mut bag = Map::new();
    for (name, value) in vars {
        bag.insert(name, Value::String(value));
    }
    for (name, value) in body_obj {
        bag.insert(name, value);
    }

    let ctx = state.request_context();
    let resp = match tokio::time::timeout(
        state.config.action_timeout,
        executor::execute_action(&route.action, &bag, &ctx),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => return Err(GatewayError::Timeout),
    };

    if resp.status.is_success() {
        for hook in state.post_hooks.iter() {
            hook.on_success(route, &resp).await;
        }
    }

    write_response(res, resp);
    Ok(())
}

/// The body must be a single JSON object; an empty body counts as `{}`.
fn parse_body(body: &[u8]) -> Result<Map<String, Value>, GatewayError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(GatewayError::BadRequest(
            "request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(GatewayError::BadRequest(format!("malformed JSON body: {}", e))),
    }
}

/// Requests from the loopback interface are trusted without a signature.
fn from_loopback(req: &Request) -> bool {
    let addr = req.remote_addr();
    if let Some(v4) = addr.as_ipv4() {
        return v4.ip().is_loopback();
    }
    if let Some(v6) = addr.as_ipv6() {
        return v6.ip().is_loopback();
    }
    false
}

fn verify_signature(
    req: &Request,
    state: &AppState,
    method: &str,
    path: &str,
    body: &[u8],
) -> Result<(), GatewayError> {
    let signature = req
        .header::<String>("x-request-signature")
        .ok_or(GatewayError::Unauthorized)?;
    let public_key = req
        .header::<String>("x-public-key")
        .ok_or(GatewayError::Unauthorized)?;
    if state.keystore.verify(&public_key, method, path, body, &signature) {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized)
    }
}

fn write_response(res: &mut Response, resp: RouteResponse) {
    res.status_code(resp.status);
    for (name, value) in &resp.headers {
        if let (Ok(name), Ok(value)) =
            (name.parse::<HeaderName>(), HeaderValue::from_str(value))
        {
            res.headers_mut().insert(name, value);
        }
    }
    res.render(Json(resp.body));
}
