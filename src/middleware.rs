use async_trait::async_trait;
use salvo::http::header::{HeaderValue, SERVER};
use salvo::prelude::*;

use crate::models::{Route, RouteResponse};
use crate::state::AppState;

pub mod auth;

pub struct StateInjector {
    state: AppState,
}

impl StateInjector {
    pub fn new(state: AppState) -> Self {
        StateInjector { state }
    }
}

#[async_trait]
impl Handler for StateInjector {
    async fn handle(
        &self,
        _req: &mut Request,
        depot: &mut Depot,
        _res: &mut Response,
        _ctrl: &mut FlowCtrl,
    ) {
        depot.inject(self.state.clone());
    }
}

pub fn inject_state(state: AppState) -> StateInjector {
    StateInjector::new(state)
}

/// Stamp `Server: mesa-gateway/<version>` on every response.
#[handler]
pub async fn server_header(res: &mut Response) {
    res.headers_mut().insert(
        SERVER,
        HeaderValue::from_static(concat!("mesa-gateway/", env!("CARGO_PKG_VERSION"))),
    );
}

/// Collaborator hook run before authentication. Returning a response
/// short-circuits the request (CORS preflight, static file serving).
#[async_trait]
pub trait PreFilter: Send + Sync {
    async fn filter(&self, req: &mut Request) -> Option<RouteResponse>;
}

/// Collaborator hook observing each successful action, e.g. to publish AMQP
/// notifications. Failures of the hook never affect the response.
#[async_trait]
pub trait PostSuccessHook: Send + Sync {
    async fn on_success(&self, route: &Route, response: &RouteResponse);
}

/// Collaborator hook contributing response headers (e.g. CORS). The
/// accumulated headers go on every response, error responses included.
#[async_trait]
pub trait HeaderContributor: Send + Sync {
    async fn headers(&self, req: &Request) -> Vec<(String, String)>;
}
