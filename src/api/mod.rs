pub mod dispatch;

use salvo::prelude::*;

use crate::middleware::{self, inject_state};
use crate::state::AppState;

/// One catch-all router: every path funnels into the dispatcher, which
/// resolves it against the routing table loaded from the routes file.
pub fn router(state: AppState) -> Router {
    Router::new()
        .hoop(middleware::server_header)
        .hoop(inject_state(state))
        .push(Router::with_path("{**path}").goal(dispatch::dispatch))
}
