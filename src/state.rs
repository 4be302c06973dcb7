use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;
use crate::core::mesh::Mesh;
use crate::core::parser;
use crate::middleware::auth::HmacKeystore;
use crate::middleware::{HeaderContributor, PostSuccessHook, PreFilter};
use crate::models::Route;

/// Shared state: the routing table and mesh are built once at startup and
/// never mutated afterwards.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub routes: Arc<Vec<Route>>,
    pub mesh: Arc<Mesh>,
    pub keystore: Arc<HmacKeystore>,
    pub config: Arc<Config>,
    pub pre_filters: Arc<Vec<Box<dyn PreFilter>>>,
    pub post_hooks: Arc<Vec<Box<dyn PostSuccessHook>>>,
    pub header_contributors: Arc<Vec<Box<dyn HeaderContributor>>>,
}

impl AppState {
    /// Load the routing table and pipeline mesh, then connect the pool. The
    /// pool is lazy, so the gateway boots while the database is still coming
    /// up; SQL routes answer `DbError` until it is reachable.
    pub fn new(config: &Config) -> Result<Self> {
        let text = std::fs::read_to_string(&config.routes_file)
            .with_context(|| format!("reading routes file {:?}", config.routes_file))?;
        let routes = parser::parse_routes(&text)
            .with_context(|| format!("loading routes file {:?}", config.routes_file))?;
        tracing::info!(routes = routes.len(), "routing table loaded");

        let mesh = Mesh::load(config.pipelines_dir.as_deref())?;
        if !mesh.is_empty() {
            tracing::info!(pipelines = mesh.len(), "pipeline mesh loaded");
        }

        Self::assemble(config.clone(), routes, mesh)
    }

    /// Wire a state from already-built pieces; `new` and the integration
    /// tests both go through here.
    pub fn assemble(config: Config, routes: Vec<Route>, mesh: Mesh) -> Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(config.db_pool_size)
            .connect_lazy(&config.database_url)
            .context("invalid DATABASE_URL")?;
        let keystore = HmacKeystore::new(config.hmac_keys.clone());

        Ok(AppState {
            db_pool,
            routes: Arc::new(routes),
            mesh: Arc::new(mesh),
            keystore: Arc::new(keystore),
            config: Arc::new(config),
            pre_filters: Arc::new(Vec::new()),
            post_hooks: Arc::new(Vec::new()),
            header_contributors: Arc::new(Vec::new()),
        })
    }

    pub fn request_context(&self) -> RequestContext<'_> {
        RequestContext {
            pool: &self.db_pool,
            mesh: &self.mesh,
            config: &self.config,
        }
    }
}

/// Per-request view over the shared state, passed explicitly to the executor
/// rather than reached through ambient globals.
pub struct RequestContext<'a> {
    pub pool: &'a PgPool,
    pub mesh: &'a Mesh,
    pub config: &'a Config,
}
