//! stockroom-api library - multi-tenant inventory backend
//!
//! Each organization owns a database namespace. Requests are authenticated
//! with a signed token, bound to the caller's namespace, then (for catalog
//! and stock routes) to a store inside it.

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{delete, get, patch},
    Router,
};
use sqlx::PgPool;
use stockroom_common::config::AppConfig;
use stockroom_common::db::{MigrationRegistry, TenantMigrator};
use stockroom_common::time::SharedClock;
use stockroom_common::{Error, Result};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod validation;

use services::{
    BlobStore, DisabledIdentityProvider, FsBlobStore, GoogleClient, IdentityProvider, LabelEngine, PdfLabelRenderer,
    RegenerateLabels, StockLedger, TenantLifecycle, REGENERATE_LABELS_MIGRATION,
};

/// Application state shared across HTTP handlers and the worker
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub clock: SharedClock,
    pub identity: Arc<dyn IdentityProvider>,
    pub ledger: Arc<StockLedger>,
    pub labels: Arc<LabelEngine>,
    pub lifecycle: Arc<TenantLifecycle>,
}

impl AppState {
    /// Wire the engines around a pool and its collaborators
    pub fn new(
        db: PgPool,
        config: AppConfig,
        clock: SharedClock,
        identity: Arc<dyn IdentityProvider>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let labels = Arc::new(LabelEngine::new(Arc::new(PdfLabelRenderer), blobs, clock.clone()));
        let migrator = TenantMigrator::new(
            Arc::new(tenant_registry(Arc::clone(&labels))),
            config.per_tenant_migration_path.clone(),
            config.dry_run,
        );
        let lifecycle = Arc::new(TenantLifecycle::new(
            db.clone(),
            Arc::new(migrator),
            clock.clone(),
            config.tryout_ttl(),
        ));

        Self {
            db,
            ledger: Arc::new(StockLedger::new(clock.clone())),
            config: Arc::new(config),
            clock,
            identity,
            labels,
            lifecycle,
        }
    }
}

/// Imperative tenant migrations, keyed like their script siblings
pub fn tenant_registry(labels: Arc<LabelEngine>) -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry.register(REGENERATE_LABELS_MIGRATION, Arc::new(RegenerateLabels::new(labels)));
    registry
}

/// Filesystem blob store from configuration
pub fn blob_store(config: &AppConfig) -> Arc<dyn BlobStore> {
    Arc::new(FsBlobStore::new(
        config.blob_root.clone(),
        config.blob_public_url.clone(),
        &config.blob_signing_key,
    ))
}

/// Google client when credentials are configured
pub fn identity_provider(config: &AppConfig) -> Result<Arc<dyn IdentityProvider>> {
    match &config.google {
        Some(google) => {
            let client =
                GoogleClient::new(google.clone()).map_err(|e| Error::Config(format!("Google client: {}", e)))?;
            Ok(Arc::new(client))
        }
        None => Ok(Arc::new(DisabledIdentityProvider)),
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.stage.is_prod() {
        return CorsLayer::permissive();
    }

    let origin = HeaderValue::from_str(config.frontend_url.trim_end_matches('/'))
        .map(AllowOrigin::exact)
        .unwrap_or_else(|_| AllowOrigin::list(Vec::<HeaderValue>::new()));
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(api::context::STORE_HEADER),
        ])
        .allow_credentials(true)
}

/// Build application router
///
/// Route groups, outermost check first:
/// - public: health, sign-in, try-out status, blobs
/// - identity: token only
/// - tenant: token + active organization pinned to its namespace
/// - store: tenant + `X-Store-ID`
pub fn build_router(state: AppState) -> Router {
    use api::{auth, blobs, catalog, packaging, stock, stores, tryout, users};

    let store_scoped = Router::new()
        .route("/items", get(catalog::list_items).post(catalog::create_item))
        .route(
            "/items/:id",
            get(catalog::get_item).put(catalog::update_item).delete(catalog::delete_item),
        )
        .route(
            "/items/categories",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route(
            "/items/categories/:id",
            get(catalog::get_category)
                .put(catalog::update_category)
                .delete(catalog::delete_category),
        )
        .route("/items/units", get(catalog::list_units).post(catalog::create_unit))
        .route(
            "/items/units/:id",
            get(catalog::get_unit).put(catalog::update_unit).delete(catalog::delete_unit),
        )
        .route("/items/packaging", get(packaging::list).post(packaging::create))
        .route(
            "/items/packaging/:id",
            get(packaging::get).put(packaging::update).delete(packaging::delete),
        )
        .route(
            "/items/packaging/:id/label",
            get(packaging::label_preview).post(packaging::regenerate_label),
        )
        .route("/stock", get(stock::levels))
        .route("/stock/:category_id", get(stock::levels_by_category))
        .route("/stock/in", get(stock::list_stock_in).post(stock::create_stock_in))
        .route(
            "/stock/in/:id",
            get(stock::get_stock_in).put(stock::update_stock_in).delete(stock::delete_stock_in),
        )
        .route("/stock/in/finalize/:id", patch(stock::finalize_stock_in))
        .route("/stock/out", get(stock::list_stock_out).post(stock::create_stock_out))
        .route(
            "/stock/out/:id",
            get(stock::get_stock_out).put(stock::update_stock_out).delete(stock::delete_stock_out),
        )
        .route("/stock/out/finalize/:id", patch(stock::finalize_stock_out))
        .route("/stock/waste", get(stock::list_waste).post(stock::create_waste))
        .route(
            "/stock/waste/:id",
            get(stock::get_waste).put(stock::update_waste).delete(stock::delete_waste),
        )
        .route("/stock/waste/finalize/:id", patch(stock::finalize_waste))
        .route_layer(middleware::from_fn(api::store_middleware));

    let tenant_scoped = Router::new()
        .route("/users/me", get(users::me))
        .route("/stores", get(stores::list).post(stores::create))
        .route(
            "/stores/:id",
            get(stores::get).put(stores::update).delete(stores::delete),
        )
        .merge(store_scoped)
        .route_layer(middleware::from_fn_with_state(state.clone(), api::tenant_middleware));

    let authenticated = Router::new()
        .route("/tryOut/destroyEnv", delete(tryout::destroy_env))
        .merge(tenant_scoped)
        .route_layer(middleware::from_fn_with_state(state.clone(), api::identity_middleware));

    let public = Router::new()
        .route("/auth/google", get(auth::google_login))
        .route("/auth/google/callback", get(auth::google_callback))
        .route("/tryOut/status", get(tryout::status))
        .route("/blobs/*key", get(blobs::download))
        .merge(api::health_routes());

    Router::new()
        .merge(authenticated)
        .merge(public)
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .with_state(state)
}
