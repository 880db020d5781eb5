// ERP Core - Web Server
// REST API over the unified entity gateway

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use erp_core::{
    identifier_report, logging, schema, AddressInput, AddressPatch, ApiResponse,
    BusinessIdentifiers, ClientInput, ClientPatch, Config, ContactInput, ContactPatch,
    EdgeFunctions, EntityType, ErrorCategory, Mutation, ScopeKey, ServiceError, ServiceResult,
    SqliteStore, SupplierInput, SupplierPatch, Table, UnifiedEntityGateway, VERSION,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

type Gateway = UnifiedEntityGateway<SqliteStore>;

/// Shared application state
#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
}

/// The gateway talks to SQLite synchronously, so calls go to the blocking
/// pool instead of stalling a runtime worker
async fn blocking<T, F>(state: &AppState, call: F) -> ServiceResult<T>
where
    F: FnOnce(&Gateway) -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    let gateway = Arc::clone(&state.gateway);
    tokio::task::spawn_blocking(move || call(&gateway))
        .await
        .map_err(|err| ServiceError::server(format!("Gateway task failed: {}", err)))?
}

// ============================================================================
// Response helpers
// ============================================================================

fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::Authentication => StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => StatusCode::FORBIDDEN,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Network => StatusCode::BAD_GATEWAY,
        ErrorCategory::Database
        | ErrorCategory::Server
        | ErrorCategory::Storage
        | ErrorCategory::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: ServiceError) -> Response {
    let status = status_for(err.category);
    (status, Json(ApiResponse::<Value>::from(err))).into_response()
}

fn reply<T: Serialize>(result: ServiceResult<T>, message: &str) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data, message))).into_response(),
        Err(err) => failure(err),
    }
}

/// Applied -> `success` status, Rejected -> 422 with per-field details
fn settle<T: Serialize>(result: ServiceResult<Mutation<T>>, success: StatusCode, message: &str) -> Response {
    match result {
        Ok(Mutation::Applied(data)) => (success, Json(ApiResponse::ok(data, message))).into_response(),
        Ok(Mutation::Rejected(errors)) => failure(
            ServiceError::validation("Validation failed").with_details(schema::to_details(&errors)),
        ),
        Err(err) => failure(err),
    }
}

fn scope_from(entity_type: &str, entity_id: String) -> ServiceResult<ScopeKey> {
    let entity_type: EntityType = entity_type.parse()?;
    Ok(ScopeKey::new(entity_type, entity_id))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(json!({ "status": "ok", "version": VERSION }), "OK"))
}

/// GET /api/entities/:entity_type/:entity_id/contacts
async fn list_contacts(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Response {
    let result = blocking(&state, move |gateway| {
        let ty = entity_type.parse::<EntityType>()?;
        gateway.list_contacts(ty, Some(entity_id.as_str()))
    })
    .await;
    reply(result, "Contacts loaded")
}

/// POST /api/entities/:entity_type/:entity_id/contacts
async fn create_contact(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Json(input): Json<ContactInput>,
) -> Response {
    let result = blocking(&state, move |gateway| {
        gateway.create_contact(&scope_from(&entity_type, entity_id)?, &input)
    })
    .await;
    settle(result, StatusCode::CREATED, "Contact created")
}

/// PUT /api/contacts/:id
async fn update_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ContactPatch>,
) -> Response {
    let result = blocking(&state, move |gateway| gateway.update_contact(&id, &patch)).await;
    settle(result, StatusCode::OK, "Contact updated")
}

/// DELETE /api/contacts/:id
async fn delete_contact(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = blocking(&state, move |gateway| gateway.delete_contact(&id)).await;
    settle(result, StatusCode::OK, "Contact deleted")
}

/// GET /api/entities/:entity_type/:entity_id/addresses
async fn list_addresses(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Response {
    let result = blocking(&state, move |gateway| {
        let ty = entity_type.parse::<EntityType>()?;
        gateway.list_addresses(ty, Some(entity_id.as_str()))
    })
    .await;
    reply(result, "Addresses loaded")
}

/// POST /api/entities/:entity_type/:entity_id/addresses
async fn create_address(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Json(input): Json<AddressInput>,
) -> Response {
    let result = blocking(&state, move |gateway| {
        gateway.create_address(&scope_from(&entity_type, entity_id)?, &input)
    })
    .await;
    settle(result, StatusCode::CREATED, "Address created")
}

/// PUT /api/addresses/:id
async fn update_address(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<AddressPatch>,
) -> Response {
    let result = blocking(&state, move |gateway| gateway.update_address(&id, &patch)).await;
    settle(result, StatusCode::OK, "Address updated")
}

/// DELETE /api/addresses/:id
async fn delete_address(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = blocking(&state, move |gateway| gateway.delete_address(&id)).await;
    settle(result, StatusCode::OK, "Address deleted")
}

/// GET /api/clients
async fn list_clients(State(state): State<AppState>) -> Response {
    let result = blocking(&state, |gateway| gateway.list_clients()).await;
    reply(result, "Clients loaded")
}

/// POST /api/clients
async fn create_client(State(state): State<AppState>, Json(input): Json<ClientInput>) -> Response {
    let result = blocking(&state, move |gateway| gateway.create_client(&input)).await;
    settle(result, StatusCode::CREATED, "Client created")
}

/// PUT /api/clients/:id
async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ClientPatch>,
) -> Response {
    let result = blocking(&state, move |gateway| gateway.update_client(&id, &patch)).await;
    settle(result, StatusCode::OK, "Client updated")
}

/// DELETE /api/clients/:id - also removes the client's contacts and addresses
async fn delete_client(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = blocking(&state, move |gateway| gateway.delete_client(&id)).await;
    settle(result, StatusCode::OK, "Client deleted")
}

/// GET /api/suppliers
async fn list_suppliers(State(state): State<AppState>) -> Response {
    let result = blocking(&state, |gateway| gateway.list_suppliers()).await;
    reply(result, "Suppliers loaded")
}

/// POST /api/suppliers
async fn create_supplier(
    State(state): State<AppState>,
    Json(input): Json<SupplierInput>,
) -> Response {
    let result = blocking(&state, move |gateway| gateway.create_supplier(&input)).await;
    settle(result, StatusCode::CREATED, "Supplier created")
}

/// PUT /api/suppliers/:id
async fn update_supplier(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<SupplierPatch>,
) -> Response {
    let result = blocking(&state, move |gateway| gateway.update_supplier(&id, &patch)).await;
    settle(result, StatusCode::OK, "Supplier updated")
}

/// DELETE /api/suppliers/:id
async fn delete_supplier(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = blocking(&state, move |gateway| gateway.delete_supplier(&id)).await;
    settle(result, StatusCode::OK, "Supplier deleted")
}

/// POST /api/identifiers/validate - ABN/ACN check without writing anything
async fn validate_identifiers(Json(ids): Json<BusinessIdentifiers>) -> Response {
    reply(Ok(identifier_report(&ids)), "Identifiers checked")
}

/// POST /api/functions/:name - named backend function, e.g. get-schema
async fn invoke_function(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let body = body.map(|Json(value)| value).unwrap_or(Value::Null);
    let result = blocking(&state, move |gateway| gateway.store().invoke(&name, &body)).await;
    reply(result, "Function invoked")
}

/// GET /api/events/:table/:id - audit trail of one row
async fn get_events(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> Response {
    let result = blocking(&state, move |gateway| {
        gateway.store().events_for(table.parse::<Table>()?, &id)
    })
    .await;
    reply(result, "Events loaded")
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route(
            "/entities/:entity_type/:entity_id/contacts",
            get(list_contacts).post(create_contact),
        )
        .route("/contacts/:id", put(update_contact).delete(delete_contact))
        .route(
            "/entities/:entity_type/:entity_id/addresses",
            get(list_addresses).post(create_address),
        )
        .route("/addresses/:id", put(update_address).delete(delete_address))
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/:id", put(update_client).delete(delete_client))
        .route("/suppliers", get(list_suppliers).post(create_supplier))
        .route("/suppliers/:id", put(update_supplier).delete(delete_supplier))
        .route("/identifiers/validate", post(validate_identifiers))
        .route("/functions/:name", post(invoke_function))
        .route("/events/:table/:id", get(get_events))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init(&config.log_level);

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?
        .with_actor("erp-server");
    tracing::info!(path = %config.database_path.display(), "database opened");

    let gateway = UnifiedEntityGateway::new(store).with_cache_config(config.cache());
    let state = AppState {
        gateway: Arc::new(gateway),
    };

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(version = VERSION, %addr, "server running");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
