use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use axum::{
    extract::{ConnectInfo, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::protocol::{PATH_ADD, PATH_LIST, PATH_REMOVE, PATH_ROOT, PATH_UPDATE};
use shared::types::{
    ListRequest, Registered, RegistrationRequest, RemovalRequest, Removed, ServerList,
    UpdateRequest,
};
use crate::api::error::ApiError;
use crate::api::extract::FormOrJson;
use crate::api::rate_limit::{limit_by_address, RateLimiter};
use crate::config::AuthConfig;
use crate::registry::entry::Entry;
use crate::registry_manager::RegistryHandle;

#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryHandle,
    pub auth: Arc<AuthConfig>,
    pub trust_address_override: bool,
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

/// Any request body together with the shared secret
#[derive(Deserialize)]
pub struct Keyed<T> {
    #[serde(rename = "serverKey", default)]
    pub key: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Deserialize)]
pub struct AddServerBody {
    /// Only honoured when the address override is trusted
    #[serde(rename = "serverAddress", default)]
    pub address: Option<String>,
    #[serde(flatten)]
    pub request: RegistrationRequest,
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(PATH_ROOT, get(list_servers))
        .route(PATH_LIST, get(list_servers).post(list_servers))
        .route(PATH_ADD, post(add_server))
        .route(PATH_UPDATE, post(update_server))
        .route(PATH_REMOVE, post(remove_server));

    if let Some(limiter) = state.rate_limiter.clone() {
        router = router.layer(middleware::from_fn_with_state(limiter, limit_by_address));
    }

    router.with_state(state)
}

impl AppState {
    fn check_key(&self, key: Option<&str>, origin: IpAddr, path: &str) -> Result<(), ApiError> {
        if key != Some(self.auth.communication_key.as_str()) {
            tracing::warn!("Request to {} from {} denied: bad server key", path, origin);
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }

    /// Gate for the mutating routes
    fn check_access(&self, key: Option<&str>, origin: IpAddr, path: &str) -> Result<(), ApiError> {
        self.check_key(key, origin, path)?;
        if self.auth.use_access_control && !self.auth.allowed_addresses.contains(&origin) {
            tracing::warn!("Request to {} from {} denied: not in allowed addresses", path, origin);
            return Err(ApiError::AccessDenied(origin));
        }
        Ok(())
    }
}

/// IPv4 peers on a dual-stack socket show up as IPv4-mapped IPv6 addresses
fn origin_of(peer: SocketAddr) -> IpAddr {
    peer.ip().to_canonical()
}

fn registered(entry: Entry) -> Json<Registered> {
    Json(Registered {
        server_uuid: entry.id.to_string(),
        expires_at: entry.expires_at,
    })
}

async fn list_servers(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    FormOrJson(keyed): FormOrJson<Keyed<ListRequest>>,
) -> Result<Json<ServerList>, ApiError> {
    let origin = origin_of(peer);
    state.check_key(keyed.key.as_deref(), origin, PATH_LIST)?;

    let list = state.registry.list(keyed.body, origin).await?;
    Ok(Json(list))
}

async fn add_server(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    FormOrJson(keyed): FormOrJson<Keyed<AddServerBody>>,
) -> Result<Json<Registered>, ApiError> {
    let mut origin = origin_of(peer);
    state.check_access(keyed.key.as_deref(), origin, PATH_ADD)?;

    let AddServerBody { address, request } = keyed.body;
    if state.trust_address_override {
        if let Some(raw) = address.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let overridden: IpAddr = raw
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("server address '{}' is not an IP address", raw)))?;
            tracing::debug!("Using address override {} for request from {}", overridden, origin);
            origin = overridden.to_canonical();
        }
    }

    let entry = state.registry.register(request, origin).await?;
    Ok(registered(entry))
}

async fn update_server(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    FormOrJson(keyed): FormOrJson<Keyed<UpdateRequest>>,
) -> Result<Json<Registered>, ApiError> {
    let origin = origin_of(peer);
    state.check_access(keyed.key.as_deref(), origin, PATH_UPDATE)?;

    let entry = state.registry.update(keyed.body, origin).await?;
    Ok(registered(entry))
}

async fn remove_server(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    FormOrJson(keyed): FormOrJson<Keyed<RemovalRequest>>,
) -> Result<Json<Removed>, ApiError> {
    let origin = origin_of(peer);
    state.check_access(keyed.key.as_deref(), origin, PATH_REMOVE)?;

    state.registry.remove(keyed.body, origin).await?;
    Ok(Json(Removed { removed: true }))
}
