//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services and the store. Every
//! response uses the `{success, data|error}` JSON shape.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;

use crate::api::response::{api_data, api_ok};
use crate::api::tenant::TenantScope;
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{SignageError, SignageResult};
use crate::model::{
    Announcement, AnnouncementPriority, AlertLevel, Client, Location, Plan, Playlist,
    PlaylistItem, PushEnvelope, PushKind, Schedule, Screen, ScreenMode, ScreenStatus, SyncGroup,
    SyncMode, Transition,
};
use crate::services::content_library;
use crate::store::ScreenFilter;
use crate::utils::new_id;

/// Builds the full application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Tenants
        .route("/api/clients", get(list_clients).post(create_client))
        .route(
            "/api/clients/{id}",
            get(get_client).put(update_client).delete(delete_client),
        )
        // Locations
        .route("/api/locations", get(list_locations).post(create_location))
        .route(
            "/api/locations/{id}",
            get(get_location).put(update_location).delete(delete_location),
        )
        .route("/api/locations/{id}/screens", post(assign_location_screens))
        .route("/api/locations/{id}/push", post(push_to_location))
        // Screens
        .route("/api/screens", get(list_screens).post(create_screen))
        .route(
            "/api/screens/{id}",
            get(get_screen).put(update_screen).delete(delete_screen),
        )
        .route("/api/screens/{id}/mode", post(set_screen_mode))
        .route(
            "/api/screens/{id}/screenshot",
            get(get_screen_screenshot).post(request_screen_screenshot),
        )
        // Playlists
        .route("/api/playlists", get(list_playlists).post(create_playlist))
        .route(
            "/api/playlists/{id}",
            get(get_playlist).put(update_playlist).delete(delete_playlist),
        )
        .route("/api/playlists/{id}/push", post(push_playlist))
        // Schedules
        .route("/api/schedules", get(list_schedules).post(create_schedule))
        .route(
            "/api/schedules/{id}",
            get(get_schedule).put(update_schedule).delete(delete_schedule),
        )
        // Sync groups
        .route("/api/sync-groups", get(list_sync_groups).post(create_sync_group))
        .route(
            "/api/sync-groups/{id}",
            get(get_sync_group)
                .put(update_sync_group)
                .delete(delete_sync_group),
        )
        .route("/api/sync-groups/{id}/screens", post(attach_sync_screens))
        .route(
            "/api/sync-groups/{id}/screens/{screen_id}",
            axum::routing::delete(detach_sync_screen),
        )
        .route("/api/sync-groups/{id}/play", post(play_sync_group))
        .route("/api/sync-groups/{id}/stop", post(stop_sync_group))
        .route("/api/sync-groups/{id}/seek", post(seek_sync_group))
        .route("/api/sync-groups/{id}/identify", post(identify_sync_group))
        .route("/api/sync-groups/{id}/screenshot", post(screenshot_sync_group))
        // Announcements
        .route(
            "/api/announcements",
            get(list_announcements).post(create_announcement),
        )
        .route(
            "/api/announcements/{id}",
            get(get_announcement)
                .put(update_announcement)
                .delete(delete_announcement),
        )
        .route("/api/announcements/{id}/push", post(push_announcement))
        // Generic push surface
        .route("/api/push", post(push_generic))
        .route("/api/push/widget", post(push_widget))
        .route("/api/push/alert", post(push_alert))
        .route("/api/push/clear", post(push_clear))
        .route("/api/reload-all", post(reload_all))
        // Context
        .route("/api/context", get(get_context))
        .route("/api/context/{location_id}", get(get_context_location))
        // Settings & stats
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/api/dashboard/stats", get(dashboard_stats))
        // Static catalogue
        .route("/api/content/widgets", get(content_widgets))
        .route("/api/content/templates", get(content_templates))
        .route("/api/content/videos", get(content_videos))
        .route("/video/{filename}", get(stream_video))
        // Screen event channel
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

async fn health_check(State(state): State<AppState>) -> Response {
    api_data(json!({
        "status": "ok",
        "service": "marquee",
        "connectedScreens": state.registry.connected_count(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Clients
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientPayload {
    id: Option<String>,
    name: Option<String>,
    slug: Option<String>,
    logo_url: Option<String>,
    branding: Option<Value>,
    contact: Option<String>,
    plan: Option<Plan>,
    active: Option<bool>,
}

async fn list_clients(State(state): State<AppState>) -> SignageResult<Response> {
    Ok(api_data(state.store.list_clients()?))
}

async fn create_client(
    State(state): State<AppState>,
    Json(payload): Json<ClientPayload>,
) -> SignageResult<Response> {
    let name = payload
        .name
        .ok_or_else(|| SignageError::InvalidInput("name is required".into()))?;
    let slug = payload
        .slug
        .ok_or_else(|| SignageError::InvalidInput("slug is required".into()))?;
    let client = Client {
        id: payload.id.unwrap_or_else(|| slug.clone()),
        name,
        slug,
        logo_url: payload.logo_url,
        branding: payload.branding.unwrap_or(Value::Null),
        contact: payload.contact,
        plan: payload.plan.unwrap_or_default(),
        active: payload.active.unwrap_or(true),
        created_at: 0,
        updated_at: 0,
    };
    Ok(api_data(state.store.insert_client(&client)?))
}

async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    Ok(api_data(state.store.get_client(&id)?))
}

async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ClientPayload>,
) -> SignageResult<Response> {
    let mut client = state.store.get_client(&id)?;
    if let Some(name) = payload.name {
        client.name = name;
    }
    if let Some(logo_url) = payload.logo_url {
        client.logo_url = Some(logo_url);
    }
    if let Some(branding) = payload.branding {
        client.branding = branding;
    }
    if let Some(contact) = payload.contact {
        client.contact = Some(contact);
    }
    if let Some(plan) = payload.plan {
        client.plan = plan;
    }
    if let Some(active) = payload.active {
        client.active = active;
    }
    Ok(api_data(state.store.update_client(&id, &client)?))
}

async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.store.delete_client(&id)?;
    state.registry.broadcast_registry_change();
    Ok(api_ok())
}

// ─────────────────────────────────────────────────────────────────────────────
// Locations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationPayload {
    id: Option<String>,
    name: Option<String>,
    address: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
    config: Option<Value>,
}

async fn list_locations(
    State(state): State<AppState>,
    tenant: TenantScope,
) -> SignageResult<Response> {
    Ok(api_data(state.store.list_locations(tenant.filter())?))
}

async fn create_location(
    State(state): State<AppState>,
    tenant: TenantScope,
    Json(payload): Json<LocationPayload>,
) -> SignageResult<Response> {
    let location = Location {
        id: payload.id.unwrap_or_else(new_id),
        client_id: tenant.client_id,
        name: payload
            .name
            .ok_or_else(|| SignageError::InvalidInput("name is required".into()))?,
        address: payload.address,
        lat: payload.lat,
        lon: payload.lon,
        timezone: payload.timezone,
        config: payload.config.unwrap_or(Value::Null),
    };
    Ok(api_data(state.store.insert_location(&location)?))
}

async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    Ok(api_data(state.store.get_location(&id)?))
}

async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<LocationPayload>,
) -> SignageResult<Response> {
    let mut location = state.store.get_location(&id)?;
    if let Some(name) = payload.name {
        location.name = name;
    }
    if let Some(address) = payload.address {
        location.address = Some(address);
    }
    if let Some(lat) = payload.lat {
        location.lat = Some(lat);
    }
    if let Some(lon) = payload.lon {
        location.lon = Some(lon);
    }
    if let Some(timezone) = payload.timezone {
        location.timezone = Some(timezone);
    }
    if let Some(config) = payload.config {
        location.config = config;
    }
    Ok(api_data(state.store.update_location(&id, &location)?))
}

async fn delete_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.store.delete_location(&id)?;
    Ok(api_ok())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScreenIdsPayload {
    screen_ids: Vec<String>,
}

async fn assign_location_screens(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ScreenIdsPayload>,
) -> SignageResult<Response> {
    state.store.get_location(&id)?;
    for screen_id in &payload.screen_ids {
        let mut screen = state.store.get_screen(screen_id)?;
        screen.location_id = Some(id.clone());
        state.store.update_screen(screen_id, &screen)?;
    }
    state.registry.broadcast_registry_change();
    Ok(api_ok())
}

async fn push_to_location(
    State(state): State<AppState>,
    tenant: TenantScope,
    Path(id): Path<String>,
    Json(payload): Json<PushPayload>,
) -> SignageResult<Response> {
    state.store.get_location(&id)?;
    let envelope = PushEnvelope::new("api", payload.kind, payload.content);
    Ok(api_data(state.bus.push(&tenant.client_id, &id, envelope)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Screens
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ScreenListQuery {
    status: Option<ScreenStatus>,
    location_id: Option<String>,
}

async fn list_screens(
    State(state): State<AppState>,
    tenant: TenantScope,
    Query(query): Query<ScreenListQuery>,
) -> SignageResult<Response> {
    let mut screens = state.store.list_screens(&ScreenFilter {
        client_id: tenant.filter(),
        location_id: query.location_id.as_deref(),
        status: query.status,
    })?;
    state.registry.decorate(&mut screens);
    Ok(api_data(screens))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScreenPayload {
    id: Option<String>,
    name: Option<String>,
    group_id: Option<String>,
    location_id: Option<String>,
    #[serde(rename = "type")]
    screen_type: Option<String>,
    config: Option<Value>,
    // Forbidden on update; rejected when present.
    client_id: Option<Value>,
    status: Option<Value>,
    last_seen: Option<Value>,
    connected: Option<Value>,
}

impl ScreenPayload {
    fn reject_forbidden(&self, include_id: bool) -> SignageResult<()> {
        let mut forbidden: Vec<&str> = Vec::new();
        if include_id && self.id.is_some() {
            forbidden.push("id");
        }
        if self.client_id.is_some() {
            forbidden.push("clientId");
        }
        if self.status.is_some() {
            forbidden.push("status");
        }
        if self.last_seen.is_some() {
            forbidden.push("lastSeen");
        }
        if self.connected.is_some() {
            forbidden.push("connected");
        }
        if forbidden.is_empty() {
            Ok(())
        } else {
            Err(SignageError::InvalidInput(format!(
                "fields not patchable: {}",
                forbidden.join(", ")
            )))
        }
    }
}

async fn create_screen(
    State(state): State<AppState>,
    tenant: TenantScope,
    Json(payload): Json<ScreenPayload>,
) -> SignageResult<Response> {
    let id = payload.id.clone().unwrap_or_else(new_id);
    let screen = Screen {
        id: id.clone(),
        client_id: tenant.client_id,
        name: payload.name.clone().unwrap_or_else(|| id.clone()),
        group_id: payload.group_id.clone(),
        location_id: payload.location_id.clone(),
        sync_group: None,
        screen_type: payload.screen_type.clone(),
        status: ScreenStatus::Offline,
        last_seen: 0,
        platform: None,
        resolution: None,
        orientation: None,
        capabilities: Value::Null,
        config: payload.config.clone().unwrap_or(Value::Null),
        connected: false,
        current_mode: ScreenMode::Signage,
    };
    let stored = state.store.upsert_screen(&screen)?;
    state.registry.broadcast_registry_change();
    Ok(api_data(stored))
}

async fn get_screen(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    let mut screen = state.store.get_screen(&id)?;
    state.registry.decorate(std::slice::from_mut(&mut screen));
    Ok(api_data(screen))
}

async fn update_screen(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ScreenPayload>,
) -> SignageResult<Response> {
    payload.reject_forbidden(true)?;
    let mut screen = state.store.get_screen(&id)?;
    if let Some(name) = payload.name {
        screen.name = name;
    }
    if let Some(group_id) = payload.group_id {
        screen.group_id = Some(group_id);
    }
    if let Some(location_id) = payload.location_id {
        screen.location_id = Some(location_id);
    }
    if let Some(screen_type) = payload.screen_type {
        screen.screen_type = Some(screen_type);
    }
    if let Some(config) = payload.config {
        screen.config = config;
    }
    let stored = state.store.update_screen(&id, &screen)?;
    state.registry.broadcast_registry_change();
    Ok(api_data(stored))
}

async fn delete_screen(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.registry.delete_screen(&id)?;
    Ok(api_ok())
}

#[derive(Deserialize)]
struct ModePayload {
    mode: ScreenMode,
}

async fn set_screen_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ModePayload>,
) -> SignageResult<Response> {
    state.store.get_screen(&id)?;
    Ok(api_data(state.bus.force_mode(&id, payload.mode)?))
}

/// Returns the last captured frame for a screen, if any.
async fn get_screen_screenshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.store.get_screen(&id)?;
    let slot = state
        .registry
        .screenshot(&id)
        .ok_or_else(|| SignageError::NotFound(format!("no screenshot for screen {id}")))?;
    Ok(api_data(json!({
        "image": slot.image,
        "timestamp": slot.timestamp,
    })))
}

/// Asks the screen to capture a frame; the response lands in the cache.
async fn request_screen_screenshot(
    State(state): State<AppState>,
    tenant: TenantScope,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.store.get_screen(&id)?;
    Ok(api_data(state.bus.request_screenshot(&tenant.client_id, &id)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Playlists
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistPayload {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    items: Option<Vec<PlaylistItem>>,
    #[serde(rename = "loop")]
    loop_enabled: Option<bool>,
    transition: Option<Transition>,
}

async fn list_playlists(
    State(state): State<AppState>,
    tenant: TenantScope,
) -> SignageResult<Response> {
    Ok(api_data(state.store.list_playlists(tenant.filter())?))
}

async fn create_playlist(
    State(state): State<AppState>,
    tenant: TenantScope,
    Json(payload): Json<PlaylistPayload>,
) -> SignageResult<Response> {
    let playlist = Playlist {
        id: payload.id.unwrap_or_else(new_id),
        client_id: tenant.client_id,
        name: payload
            .name
            .ok_or_else(|| SignageError::InvalidInput("name is required".into()))?,
        description: payload.description,
        items: payload.items.unwrap_or_default(),
        loop_enabled: payload.loop_enabled.unwrap_or(true),
        transition: payload.transition.unwrap_or_default(),
        created_at: 0,
        updated_at: 0,
    };
    Ok(api_data(state.store.insert_playlist(&playlist)?))
}

async fn get_playlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    Ok(api_data(state.store.get_playlist(&id)?))
}

async fn update_playlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PlaylistPayload>,
) -> SignageResult<Response> {
    let mut playlist = state.store.get_playlist(&id)?;
    if let Some(name) = payload.name {
        playlist.name = name;
    }
    if let Some(description) = payload.description {
        playlist.description = Some(description);
    }
    if let Some(items) = payload.items {
        playlist.items = items;
    }
    if let Some(loop_enabled) = payload.loop_enabled {
        playlist.loop_enabled = loop_enabled;
    }
    if let Some(transition) = payload.transition {
        playlist.transition = transition;
    }
    Ok(api_data(state.store.update_playlist(&id, &playlist)?))
}

async fn delete_playlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.store.delete_playlist(&id)?;
    state.schedules.poke();
    Ok(api_ok())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetPayload {
    target: Option<String>,
}

async fn push_playlist(
    State(state): State<AppState>,
    tenant: TenantScope,
    Path(id): Path<String>,
    payload: Option<Json<TargetPayload>>,
) -> SignageResult<Response> {
    let playlist = state.store.get_playlist(&id)?;
    let target = payload
        .and_then(|Json(p)| p.target)
        .unwrap_or_else(|| "all".to_string());
    let envelope = crate::services::PushBus::playlist_envelope("api", &playlist);
    Ok(api_data(state.bus.push(&tenant.client_id, &target, envelope)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Schedules
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchedulePayload {
    id: Option<String>,
    playlist_id: Option<String>,
    screen_target: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    days: Option<Vec<u8>>,
    priority: Option<i32>,
    enabled: Option<bool>,
}

async fn list_schedules(
    State(state): State<AppState>,
    tenant: TenantScope,
) -> SignageResult<Response> {
    Ok(api_data(state.store.list_schedules(tenant.filter())?))
}

async fn create_schedule(
    State(state): State<AppState>,
    tenant: TenantScope,
    Json(payload): Json<SchedulePayload>,
) -> SignageResult<Response> {
    let schedule = Schedule {
        id: payload.id.unwrap_or_else(new_id),
        client_id: tenant.client_id,
        playlist_id: payload
            .playlist_id
            .ok_or_else(|| SignageError::InvalidInput("playlistId is required".into()))?,
        screen_target: payload.screen_target.unwrap_or_else(|| "all".to_string()),
        start_time: payload.start_time.unwrap_or_else(|| "00:00".to_string()),
        end_time: payload.end_time.unwrap_or_else(|| "23:59".to_string()),
        days: payload.days.unwrap_or_else(|| vec![0, 1, 2, 3, 4, 5, 6]),
        priority: payload.priority.unwrap_or(0),
        enabled: payload.enabled.unwrap_or(true),
        created_at: 0,
        updated_at: 0,
    };
    let stored = state.store.insert_schedule(&schedule)?;
    state.schedules.poke();
    Ok(api_data(stored))
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    Ok(api_data(state.store.get_schedule(&id)?))
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SchedulePayload>,
) -> SignageResult<Response> {
    let mut schedule = state.store.get_schedule(&id)?;
    if let Some(playlist_id) = payload.playlist_id {
        schedule.playlist_id = playlist_id;
    }
    if let Some(screen_target) = payload.screen_target {
        schedule.screen_target = screen_target;
    }
    if let Some(start_time) = payload.start_time {
        schedule.start_time = start_time;
    }
    if let Some(end_time) = payload.end_time {
        schedule.end_time = end_time;
    }
    if let Some(days) = payload.days {
        schedule.days = days;
    }
    if let Some(priority) = payload.priority {
        schedule.priority = priority;
    }
    if let Some(enabled) = payload.enabled {
        schedule.enabled = enabled;
    }
    let stored = state.store.update_schedule(&id, &schedule)?;
    state.schedules.poke();
    Ok(api_data(stored))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.store.delete_schedule(&id)?;
    state.schedules.poke();
    Ok(api_ok())
}

// ─────────────────────────────────────────────────────────────────────────────
// Sync groups
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncGroupPayload {
    id: Option<String>,
    name: Option<String>,
    mode: Option<SyncMode>,
    playlist_id: Option<String>,
    leader_screen_id: Option<String>,
    config: Option<Value>,
}

async fn list_sync_groups(
    State(state): State<AppState>,
    tenant: TenantScope,
) -> SignageResult<Response> {
    let groups = state.store.list_sync_groups(tenant.filter())?;
    let decorated: Vec<Value> = groups
        .into_iter()
        .map(|group| {
            let members = state.store.sync_group_members(&group.id).unwrap_or_default();
            let run = state.sync.runs().get(&group.id);
            json!({
                "group": group,
                "screens": members,
                "state": run,
            })
        })
        .collect();
    Ok(api_data(decorated))
}

async fn create_sync_group(
    State(state): State<AppState>,
    tenant: TenantScope,
    Json(payload): Json<SyncGroupPayload>,
) -> SignageResult<Response> {
    let group = SyncGroup {
        id: payload.id.unwrap_or_else(new_id),
        client_id: tenant.client_id,
        name: payload
            .name
            .ok_or_else(|| SignageError::InvalidInput("name is required".into()))?,
        mode: payload.mode.unwrap_or_default(),
        playlist_id: payload.playlist_id,
        leader_screen_id: payload.leader_screen_id,
        config: payload.config.unwrap_or(Value::Null),
        created_at: 0,
        updated_at: 0,
    };
    Ok(api_data(state.store.insert_sync_group(&group)?))
}

async fn get_sync_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    let group = state.store.get_sync_group(&id)?;
    let members = state.store.sync_group_members(&id)?;
    Ok(api_data(json!({
        "group": group,
        "screens": members,
        "state": state.sync.runs().get(&id),
    })))
}

async fn update_sync_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SyncGroupPayload>,
) -> SignageResult<Response> {
    let mut group = state.store.get_sync_group(&id)?;
    if let Some(name) = payload.name {
        group.name = name;
    }
    if let Some(mode) = payload.mode {
        group.mode = mode;
    }
    if let Some(playlist_id) = payload.playlist_id {
        group.playlist_id = Some(playlist_id);
    }
    if let Some(leader_screen_id) = payload.leader_screen_id {
        group.leader_screen_id = Some(leader_screen_id);
    }
    if let Some(config) = payload.config {
        group.config = config;
    }
    Ok(api_data(state.store.update_sync_group(&id, &group)?))
}

async fn delete_sync_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.sync.delete_group(&id)?;
    Ok(api_ok())
}

async fn attach_sync_screens(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ScreenIdsPayload>,
) -> SignageResult<Response> {
    state.sync.attach_screens(&id, &payload.screen_ids)?;
    Ok(api_data(state.store.sync_group_members(&id)?))
}

async fn detach_sync_screen(
    State(state): State<AppState>,
    Path((id, screen_id)): Path<(String, String)>,
) -> SignageResult<Response> {
    state.store.get_sync_group(&id)?;
    state.sync.detach_screen(&screen_id)?;
    Ok(api_data(state.store.sync_group_members(&id)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayPayload {
    playlist_id: Option<String>,
}

async fn play_sync_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<PlayPayload>>,
) -> SignageResult<Response> {
    let playlist_id = payload.and_then(|Json(p)| p.playlist_id);
    let run = state.sync.play(&id, playlist_id.as_deref())?;
    Ok(api_data(run))
}

async fn stop_sync_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.sync.stop(&id)?;
    Ok(api_ok())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeekPayload {
    item_index: usize,
}

async fn seek_sync_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SeekPayload>,
) -> SignageResult<Response> {
    Ok(api_data(state.sync.seek(&id, payload.item_index)?))
}

async fn identify_sync_group(
    State(state): State<AppState>,
    tenant: TenantScope,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.store.get_sync_group(&id)?;
    Ok(api_data(state.bus.identify(&tenant.client_id, &id)?))
}

async fn screenshot_sync_group(
    State(state): State<AppState>,
    tenant: TenantScope,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.store.get_sync_group(&id)?;
    Ok(api_data(state.bus.request_screenshot(&tenant.client_id, &id)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Announcements
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnouncementPayload {
    id: Option<String>,
    location_id: Option<String>,
    title: Option<String>,
    message: Option<String>,
    icon: Option<String>,
    priority: Option<AnnouncementPriority>,
    active: Option<bool>,
}

async fn list_announcements(
    State(state): State<AppState>,
    tenant: TenantScope,
) -> SignageResult<Response> {
    Ok(api_data(state.store.list_announcements(tenant.filter())?))
}

async fn create_announcement(
    State(state): State<AppState>,
    tenant: TenantScope,
    Json(payload): Json<AnnouncementPayload>,
) -> SignageResult<Response> {
    let announcement = Announcement {
        id: payload.id.unwrap_or_else(new_id),
        client_id: tenant.client_id,
        location_id: payload.location_id,
        title: payload
            .title
            .ok_or_else(|| SignageError::InvalidInput("title is required".into()))?,
        message: payload
            .message
            .ok_or_else(|| SignageError::InvalidInput("message is required".into()))?,
        icon: payload.icon,
        priority: payload.priority.unwrap_or_default(),
        active: payload.active.unwrap_or(true),
        created_at: 0,
        updated_at: 0,
    };
    Ok(api_data(state.store.insert_announcement(&announcement)?))
}

async fn get_announcement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    Ok(api_data(state.store.get_announcement(&id)?))
}

async fn update_announcement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<AnnouncementPayload>,
) -> SignageResult<Response> {
    let mut announcement = state.store.get_announcement(&id)?;
    if let Some(location_id) = payload.location_id {
        announcement.location_id = Some(location_id);
    }
    if let Some(title) = payload.title {
        announcement.title = title;
    }
    if let Some(message) = payload.message {
        announcement.message = message;
    }
    if let Some(icon) = payload.icon {
        announcement.icon = Some(icon);
    }
    if let Some(priority) = payload.priority {
        announcement.priority = priority;
    }
    if let Some(active) = payload.active {
        announcement.active = active;
    }
    Ok(api_data(state.store.update_announcement(&id, &announcement)?))
}

async fn delete_announcement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    state.store.delete_announcement(&id)?;
    Ok(api_ok())
}

/// Pushes an announcement to its location's screens (or the whole tenant
/// when it is global) as a widget envelope.
async fn push_announcement(
    State(state): State<AppState>,
    tenant: TenantScope,
    Path(id): Path<String>,
) -> SignageResult<Response> {
    let announcement = state.store.get_announcement(&id)?;
    let target = announcement
        .location_id
        .clone()
        .unwrap_or_else(|| "all".to_string());
    let envelope = PushEnvelope::new(
        "api",
        PushKind::Widget,
        json!({
            "widget": "announcements",
            "announcement": announcement,
        }),
    );
    Ok(api_data(state.bus.push(&tenant.client_id, &target, envelope)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Generic push surface
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushPayload {
    #[serde(default = "default_target")]
    target: String,
    #[serde(rename = "type")]
    kind: PushKind,
    #[serde(default)]
    content: Value,
}

fn default_target() -> String {
    "all".to_string()
}

async fn push_generic(
    State(state): State<AppState>,
    tenant: TenantScope,
    Json(payload): Json<PushPayload>,
) -> SignageResult<Response> {
    let envelope = PushEnvelope::new("api", payload.kind, payload.content);
    Ok(api_data(state.bus.push(&tenant.client_id, &payload.target, envelope)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WidgetPushPayload {
    #[serde(default = "default_target")]
    target: String,
    widget: String,
    #[serde(default)]
    config: Value,
    duration: Option<u64>,
}

async fn push_widget(
    State(state): State<AppState>,
    tenant: TenantScope,
    Json(payload): Json<WidgetPushPayload>,
) -> SignageResult<Response> {
    let envelope = PushEnvelope::new(
        "api",
        PushKind::Widget,
        json!({
            "widget": payload.widget,
            "config": payload.config,
            "duration": payload.duration,
        }),
    );
    Ok(api_data(state.bus.push(&tenant.client_id, &payload.target, envelope)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertPushPayload {
    #[serde(default = "default_target")]
    target: String,
    message: String,
    #[serde(default)]
    level: Option<AlertLevel>,
    duration: Option<u64>,
}

async fn push_alert(
    State(state): State<AppState>,
    tenant: TenantScope,
    Json(payload): Json<AlertPushPayload>,
) -> SignageResult<Response> {
    let outcome = state.bus.push_alert(
        &tenant.client_id,
        &payload.target,
        json!({"message": payload.message}),
        payload.level.unwrap_or(AlertLevel::Info),
        payload.duration,
    )?;
    Ok(api_data(outcome))
}

async fn push_clear(
    State(state): State<AppState>,
    tenant: TenantScope,
    payload: Option<Json<TargetPayload>>,
) -> SignageResult<Response> {
    let target = payload
        .and_then(|Json(p)| p.target)
        .unwrap_or_else(|| "all".to_string());
    Ok(api_data(state.bus.clear(&tenant.client_id, &target)?))
}

async fn reload_all(
    State(state): State<AppState>,
    tenant: TenantScope,
) -> SignageResult<Response> {
    Ok(api_data(state.bus.reload(&tenant.client_id, "all")?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

async fn get_context(State(state): State<AppState>) -> Response {
    let snapshot: Vec<Value> = state
        .context
        .snapshot()
        .into_iter()
        .map(|(location_id, mood, signals)| {
            json!({
                "locationId": location_id,
                "mood": mood,
                "signals": signals,
            })
        })
        .collect();
    api_data(snapshot)
}

async fn get_context_location(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
) -> SignageResult<Response> {
    let mood = state
        .context
        .current_mood(&location_id)
        .ok_or_else(|| SignageError::NotFound(format!("context for location {location_id}")))?;
    let signals = state.context.cache().get(&location_id);
    Ok(api_data(json!({
        "locationId": location_id,
        "mood": mood,
        "signals": signals,
    })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings & stats
// ─────────────────────────────────────────────────────────────────────────────

async fn get_settings(State(state): State<AppState>) -> SignageResult<Response> {
    Ok(api_data(state.store.all_settings()?))
}

async fn put_settings(
    State(state): State<AppState>,
    Json(payload): Json<BTreeMap<String, String>>,
) -> SignageResult<Response> {
    for (key, value) in &payload {
        state.store.set_setting(key, value)?;
    }
    Ok(api_data(state.store.all_settings()?))
}

async fn dashboard_stats(
    State(state): State<AppState>,
    tenant: TenantScope,
) -> SignageResult<Response> {
    let stats = state.store.dashboard_stats(&tenant.client_id)?;
    Ok(api_data(json!({
        "counts": stats,
        "connectedScreens": state.registry.connected_count(),
        "playingSyncGroups": state.sync.runs().all().len(),
        "droppedMessages": state.registry.dropped_messages(),
    })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Static catalogue
// ─────────────────────────────────────────────────────────────────────────────

async fn content_widgets() -> Response {
    api_data(content_library::widgets())
}

async fn content_templates() -> Response {
    api_data(content_library::templates())
}

async fn content_videos(State(state): State<AppState>) -> SignageResult<Response> {
    Ok(api_data(state.videos.list().await?))
}

async fn stream_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> SignageResult<Response> {
    let path = state.videos.resolve(&filename)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| SignageError::Internal(format!("open {filename}: {e}")))?;
    let stream = ReaderStream::new(file);
    Ok((
        [(
            header::CONTENT_TYPE,
            crate::services::VideoLibrary::content_type(&filename),
        )],
        Body::from_stream(stream),
    )
        .into_response())
}
