//! SQLite schema for the catalogue.
//!
//! Every tenant-scoped table carries `client_id REFERENCES clients(id)
//! ON DELETE CASCADE` plus an index on that column, so deleting a client
//! removes the whole tenant subtree in one statement.

use rusqlite::{Connection, Result as SqlResult};

/// Schema version for the relational format.
pub const SCHEMA_VERSION: i32 = 3;

/// Create all tables for the relational schema.
pub fn create_tables(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(SCHEMA_SQL)
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

-- ============================================================
-- Tenancy
-- ============================================================

CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    logo_url TEXT,
    branding TEXT NOT NULL DEFAULT '{}',
    contact TEXT,
    plan TEXT NOT NULL DEFAULT 'basic',
    active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS locations (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    address TEXT,
    lat REAL,
    lon REAL,
    timezone TEXT,
    config TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_locations_client ON locations(client_id);

-- ============================================================
-- Screens
-- ============================================================

CREATE TABLE IF NOT EXISTS screens (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    group_id TEXT,
    location_id TEXT REFERENCES locations(id) ON DELETE SET NULL,
    sync_group TEXT,
    -- Position within the sync group, assigned at attach time. Together
    -- with the id this gives a deterministic member order that survives
    -- restarts.
    sync_position INTEGER,
    type TEXT,
    status TEXT NOT NULL DEFAULT 'offline',
    last_seen INTEGER NOT NULL DEFAULT 0,
    platform TEXT,
    resolution TEXT,
    orientation TEXT,
    capabilities TEXT NOT NULL DEFAULT '{}',
    config TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_screens_client ON screens(client_id);
CREATE INDEX IF NOT EXISTS idx_screens_location ON screens(location_id);
CREATE INDEX IF NOT EXISTS idx_screens_sync_group ON screens(sync_group);

-- ============================================================
-- Content
-- ============================================================

CREATE TABLE IF NOT EXISTS playlists (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    items TEXT NOT NULL DEFAULT '[]',
    loop_enabled INTEGER NOT NULL DEFAULT 1,
    transition TEXT NOT NULL DEFAULT 'fade',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_playlists_client ON playlists(client_id);

CREATE TABLE IF NOT EXISTS schedules (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
    playlist_id TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
    screen_target TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    days TEXT NOT NULL DEFAULT '[]',
    priority INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_schedules_client ON schedules(client_id);

CREATE TABLE IF NOT EXISTS sync_groups (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    mode TEXT NOT NULL DEFAULT 'mirror',
    playlist_id TEXT,
    leader_screen_id TEXT,
    config TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sync_groups_client ON sync_groups(client_id);

CREATE TABLE IF NOT EXISTS announcements (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
    location_id TEXT REFERENCES locations(id) ON DELETE SET NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    icon TEXT,
    priority TEXT NOT NULL DEFAULT 'normal',
    active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_announcements_client ON announcements(client_id);

-- ============================================================
-- Settings
-- ============================================================

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";
