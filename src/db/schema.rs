//! Database schema and migrations for hoard.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded. Name uniqueness uses `COALESCE(parent_id, 0)` so that entries
//! at the storage root (NULL parent) collide with each other as well.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: storages
    r#"
CREATE TABLE storages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    owner_id    INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_storages_owner ON storages(owner_id);
"#,
    // v2: directory tree
    r#"
CREATE TABLE directories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    parent_id   INTEGER REFERENCES directories(id) ON DELETE CASCADE,
    storage_id  INTEGER NOT NULL REFERENCES storages(id) ON DELETE CASCADE,
    created_at  TEXT NOT NULL
);

CREATE UNIQUE INDEX idx_directories_name_unique
    ON directories(storage_id, COALESCE(parent_id, 0), name);
CREATE INDEX idx_directories_parent ON directories(parent_id);
"#,
    // v3: file records
    r#"
CREATE TABLE files (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    name              TEXT NOT NULL,
    parent_id         INTEGER REFERENCES directories(id) ON DELETE CASCADE,
    storage_id        INTEGER NOT NULL REFERENCES storages(id) ON DELETE CASCADE,
    size              INTEGER NOT NULL,
    physical_file_id  TEXT NOT NULL,
    uploaded_at       TEXT NOT NULL,
    updated_at        TEXT
);

CREATE UNIQUE INDEX idx_files_name_unique
    ON files(storage_id, COALESCE(parent_id, 0), name);
CREATE INDEX idx_files_parent ON files(parent_id);
CREATE INDEX idx_files_physical ON files(physical_file_id);
"#,
    // v4: share links
    r#"
CREATE TABLE file_links (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    link            TEXT NOT NULL UNIQUE,
    owner_id        INTEGER NOT NULL,
    file_id         INTEGER NOT NULL UNIQUE REFERENCES files(id) ON DELETE CASCADE,
    friends         TEXT NOT NULL DEFAULT '[]',
    is_public       INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    download_count  INTEGER NOT NULL DEFAULT 0,
    name            TEXT,
    description     TEXT
);
"#,
];
