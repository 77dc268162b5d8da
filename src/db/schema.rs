//! Database schema and migrations for chatrelay.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded; `schema_version` records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: users, rooms and room membership (collaborator-owned data)
    r#"
CREATE TABLE users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL UNIQUE COLLATE NOCASE,
    user_type   TEXT NOT NULL DEFAULT 'basic',   -- 'basic' or 'pro'
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE rooms (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,            -- capitalized form
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE room_members (
    room_id     INTEGER NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (room_id, user_id)
);

CREATE INDEX idx_room_members_user_id ON room_members(user_id);
"#,
    // v2: durable message log for rooms and direct messages
    r#"
CREATE TABLE chat_messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    scope_kind  TEXT NOT NULL,                   -- 'room' or 'direct'
    room_name   TEXT,                            -- set for 'room'
    sender_id   INTEGER,                         -- NULL for anonymous room senders
    receiver_id INTEGER,                         -- set for 'direct'
    sender_name TEXT NOT NULL,
    body        TEXT NOT NULL,
    created_at  TEXT NOT NULL                    -- RFC3339 UTC, assigned on append
);

CREATE INDEX idx_chat_messages_room ON chat_messages(room_name, created_at);
CREATE INDEX idx_chat_messages_direct ON chat_messages(sender_id, receiver_id, created_at);
"#,
];
