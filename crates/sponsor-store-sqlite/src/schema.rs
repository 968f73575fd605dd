//! SQL schemas for the target and sponsor stores.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Relational target store. Flag, reference and timestamp are written
/// together; the CHECK rejects a reference on an unflagged row.
pub const TARGET_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS employers (
    target_id          TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    is_sponsor         INTEGER NOT NULL DEFAULT 0,
    matched_sponsor_id TEXT,             -- sponsor document id or NULL
    flag_updated_at    TEXT,             -- RFC 3339 UTC, fixed width; NULL = never evaluated
    CHECK (is_sponsor IN (0, 1)),
    CHECK (matched_sponsor_id IS NULL OR is_sponsor = 1)
);

CREATE INDEX IF NOT EXISTS employers_flag_updated_idx ON employers(flag_updated_at);
CREATE INDEX IF NOT EXISTS employers_is_sponsor_idx   ON employers(is_sponsor);

PRAGMA user_version = 1;
";

/// Sponsor document store: one JSON body per sponsor.
///
/// Bodies carry at least `name` and `active`; `alternate_names` is optional
/// and any other fields are ignored by the projection.
pub const SPONSOR_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS sponsor_documents (
    doc_id     TEXT PRIMARY KEY,
    body       TEXT NOT NULL CHECK (json_valid(body)),
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS sponsor_documents_active_idx
    ON sponsor_documents(json_extract(body, '$.active'));

PRAGMA user_version = 1;
";
