//! SQL schema for the genekb SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Imported genotype calls. Read-only as far as the engine is concerned.
CREATE TABLE IF NOT EXISTS snps (
    rsid        TEXT PRIMARY KEY,
    chromosome  TEXT NOT NULL,
    position    INTEGER NOT NULL,
    genotype    TEXT NOT NULL,
    gene        TEXT                -- uppercase symbol or NULL
);

-- At most one row per rsid; writes overwrite in place.
CREATE TABLE IF NOT EXISTS annotations (
    rsid          TEXT PRIMARY KEY,
    title         TEXT NOT NULL,
    summary       TEXT NOT NULL,
    gene          TEXT,
    genotype_info TEXT NOT NULL DEFAULT '{}',   -- JSON object
    categories    TEXT NOT NULL DEFAULT '[]',   -- JSON array, sorted
    magnitude     REAL,
    repute        TEXT,                         -- 'good' | 'bad' | 'neutral'
    source        TEXT NOT NULL,                -- 'snpedia' | 'claude' | 'user'
    improved_at   TEXT,
    updated_at    TEXT NOT NULL
);

-- The snpedia version of an annotation, captured the first time it is
-- overwritten by an enriched one. Consumed by revert.
CREATE TABLE IF NOT EXISTS annotation_baselines (
    rsid          TEXT PRIMARY KEY,
    title         TEXT NOT NULL,
    summary       TEXT NOT NULL,
    gene          TEXT,
    genotype_info TEXT NOT NULL,
    categories    TEXT NOT NULL,
    magnitude     REAL,
    repute        TEXT,
    captured_at   TEXT NOT NULL
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
-- AUTOINCREMENT: ids are strictly increasing and never reused.
CREATE TABLE IF NOT EXISTS audit_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp    TEXT NOT NULL,
    source       TEXT NOT NULL,
    data_type    TEXT NOT NULL,
    reference_id TEXT,
    content      TEXT NOT NULL,
    metadata     TEXT NOT NULL DEFAULT 'null'
);

CREATE TABLE IF NOT EXISTS query_history (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    query          TEXT NOT NULL,
    response       TEXT NOT NULL,
    snps_mentioned TEXT NOT NULL DEFAULT '[]',  -- JSON array, ordered
    created_at     TEXT NOT NULL,
    hidden         INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS snps_gene_idx             ON snps(gene);
CREATE INDEX IF NOT EXISTS annotations_magnitude_idx ON annotations(magnitude);
CREATE INDEX IF NOT EXISTS annotations_gene_idx      ON annotations(gene);
CREATE INDEX IF NOT EXISTS audit_reference_idx       ON audit_log(reference_id);
CREATE INDEX IF NOT EXISTS audit_type_idx            ON audit_log(data_type);

PRAGMA user_version = 1;
";
