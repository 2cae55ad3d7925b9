//! DuckDB schema for the durable mirror.

/// SQL schema for creating the mirror tables.
pub const SCHEMA_SQL: &str = r#"
-- Nodes: one row per element id, upserted
CREATE TABLE IF NOT EXISTS code_nodes (
    id VARCHAR PRIMARY KEY,
    ordinal BIGINT NOT NULL,
    type VARCHAR NOT NULL,
    name VARCHAR NOT NULL,
    file_path VARCHAR NOT NULL,
    line_number INTEGER NOT NULL,
    metadata VARCHAR
);

-- Relationships: append-only, endpoints are not foreign keys because
-- forward references and wildcards are legal
CREATE SEQUENCE IF NOT EXISTS seq_code_relationships START 1;

CREATE TABLE IF NOT EXISTS code_relationships (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_code_relationships'),
    source_id VARCHAR NOT NULL,
    source_resolved BOOLEAN NOT NULL,
    target_id VARCHAR NOT NULL,
    target_resolved BOOLEAN NOT NULL,
    type VARCHAR NOT NULL,
    metadata VARCHAR,
    confidence DOUBLE NOT NULL
);

-- Patterns: replaced wholesale on every recognition pass
CREATE TABLE IF NOT EXISTS code_patterns (
    pattern_id VARCHAR PRIMARY KEY,
    pattern_type VARCHAR NOT NULL,
    files VARCHAR NOT NULL,
    node_ids VARCHAR NOT NULL,
    template_data VARCHAR NOT NULL,
    similarity_score DOUBLE NOT NULL
);

CREATE TABLE IF NOT EXISTS weave_metadata (
    key VARCHAR PRIMARY KEY,
    value VARCHAR
);

CREATE INDEX IF NOT EXISTS idx_code_relationships_type ON code_relationships(type);
"#;

/// Schema version recorded in `weave_metadata`.
pub const SCHEMA_VERSION: &str = "1.0.0";
