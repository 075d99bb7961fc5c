//! Ingestion service tests
