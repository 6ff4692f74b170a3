//! A small inventory-tracking backend.
//!
//! Exposes an HTTP API under `/api` for listing, searching, creating,
//! partially updating and deleting inventory items backed by PostgreSQL.

pub mod api;
pub mod app;
pub mod infra;
