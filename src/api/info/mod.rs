//! Application information endpoints.

pub mod info_api;
