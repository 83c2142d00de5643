//! Bike-share Usage API Library
//!
//! Read-only HTTP API over a historical bike-share usage snapshot: JSON
//! queries plus a spreadsheet export.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod params;
pub mod router;
pub mod state;
pub mod xlsx;
