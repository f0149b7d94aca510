#![forbid(unsafe_code)]

//! Catalog and admin backend for a hosted-video site.
//!
//! Metadata lives in an embedded libsql database, video files live on an
//! external video host and thumbnails are mirrored to an image CDN.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod security;
pub mod store;
pub mod upload;
pub mod views;
