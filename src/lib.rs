//! Thumbnail Generation Service
//!
//! This library provides the asynchronous job pipeline behind thumbnail
//! generation: a bounded in-process work queue, a single background worker
//! that calls the image generation provider, the job status API, and a
//! resumable client that polls jobs to completion across restarts.

pub mod app_state;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
