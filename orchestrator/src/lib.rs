//! podlayer library
//!
//! Deploys a multi-container application onto a single host in ordered
//! layers, sharing a finite pool of accelerator devices between units.

pub mod app;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod readiness;
pub mod render;
pub mod resources;
pub mod runtime;
pub mod utils;
