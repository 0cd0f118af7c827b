pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;
