pub mod assets;
pub mod config;
pub mod database;
pub mod errors;
pub mod i18n;
pub mod logo_assets;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod storage;
pub mod tokens;
pub mod utils;
pub mod web;
