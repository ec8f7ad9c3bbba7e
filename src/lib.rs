pub mod app;
pub mod common;
pub mod config;
pub mod docs;
pub mod infrastructure;
pub mod modules;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod workers;
