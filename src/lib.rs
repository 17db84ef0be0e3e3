pub mod api;
pub mod database;
pub mod middleware;
pub mod models;
pub mod server;
pub mod services;
pub mod tasks;
pub mod utils;
pub mod websocket;
