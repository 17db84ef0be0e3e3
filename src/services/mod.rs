pub mod access;
pub mod account;
pub mod analytics;
pub mod auth;
pub mod download;
pub mod file_storage;
pub mod file_validation;
pub mod share;
pub mod team;
