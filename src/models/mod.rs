pub mod download_event;
pub mod file;
pub mod login_attempt;
pub mod profile;
pub mod shared_link;
pub mod team;
pub mod user;
