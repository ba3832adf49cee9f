pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod link;
pub mod log;
pub mod marker;
pub mod mi;
pub mod session;
pub mod table;
pub mod version;
