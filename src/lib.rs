pub mod app;
pub mod auth;
pub mod backend;
pub mod collection;
pub mod config;
pub mod detail;
pub mod error;
pub mod models;
pub mod notify;
pub mod session;
pub mod storage;
