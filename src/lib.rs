pub mod api;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod mapping;
pub mod models;
pub mod queue;
pub mod remote;
pub mod services;
pub mod state;
pub mod storage;
