pub mod compression;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod keyring;
pub mod pipeline;
pub mod publisher;
pub mod server;
pub mod service;
pub mod storage;
