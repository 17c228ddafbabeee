// src/services/mod.rs
pub mod data_fetcher;
pub mod data_writer;
pub mod embed_services;
pub mod retry;
