//! Library crate for touchline-back, exposing modules for binaries and integration tests.

pub mod config;
pub mod dao;
mod dto;
pub mod engine;
mod error;
pub mod routes;
pub mod services;
pub mod state;
