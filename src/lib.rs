//! Honeypot attack comparison service.
//!
//! A single HTTP endpoint takes two days of attack records, summarizes
//! them, asks a hosted language model for a comparison and relays the
//! model's JSON answer. A daily rate limiter backed by a remote counter
//! table guards the endpoint.

pub mod config;
pub mod core;
pub mod error;
pub mod model;
pub mod service;
pub mod storage;
pub mod utils;
