//! Floodgate - Fixed-Window Rate Limiting Service
//!
//! This crate implements a request rate limiting service with fixed-window
//! counting per caller identity. Budgets are tracked in process memory and
//! checked over a small gRPC API by an HTTP-facing boundary, which owns the
//! translation of a denied verdict into protocol artifacts such as HTTP 429.

pub mod grpc;
pub mod ratelimit;
pub mod config;
pub mod error;
