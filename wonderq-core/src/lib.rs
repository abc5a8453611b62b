//! Core types for WonderQ
//!
//! This crate provides the error envelope shared by the queue engine and the
//! HTTP transport.

pub mod error;

pub use error::{ApiError, ErrorCode};
