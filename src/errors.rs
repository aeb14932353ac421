// ABOUTME: Re-exports the unified error system from threadline-core
// ABOUTME: Keeps `crate::errors::AppError` paths stable across the server crate
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Unified Error Handling System
//!
//! See [`threadline_core::errors`] for the definitions.

pub use threadline_core::errors::{
    AppError, AppResult, ErrorCode, ErrorResponse, ErrorResponseDetails, StreamError,
};
