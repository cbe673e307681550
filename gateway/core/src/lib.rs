// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Site Guardian Core
//!
//! Access-control gateway that keeps controlled domains behind an
//! authentication challenge.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Rule synchronization, authenticator sessions, domain list management

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
