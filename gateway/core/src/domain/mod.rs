// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Value objects, pure rule derivation and collaborator contracts for the
//! access-control gateway. Nothing here performs I/O.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Rule codec, authentication session model, configuration schema

pub mod auth;
pub mod clock;
pub mod controlled_domain;
pub mod error;
pub mod events;
pub mod gateway_config;
pub mod repository;
pub mod rule;
pub mod rule_codec;
