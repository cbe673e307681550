// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Site Guardian CLI

pub mod config;
pub mod host;
pub mod serve;
pub mod sites;

pub use self::config::ConfigCommand;
pub use self::sites::SitesCommand;
