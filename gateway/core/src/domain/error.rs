// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Gateway Errors
//!
//! Every failure the gateway can report, as one typed enum. Nothing here is
//! fatal to the process: operations return these to their immediate caller and
//! the gateway stays available for the next event.

use std::time::Duration;

use thiserror::Error;

use crate::domain::rule::RuleId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// External mapping unavailable. Readers of the domain list treat this as empty.
    #[error("Failed to read '{key}' from store: {message}")]
    StoreRead { key: String, message: String },

    #[error("Failed to persist '{key}' to store: {message}")]
    StoreWrite { key: String, message: String },

    /// The redirect engine rejected a diff; the rule set is not converged until the next trigger.
    #[error("Rule store rejected update: {0}")]
    RuleStore(String),

    #[error("Authentication timed out after {}s", .0.as_secs())]
    AuthTimeout(Duration),

    #[error("Cannot reach authenticator: {0}")]
    AuthConnectivity(String),

    /// The authenticator answered, and the answer was no.
    #[error("Authentication denied: {0}")]
    AuthDenied(String),

    /// A frame from the authenticator could not be decoded.
    #[error("Authenticator protocol error: {0}")]
    Protocol(String),

    #[error("Invalid context id: {0}")]
    InvalidContext(String),

    #[error("Authorization required: {0}")]
    AuthorizationRequired(String),

    #[error("Rule id {id} for '{incoming}' is already allocated to '{existing}'")]
    IdCollision {
        id: RuleId,
        existing: String,
        incoming: String,
    },

    #[error("Invalid domain: '{0}'")]
    InvalidDomain(String),
}
