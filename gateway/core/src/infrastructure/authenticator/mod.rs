// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Authenticator channel: framing, transports, the gateway-side session
//! client and the host that answers challenges.

pub mod client;
pub mod codec;
pub mod host;
pub mod transport;

pub use client::AuthenticatorClient;
pub use host::{verifier_from_config, AuthenticatorHost, CommandVerifier, FixedVerifier, Verifier};
pub use transport::{AuthenticatorTransport, ProcessTransport, SessionChannel};
