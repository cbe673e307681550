// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Controlled Domain Value Object
//!
//! A domain under gateway protection, always held in canonical form: lowercase,
//! no scheme, port or path, no leading `www.`. Anything that survives
//! [`ControlledDomain::parse`] is a syntactically valid DNS name.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::GatewayError;

const MAX_DOMAIN_LEN: usize = 253;

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("label pattern is valid")
});

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+://").expect("scheme pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControlledDomain(String);

impl ControlledDomain {
    /// Canonicalize free-form user input (`https://www.Example.com/path`) and validate it.
    pub fn parse(input: &str) -> Result<Self, GatewayError> {
        let lowered = input.trim().to_lowercase();
        let without_scheme = SCHEME.replace(&lowered, "");
        let without_www = without_scheme
            .strip_prefix("www.")
            .unwrap_or(without_scheme.as_ref());
        let host = without_www
            .split(['/', '?', '#', ':'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('.');

        if host.is_empty() || host.len() > MAX_DOMAIN_LEN {
            return Err(GatewayError::InvalidDomain(input.to_string()));
        }
        if !host.split('.').all(|label| LABEL.is_match(label)) {
            return Err(GatewayError::InvalidDomain(input.to_string()));
        }

        Ok(Self(host.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ControlledDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ControlledDomain {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ControlledDomain> for String {
    fn from(domain: ControlledDomain) -> Self {
        domain.0
    }
}

impl AsRef<str> for ControlledDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalizes_url_input() {
        let domain = ControlledDomain::parse("  HTTPS://www.Example.COM/login?x=1 ").unwrap();
        assert_eq!(domain.as_str(), "example.com");
    }

    #[test]
    fn test_keeps_non_www_subdomain() {
        let domain = ControlledDomain::parse("mail.google.com").unwrap();
        assert_eq!(domain.as_str(), "mail.google.com");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(ControlledDomain::parse("").is_err());
        assert!(ControlledDomain::parse("http://").is_err());
        assert!(ControlledDomain::parse("bad_domain.com").is_err());
        assert!(ControlledDomain::parse("-leading.com").is_err());
        assert!(ControlledDomain::parse("a..com").is_err());
        assert!(matches!(
            ControlledDomain::parse("exa mple.com"),
            Err(GatewayError::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_rejects_overlong_domain() {
        let long = format!("{}.com", vec!["a".repeat(63); 4].join("."));
        assert!(long.len() > MAX_DOMAIN_LEN);
        assert!(ControlledDomain::parse(&long).is_err());
    }

    #[test]
    fn test_port_is_stripped() {
        for input in ["https://bank.com:8443/login", "bank.com:443", "www.Bank.com:80?x=1"] {
            assert_eq!(ControlledDomain::parse(input).unwrap().as_str(), "bank.com", "{input}");
        }
        assert!(ControlledDomain::parse("https://:8443/").is_err());
    }

    #[test]
    fn test_serde_rejects_invalid_entries() {
        let ok: ControlledDomain = serde_json::from_str("\"WWW.bank.com\"").unwrap();
        assert_eq!(ok.as_str(), "bank.com");
        assert!(serde_json::from_str::<ControlledDomain>("\"not a domain\"").is_err());
    }
}
