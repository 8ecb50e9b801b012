//! Service name grammar: `service.implementation`, and the bare
//! `service` prefix used to request the default implementation.

use crate::error::{ChassisError, Result};

/// A validated, already-split service name.
///
/// Construction enforces the grammar from the data model: a full name is
/// `service.implementation` where both halves are non-empty and exactly
/// one dot separates them. A bare name (no dot) is also accepted, and is
/// interpreted as a request for the service's current default
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceName {
    /// `service.implementation`
    Full { service: String, implementation: String },
    /// `service` alone — resolves to the default implementation.
    Bare(String),
}

impl ServiceName {
    /// Parse and validate a name, rejecting more than one dot or an
    /// empty half.
    pub fn parse(name: &str) -> Result<Self> {
        match name.find('.') {
            None => {
                if name.is_empty() {
                    return Err(ChassisError::malformed_name(name));
                }
                Ok(ServiceName::Bare(name.to_string()))
            }
            Some(pos) => {
                let (service, rest) = name.split_at(pos);
                let implementation = &rest[1..];
                if service.is_empty() || implementation.is_empty() || implementation.contains('.') {
                    return Err(ChassisError::malformed_name(name));
                }
                Ok(ServiceName::Full {
                    service: service.to_string(),
                    implementation: implementation.to_string(),
                })
            }
        }
    }

    /// The bare service prefix, regardless of which variant this is.
    pub fn service(&self) -> &str {
        match self {
            ServiceName::Full { service, .. } => service,
            ServiceName::Bare(service) => service,
        }
    }

    /// `true` if this name carries an explicit implementation suffix.
    pub fn is_full(&self) -> bool {
        matches!(self, ServiceName::Full { .. })
    }

    /// Render back to the `service.implementation` or `service` string.
    pub fn to_key(&self) -> String {
        match self {
            ServiceName::Full { service, implementation } => format!("{service}.{implementation}"),
            ServiceName::Bare(service) => service.clone(),
        }
    }
}

/// Split a bare service name out of a full `service.implementation` key,
/// used when collecting the set of services a batch of components
/// provides (the data model's `P` set in the load pipeline).
pub fn bare_service_of(full_name: &str) -> &str {
    match full_name.find('.') {
        Some(pos) => &full_name[..pos],
        None => full_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_name() {
        let n = ServiceName::parse("foo.bar").unwrap();
        assert_eq!(n.service(), "foo");
        assert!(n.is_full());
        assert_eq!(n.to_key(), "foo.bar");
    }

    #[test]
    fn parses_bare_name() {
        let n = ServiceName::parse("foo").unwrap();
        assert_eq!(n.service(), "foo");
        assert!(!n.is_full());
    }

    #[test]
    fn rejects_empty_halves() {
        assert!(ServiceName::parse(".bar").is_err());
        assert!(ServiceName::parse("foo.").is_err());
        assert!(ServiceName::parse("").is_err());
    }

    #[test]
    fn rejects_multiple_dots() {
        assert!(ServiceName::parse("foo.bar.baz").is_err());
    }

    #[test]
    fn bare_service_of_strips_suffix() {
        assert_eq!(bare_service_of("foo.bar"), "foo");
        assert_eq!(bare_service_of("foo"), "foo");
    }
}
