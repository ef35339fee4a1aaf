//! Forwarding destinations and their filter rules.

use std::fmt;

use regex::Regex;

use crate::config::DestinationConfig;

use super::error::{RepeaterError, RepeaterResult};

/// An ordered set of compiled filter rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Regex>,
}

impl RuleSet {
    /// Compile a rule set from patterns, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile along with the regex error.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, (String, regex::Error)> {
        let rules = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()).map_err(|e| (p.as_ref().to_string(), e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// The rules in match order.
    #[inline]
    #[must_use]
    pub fn rules(&self) -> &[Regex] {
        &self.rules
    }

    /// Number of rules.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if there are no rules (nothing is forwarded).
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A remote host/port plus the rules deciding which lines it receives.
#[derive(Debug, Clone)]
pub struct Destination {
    host: String,
    port: u16,
    rules: RuleSet,
    name: String,
}

impl Destination {
    /// Create a destination.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, rules: RuleSet) -> Self {
        let host = host.into();
        let name = format!("{host}:{port}");
        Self {
            host,
            port,
            rules,
            name,
        }
    }

    /// Build a destination from its configuration, compiling the rules.
    ///
    /// # Errors
    ///
    /// Returns `RepeaterError::InvalidRule` if any pattern does not compile.
    pub fn from_config(config: &DestinationConfig) -> RepeaterResult<Self> {
        let rules = RuleSet::compile(&config.rules).map_err(|(pattern, source)| {
            RepeaterError::InvalidRule {
                destination: format!("{}:{}", config.host, config.port),
                pattern,
                source,
            }
        })?;
        Ok(Self::new(config.host.clone(), config.port, rules))
    }

    /// Remote host name or address literal.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remote port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Filter rules.
    #[inline]
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// `host:port` identifier.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
