//! Configuration validation system.

use regex::Regex;

use super::types::Config;

/// Upper bound on `repeater.pool_size`.
pub const MAX_POOL_SIZE: usize = 1024;

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// Get all validation issues.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get only errors (not warnings).
    #[must_use]
    pub fn errors_only(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Error)
            .collect()
    }

    /// Get only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &Config) -> ValidationResult;
}

/// Structural checks on the listener and destinations.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &Config) -> ValidationResult {
        let mut result = ValidationResult::new();
        let repeater = &config.repeater;

        if config.listener.max_datagram_size == 0 {
            result.add_error(ValidationError::error(
                "listener.max_datagram_size",
                "Maximum datagram size cannot be 0",
            ));
        }

        if repeater.pool_size == 0 || repeater.pool_size > MAX_POOL_SIZE {
            result.add_error(ValidationError::error(
                "repeater.pool_size",
                format!("Pool size must be between 1 and {MAX_POOL_SIZE}"),
            ));
        }

        if repeater.destinations.is_empty() {
            result.add_error(ValidationError::warning(
                "repeater.destinations",
                "No destinations configured, packets will be discarded",
            ));
        }

        for (i, destination) in repeater.destinations.iter().enumerate() {
            let field = format!("repeater.destinations[{i}]");

            if destination.host.trim().is_empty() {
                result.add_error(ValidationError::error(
                    format!("{field}.host"),
                    "Destination host cannot be empty",
                ));
            }

            if destination.port == 0 {
                result.add_error(ValidationError::error(
                    format!("{field}.port"),
                    "Destination port cannot be 0",
                ));
            }

            if destination.rules.is_empty() {
                result.add_error(ValidationError::warning(
                    format!("{field}.rules"),
                    format!(
                        "Destination {}:{} has no rules and will receive nothing",
                        destination.host, destination.port
                    ),
                ));
            }
        }

        result
    }
}

/// Validator that compiles every destination rule.
#[derive(Debug, Default)]
pub struct RuleValidator;

impl RuleValidator {
    /// Create a new rule validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for RuleValidator {
    fn validate(&self, config: &Config) -> ValidationResult {
        let mut result = ValidationResult::new();

        for (i, destination) in config.repeater.destinations.iter().enumerate() {
            for (j, pattern) in destination.rules.iter().enumerate() {
                if let Err(e) = Regex::new(pattern) {
                    result.add_error(ValidationError::error(
                        format!("repeater.destinations[{i}].rules[{j}]"),
                        format!("Invalid rule '{pattern}': {e}"),
                    ));
                }
            }
        }

        result
    }
}
