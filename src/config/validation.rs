use std::{collections::HashSet, net::SocketAddr};

use eyre::Result;

use crate::config::models::{
    ClassificationConfig, DispatchConfig, RateLimitConfig, RouteConfig, ServerConfig,
    TelemetryConfig,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Classification conflict detected: {message}")]
    ClassificationConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem found.
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        } else {
            for (path, route) in &config.routes {
                if let Err(mut route_errors) = Self::validate_single_route(path, route) {
                    errors.append(&mut route_errors);
                }
            }
        }

        if let Err(mut limiter_errors) = Self::validate_rate_limit(&config.rate_limit) {
            errors.append(&mut limiter_errors);
        }

        if let Err(mut class_errors) = Self::validate_classification(&config.classification) {
            errors.append(&mut class_errors);
        }

        if let Err(e) = Self::validate_dispatch(&config.dispatch) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_telemetry(&config.telemetry) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate a single upstream route
    fn validate_single_route(path: &str, config: &RouteConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("route path: {path}"),
                message: "Route paths must start with '/'".to_string(),
            });
        }

        if let Err(e) = Self::validate_url(&config.target, &format!("route '{path}' target")) {
            errors.push(e);
        }

        if let Some(var) = &config.target_env {
            if var.trim().is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{path}' target_env"),
                    message: "Environment variable name cannot be empty".to_string(),
                });
            }
        }

        if let Some(rewrite) = &config.path_rewrite {
            if !rewrite.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{path}' path_rewrite"),
                    message: "Path rewrite must start with '/'".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    /// Validate the process-wide token bucket parameters
    fn validate_rate_limit(config: &RateLimitConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.token_limit == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.token_limit".to_string(),
                message: "Token limit must be greater than 0".to_string(),
            });
        }

        if config.tokens_per_period == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.tokens_per_period".to_string(),
                message: "Tokens per period must be greater than 0".to_string(),
            });
        }

        match config.period() {
            Ok(period) if period.is_zero() => errors.push(ValidationError::InvalidField {
                field: "rate_limit.replenishment_period".to_string(),
                message: "Replenishment period must be greater than 0".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidField {
                field: "rate_limit.replenishment_period".to_string(),
                message: format!(
                    "Invalid period '{}': {e} (use values like '1s', '30s', '1m')",
                    config.replenishment_period
                ),
            }),
        }

        if config.retry_after_secs == Some(0) {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.retry_after_secs".to_string(),
                message: "Retry-After must be at least 1 second when set".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate the route classification table
    fn validate_classification(
        config: &ClassificationConfig,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (field, prefixes) in [
            ("classification.public", &config.public),
            ("classification.auth_exempt", &config.auth_exempt),
        ] {
            for prefix in prefixes {
                if !prefix.starts_with('/') {
                    errors.push(ValidationError::InvalidField {
                        field: field.to_string(),
                        message: format!("Prefix '{prefix}' must start with '/'"),
                    });
                }
            }
        }

        let public: HashSet<String> = config.public.iter().map(|p| p.to_lowercase()).collect();
        for prefix in &config.auth_exempt {
            if public.contains(&prefix.to_lowercase()) {
                errors.push(ValidationError::ClassificationConflict {
                    message: format!("Prefix '{prefix}' is listed as both public and auth_exempt"),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_dispatch(config: &DispatchConfig) -> ValidationResult<()> {
        if config.timeout_secs == 0 {
            return Err(ValidationError::InvalidField {
                field: "dispatch.timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    fn validate_telemetry(config: &TelemetryConfig) -> ValidationResult<()> {
        match &config.otlp_endpoint {
            Some(endpoint) => Self::validate_url(endpoint, "telemetry.otlp_endpoint"),
            None => Ok(()),
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
