//! Post-merge validation.

use std::net::SocketAddr;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Largest batch a document store accepts.
pub const MAX_BATCH_SIZE: usize = 500;

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError::ValidationError`] found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_gateway(config)?;
    validate_storage(config)?;
    validate_rate_limits(config)?;
    validate_quota(config)?;
    validate_primary(config)?;
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(ConfigError::invalid(
            "logging.format",
            format!("unsupported format '{}'; expected pretty, compact, json or full", l.format),
        ));
    }
    if !matches!(l.target.as_str(), "stdout" | "stderr" | "file") {
        return Err(ConfigError::invalid(
            "logging.target",
            format!("unsupported target '{}'; expected stdout, stderr or file", l.target),
        ));
    }
    if l.level.trim().is_empty() {
        return Err(ConfigError::invalid("logging.level", "must not be empty"));
    }
    Ok(())
}

fn validate_gateway(config: &Config) -> ConfigResult<()> {
    if config.gateway.bind.parse::<SocketAddr>().is_err() {
        return Err(ConfigError::invalid(
            "gateway.bind",
            format!("'{}' is not a socket address", config.gateway.bind),
        ));
    }
    if config.gateway.request_body_limit == 0 {
        return Err(ConfigError::invalid(
            "gateway.request_body_limit",
            "must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_storage(config: &Config) -> ConfigResult<()> {
    let s = &config.storage;
    if s.max_batch_size == 0 || s.max_batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::invalid(
            "storage.max_batch_size",
            format!("must be between 1 and {MAX_BATCH_SIZE}"),
        ));
    }
    if s.kv_namespace.is_empty() || s.kv_namespace.contains('/') {
        return Err(ConfigError::invalid(
            "storage.kv_namespace",
            "must be non-empty and must not contain '/'",
        ));
    }
    if s.statement_cache_capacity == 0 {
        return Err(ConfigError::invalid(
            "storage.statement_cache_capacity",
            "must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_rate_limits(config: &Config) -> ConfigResult<()> {
    let r = &config.rate_limits;
    if r.default_limit_per_minute == 0 {
        return Err(ConfigError::invalid(
            "rate_limits.default_limit_per_minute",
            "must be greater than 0",
        ));
    }
    if r.default_burst == 0 {
        return Err(ConfigError::invalid("rate_limits.default_burst", "must be greater than 0"));
    }
    Ok(())
}

fn validate_quota(config: &Config) -> ConfigResult<()> {
    let q = &config.quota;
    if q.global_ceiling == 0 {
        return Err(ConfigError::invalid("quota.global_ceiling", "must be greater than 0"));
    }
    if q.plans.is_empty() {
        return Err(ConfigError::invalid("quota.plans", "at least one plan is required"));
    }
    for (name, plan) in &q.plans {
        if plan.daily_limit == 0 {
            return Err(ConfigError::invalid(
                &format!("quota.plans.{name}.daily_limit"),
                "must be greater than 0",
            ));
        }
        if plan.global_threshold > q.global_ceiling {
            return Err(ConfigError::invalid(
                &format!("quota.plans.{name}.global_threshold"),
                format!(
                    "{} exceeds quota.global_ceiling ({})",
                    plan.global_threshold, q.global_ceiling
                ),
            ));
        }
    }
    Ok(())
}

fn validate_primary(config: &Config) -> ConfigResult<()> {
    let p = &config.primary;
    if let Some(endpoint) = &p.endpoint {
        let parsed = url::Url::parse(endpoint).map_err(|e| {
            ConfigError::invalid("primary.endpoint", format!("'{endpoint}' is not a URL: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "primary.endpoint",
                format!("scheme '{}' is not http or https", parsed.scheme()),
            ));
        }
    }
    if p.timeout_secs == 0 {
        return Err(ConfigError::invalid("primary.timeout_secs", "must be greater than 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlanSection;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        validate(&Config::default()).unwrap();
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = Config::default();
        config.storage.max_batch_size = 501;
        assert_eq!(field_of(validate(&config)), "storage.max_batch_size");
        config.storage.max_batch_size = 0;
        assert_eq!(field_of(validate(&config)), "storage.max_batch_size");
    }

    #[test]
    fn test_threshold_above_ceiling() {
        let mut config = Config::default();
        config.quota.plans.insert(
            "huge".to_owned(),
            PlanSection {
                daily_limit: 1,
                global_threshold: 60_000,
            },
        );
        assert_eq!(
            field_of(validate(&config)),
            "quota.plans.huge.global_threshold"
        );
    }

    #[test]
    fn test_primary_endpoint_scheme() {
        let mut config = Config::default();
        config.primary.endpoint = Some("ftp://db.example.com".to_owned());
        assert_eq!(field_of(validate(&config)), "primary.endpoint");
        config.primary.endpoint = Some("not a url".to_owned());
        assert_eq!(field_of(validate(&config)), "primary.endpoint");
        config.primary.endpoint = Some("https://db.example.com/query".to_owned());
        validate(&config).unwrap();
    }

    #[test]
    fn test_bad_bind_and_format() {
        let mut config = Config::default();
        config.gateway.bind = "localhost".to_owned();
        assert_eq!(field_of(validate(&config)), "gateway.bind");

        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }
}
