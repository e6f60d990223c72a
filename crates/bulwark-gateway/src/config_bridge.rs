//! Bridge from `bulwark_config::Config` to the domain types each component
//! is built from.

use std::sync::Arc;
use std::time::Duration;

use bulwark_admission::{QuotaConfig, QuotaPlan, RatePlan};
use bulwark_config::{Config, LoggingSection, PrimarySection, QuotaSection};
use bulwark_failover::{LimitClassifier, PrimaryStore, RestPrimaryClient, RestPrimaryConfig};
use bulwark_sql::DatabaseConfig;
use bulwark_telemetry::{LogConfig, LogFormat, LogTarget};

use crate::error::GatewayResult;

/// Logging section to a subscriber configuration.
///
/// Unrecognized names fall back to the defaults; validation rejects them
/// before this point.
#[must_use]
pub fn log_config(section: &LoggingSection) -> LogConfig {
    let format = match section.format.as_str() {
        "pretty" => LogFormat::Pretty,
        "json" => LogFormat::Json,
        "full" => LogFormat::Full,
        _ => LogFormat::Compact,
    };
    let target = match section.target.as_str() {
        "stdout" => LogTarget::Stdout,
        "file" => LogTarget::File,
        _ => LogTarget::Stderr,
    };
    LogConfig {
        level: section.level.clone(),
        format,
        target,
        directory: section.directory.clone(),
        file_prefix: section.file_prefix.clone(),
        directives: section.directives.clone(),
        timestamps: section.timestamps,
        ansi: section.ansi && target != LogTarget::File,
        file_info: section.file_info,
    }
}

/// Plan applied to fields a rate-limit request leaves out.
#[must_use]
pub fn rate_defaults(config: &Config) -> RatePlan {
    RatePlan::new(
        config.rate_limits.default_limit_per_minute,
        config.rate_limits.default_burst,
    )
}

/// Quota section to tracker configuration.
#[must_use]
pub fn quota_config(section: &QuotaSection) -> QuotaConfig {
    QuotaConfig {
        global_ceiling: section.global_ceiling,
        max_sessions: section.max_sessions,
        top_principals: section.top_principals,
        plans: section
            .plans
            .iter()
            .map(|(name, plan)| {
                (
                    name.clone(),
                    QuotaPlan::new(plan.daily_limit, plan.global_threshold),
                )
            })
            .collect(),
    }
}

/// Storage section to database tuning.
#[must_use]
pub fn database_config(config: &Config) -> DatabaseConfig {
    DatabaseConfig {
        max_batch_size: config.storage.max_batch_size,
        statement_cache_capacity: config.storage.statement_cache_capacity,
    }
}

/// The configured primary store, if an endpoint is set.
///
/// # Errors
///
/// Returns an error if the endpoint is unusable.
pub fn primary_store(
    primary: &PrimarySection,
    limit_markers: &[String],
) -> GatewayResult<Option<Arc<dyn PrimaryStore>>> {
    let Some(endpoint) = primary.endpoint.as_deref().filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    let mut rest = RestPrimaryConfig::new(endpoint)
        .with_timeout(Duration::from_secs(primary.timeout_secs))
        .with_classifier(LimitClassifier::new(limit_markers.iter().cloned()));
    if let Some(token) = &primary.api_token {
        rest = rest.with_token(token.clone());
    }
    let client = RestPrimaryClient::new(rest)?;
    Ok(Some(Arc::new(client)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quota_matches_tracker_defaults() {
        let config = Config::default();
        assert_eq!(quota_config(&config.quota), QuotaConfig::default());
    }

    #[test]
    fn test_log_config_file_target_disables_ansi() {
        let mut section = LoggingSection::default();
        section.target = "file".to_owned();
        section.format = "json".to_owned();
        let log = log_config(&section);
        assert_eq!(log.target, LogTarget::File);
        assert_eq!(log.format, LogFormat::Json);
        assert!(!log.ansi);
    }

    #[test]
    fn test_primary_store_optional() {
        let config = Config::default();
        assert!(primary_store(&config.primary, &config.failover.limit_markers)
            .unwrap()
            .is_none());

        let mut section = config.primary.clone();
        section.endpoint = Some("https://db.example.com/query".to_owned());
        section.api_token = Some("tok".to_owned());
        let store = primary_store(&section, &config.failover.limit_markers)
            .unwrap()
            .unwrap();
        assert_eq!(store.name(), "rest");
    }

    #[test]
    fn test_rate_defaults() {
        assert_eq!(rate_defaults(&Config::default()), RatePlan::new(60, 10));
    }
}
