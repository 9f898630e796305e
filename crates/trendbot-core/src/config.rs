use std::collections::BTreeMap;

use chrono::NaiveTime;

use crate::app_config::{
    AppConfig, Environment, PublisherSettings, SourceSettings, SummarizerSettings,
};
use crate::items::Source;
use crate::ConfigError;

const DEFAULT_TWITTER_QUERY: &str =
    "(AI OR rust OR programming OR opensource) -is:retweet -is:reply lang:en";
const DEFAULT_SUBREDDITS: &str = "technology,programming,MachineLearning,rust";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    load_app_config_from_lookup(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual
/// environment so it can be driven by a plain `HashMap` in tests.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_lookup<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let positive_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let value = parse_u64(var, default)?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero".to_string()));
        }
        Ok(value)
    };

    let database_url = or_default("DATABASE_URL", "sqlite://data/trends.db?mode=rwc");
    let env = parse_environment(&or_default("TRENDBOT_ENV", "development"))?;
    let log_level = or_default("TRENDBOT_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("TRENDBOT_DB_MAX_CONNECTIONS", "5")?;
    let db_acquire_timeout_secs = parse_u64("TRENDBOT_DB_ACQUIRE_TIMEOUT_SECS", "30")?;

    let mut sources = BTreeMap::new();
    for (source, limit, max_calls, window) in [
        (Source::Twitter, "50", "15", "900"),
        (Source::Github, "30", "30", "60"),
        (Source::Reddit, "30", "60", "60"),
        (Source::Hackernews, "20", "30", "60"),
    ] {
        let prefix = format!("TRENDBOT_{}", source.as_str().to_ascii_uppercase());
        let settings = SourceSettings {
            limit: parse_usize(&format!("{prefix}_LIMIT"), limit)?,
            rate_max_calls: parse_u32(&format!("{prefix}_RATE_MAX_CALLS"), max_calls)?,
            rate_window_secs: positive_u64(&format!("{prefix}_RATE_WINDOW_SECS"), window)?,
        };
        sources.insert(source, settings);
    }

    let source_timeout_secs = positive_u64("TRENDBOT_SOURCE_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("TRENDBOT_USER_AGENT", "trendbot/0.1 (trend-collector)");
    let twitter_bearer_token = optional("TWITTER_BEARER_TOKEN");
    let github_token = optional("GITHUB_TOKEN");
    let twitter_query = or_default("TRENDBOT_TWITTER_QUERY", DEFAULT_TWITTER_QUERY);
    let reddit_subreddits = split_list(&or_default("TRENDBOT_REDDIT_SUBREDDITS", DEFAULT_SUBREDDITS));

    let daily_post_limit = parse_u32("TRENDBOT_DAILY_POST_LIMIT", "3")?;
    let collection_interval_hours = positive_u64("TRENDBOT_COLLECTION_INTERVAL_HOURS", "2")?;
    let analysis_interval_hours = positive_u64("TRENDBOT_ANALYSIS_INTERVAL_HOURS", "12")?;
    let analysis_hours_back = parse_u32("TRENDBOT_ANALYSIS_HOURS_BACK", "24")?;
    if analysis_hours_back == 0 {
        return Err(invalid(
            "TRENDBOT_ANALYSIS_HOURS_BACK",
            "must be greater than zero".to_string(),
        ));
    }
    let analysis_max_items = parse_usize("TRENDBOT_ANALYSIS_MAX_ITEMS", "30")?;
    let publish_times = parse_publish_times(&or_default(
        "TRENDBOT_PUBLISH_TIMES",
        "09:00,15:00,21:00",
    ))?;
    let cleanup_interval_hours = positive_u64("TRENDBOT_CLEANUP_INTERVAL_HOURS", "24")?;
    let retention_days = parse_u32("TRENDBOT_RETENTION_DAYS", "30")?;

    let summarizer = SummarizerSettings {
        api_key: optional("OPENAI_API_KEY"),
        base_url: or_default("OPENAI_BASE_URL", "https://api.openai.com/v1"),
        model: or_default("OPENAI_MODEL", "gpt-4o-mini"),
        timeout_secs: positive_u64("TRENDBOT_SUMMARIZE_TIMEOUT_SECS", "60")?,
    };

    let publisher = PublisherSettings {
        access_token: optional("TWITTER_USER_ACCESS_TOKEN"),
        base_url: or_default("TWITTER_API_BASE_URL", "https://api.twitter.com"),
        timeout_secs: positive_u64("TRENDBOT_PUBLISH_TIMEOUT_SECS", "30")?,
    };

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_acquire_timeout_secs,
        sources,
        source_timeout_secs,
        user_agent,
        twitter_bearer_token,
        github_token,
        twitter_query,
        reddit_subreddits,
        daily_post_limit,
        collection_interval_hours,
        analysis_interval_hours,
        analysis_hours_back,
        analysis_max_items,
        publish_times,
        cleanup_interval_hours,
        retention_days,
        summarizer,
        publisher,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TRENDBOT_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

/// Parse a comma-separated list of `HH:MM` times, sorted and deduplicated.
fn parse_publish_times(raw: &str) -> Result<Vec<NaiveTime>, ConfigError> {
    let mut times = Vec::new();
    for part in split_list(raw) {
        let time = NaiveTime::parse_from_str(&part, "%H:%M").map_err(|e| {
            ConfigError::InvalidEnvVar {
                var: "TRENDBOT_PUBLISH_TIMES".to_string(),
                reason: format!("'{part}': {e}"),
            }
        })?;
        times.push(time);
    }
    if times.is_empty() {
        return Err(ConfigError::InvalidEnvVar {
            var: "TRENDBOT_PUBLISH_TIMES".to_string(),
            reason: "at least one time is required".to_string(),
        });
    }
    times.sort_unstable();
    times.dedup();
    Ok(times)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::*;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    #[test]
    fn parse_environment_accepts_known_values() {
        assert_eq!(
            parse_environment("development").unwrap(),
            Environment::Development
        );
        assert_eq!(parse_environment("test").unwrap(), Environment::Test);
        assert_eq!(
            parse_environment("production").unwrap(),
            Environment::Production
        );
    }

    #[test]
    fn parse_environment_unknown_fails() {
        let err = parse_environment("staging").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "TRENDBOT_ENV"));
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let map = HashMap::new();
        let cfg = load_app_config_from_lookup(lookup_from_map(&map)).unwrap();

        assert_eq!(cfg.env, Environment::Development);
        assert_eq!(cfg.database_url, "sqlite://data/trends.db?mode=rwc");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.daily_post_limit, 3);
        assert_eq!(cfg.collection_interval_hours, 2);
        assert_eq!(cfg.analysis_interval_hours, 12);
        assert_eq!(cfg.analysis_hours_back, 24);
        assert_eq!(cfg.analysis_max_items, 30);
        assert_eq!(cfg.cleanup_interval_hours, 24);
        assert_eq!(cfg.retention_days, 30);
        assert_eq!(cfg.source_settings(Source::Twitter).limit, 50);
        assert_eq!(cfg.source_settings(Source::Github).limit, 30);
        assert_eq!(cfg.source_settings(Source::Reddit).limit, 30);
        assert_eq!(cfg.source_settings(Source::Hackernews).limit, 20);
        assert_eq!(cfg.source_settings(Source::Twitter).rate_window_secs, 900);
        assert!(cfg.twitter_bearer_token.is_none());
        assert!(cfg.summarizer.api_key.is_none());
        assert_eq!(cfg.reddit_subreddits.len(), 4);
        assert_eq!(
            cfg.publish_times,
            vec![
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn per_source_overrides_are_applied() {
        let mut map = HashMap::new();
        map.insert("TRENDBOT_GITHUB_LIMIT", "5");
        map.insert("TRENDBOT_GITHUB_RATE_MAX_CALLS", "2");
        map.insert("TRENDBOT_GITHUB_RATE_WINDOW_SECS", "120");
        let cfg = load_app_config_from_lookup(lookup_from_map(&map)).unwrap();

        assert_eq!(
            cfg.source_settings(Source::Github),
            SourceSettings {
                limit: 5,
                rate_max_calls: 2,
                rate_window_secs: 120,
            }
        );
    }

    #[test]
    fn zero_rate_window_is_rejected() {
        let mut map = HashMap::new();
        map.insert("TRENDBOT_REDDIT_RATE_WINDOW_SECS", "0");
        let result = load_app_config_from_lookup(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "TRENDBOT_REDDIT_RATE_WINDOW_SECS"),
            "expected InvalidEnvVar(TRENDBOT_REDDIT_RATE_WINDOW_SECS), got: {result:?}"
        );
    }

    #[test]
    fn daily_post_limit_invalid() {
        let mut map = HashMap::new();
        map.insert("TRENDBOT_DAILY_POST_LIMIT", "three");
        let result = load_app_config_from_lookup(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "TRENDBOT_DAILY_POST_LIMIT"),
            "expected InvalidEnvVar(TRENDBOT_DAILY_POST_LIMIT), got: {result:?}"
        );
    }

    #[test]
    fn publish_times_are_sorted_and_deduplicated() {
        let times = parse_publish_times("21:00, 09:30,21:00").unwrap();
        assert_eq!(
            times,
            vec![
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn publish_times_reject_garbage() {
        let err = parse_publish_times("9am").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "TRENDBOT_PUBLISH_TIMES"));
        assert!(parse_publish_times(" , ").is_err());
    }

    #[test]
    fn blank_secrets_are_treated_as_unset() {
        let mut map = HashMap::new();
        map.insert("OPENAI_API_KEY", "  ");
        map.insert("TWITTER_USER_ACCESS_TOKEN", "token");
        let cfg = load_app_config_from_lookup(lookup_from_map(&map)).unwrap();
        assert!(cfg.summarizer.api_key.is_none());
        assert_eq!(cfg.publisher.access_token.as_deref(), Some("token"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut map = HashMap::new();
        map.insert("OPENAI_API_KEY", "sk-secret");
        map.insert("TWITTER_BEARER_TOKEN", "bearer-secret");
        let cfg = load_app_config_from_lookup(lookup_from_map(&map)).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(!rendered.contains("bearer-secret"));
        assert!(rendered.contains("[redacted]"));
    }
}
