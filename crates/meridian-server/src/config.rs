use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use meridian_core::ReferralPolicy;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub api_key: Option<String>,
    pub referral_policy: ReferralPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("MERIDIAN_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MERIDIAN_JWT_SECRET is unset or still a placeholder");
        }

        let defaults = ReferralPolicy::default();
        Ok(Self {
            host: get("MERIDIAN_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "MERIDIAN_PORT", 3000)?,
            db_path: get("MERIDIAN_DB_PATH")
                .unwrap_or_else(|| "meridian.db".into())
                .into(),
            jwt_secret,
            api_key: get("MERIDIAN_API_KEY").filter(|k| !k.is_empty()),
            referral_policy: ReferralPolicy {
                base_referral_points: parse_or(
                    &get,
                    "MERIDIAN_BASE_REFERRAL_POINTS",
                    defaults.base_referral_points,
                )?,
                referral_points: parse_or(
                    &get,
                    "MERIDIAN_REFERRAL_POINTS",
                    defaults.referral_points,
                )?,
                daily_referral_limit: parse_or(
                    &get,
                    "MERIDIAN_DAILY_REFERRAL_LIMIT",
                    defaults.daily_referral_limit,
                )?,
            },
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn placeholder_secrets_are_refused() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(
            Config::from_lookup(lookup(&[("MERIDIAN_JWT_SECRET", "dev-secret-change-me")])).is_err()
        );
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("MERIDIAN_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.referral_policy, ReferralPolicy::default());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("MERIDIAN_JWT_SECRET", "s3cret"),
            ("MERIDIAN_PORT", "8080"),
            ("MERIDIAN_API_KEY", "plugin"),
            ("MERIDIAN_DAILY_REFERRAL_LIMIT", "3"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key.as_deref(), Some("plugin"));
        assert_eq!(config.referral_policy.daily_referral_limit, 3);

        let bad = Config::from_lookup(lookup(&[
            ("MERIDIAN_JWT_SECRET", "s3cret"),
            ("MERIDIAN_PORT", "eighty"),
        ]));
        assert!(bad.is_err());
    }
}
