//! Settings read from the environment.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DYNOSCOPE_PROFILE` / `AWS_PROFILE` | Credential profile | SDK default chain |
//! | `DYNOSCOPE_REGION` / `AWS_REGION` | Region | SDK default chain |
//! | `DYNOSCOPE_ENDPOINT_URL` | Endpoint override | (none) |
//! | `DYNOSCOPE_PAGE_SIZE` | Items per scan/query request, clamped to 1..=1000 | `50` |

use crate::aws::dynamodb::connection::ConnectionConfig;
use crate::aws::dynamodb::model::MAX_PAGE_LIMIT;
use std::env;

pub const DEFAULT_PAGE_SIZE: i32 = 50;

/// Runtime settings of the browser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub page_size: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        Settings {
            connection: ConnectionConfig {
                profile: read(&["DYNOSCOPE_PROFILE", "AWS_PROFILE"]),
                region: read(&["DYNOSCOPE_REGION", "AWS_REGION"]),
                endpoint_url: read(&["DYNOSCOPE_ENDPOINT_URL"]),
            },
            page_size: read(&["DYNOSCOPE_PAGE_SIZE"])
                .map(|value| parse_page_size(&value))
                .unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }

    /// Applies explicitly given values on top of these settings.
    pub fn overridden(
        mut self,
        profile: Option<String>,
        region: Option<String>,
        endpoint_url: Option<String>,
    ) -> Self {
        if profile.is_some() {
            self.connection.profile = profile;
        }
        if region.is_some() {
            self.connection.region = region;
        }
        if endpoint_url.is_some() {
            self.connection.endpoint_url = endpoint_url;
        }

        self
    }
}

fn parse_page_size(value: &str) -> i32 {
    match value.parse::<i64>() {
        Ok(size) => {
            let clamped = size.clamp(1, MAX_PAGE_LIMIT as i64) as i32;
            if clamped as i64 != size {
                tracing::warn!(
                    "DYNOSCOPE_PAGE_SIZE {} is out of range, using {} instead",
                    size,
                    clamped
                );
            }
            clamped
        }
        Err(_) => {
            tracing::warn!(
                "DYNOSCOPE_PAGE_SIZE '{}' is not a number, using {} instead",
                value,
                DEFAULT_PAGE_SIZE
            );
            DEFAULT_PAGE_SIZE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        assert_eq!(settings(&[]), Settings::default());
    }

    #[test]
    fn own_variables_win_over_aws_ones() {
        let settings = settings(&[
            ("AWS_PROFILE", "aws"),
            ("DYNOSCOPE_PROFILE", "mine"),
            ("AWS_REGION", "eu-west-1"),
            ("DYNOSCOPE_REGION", " "),
            ("DYNOSCOPE_ENDPOINT_URL", "http://localhost:8000"),
        ]);

        assert_eq!(settings.connection.profile.as_deref(), Some("mine"));
        assert_eq!(settings.connection.region.as_deref(), Some("eu-west-1"));
        assert_eq!(
            settings.connection.endpoint_url.as_deref(),
            Some("http://localhost:8000")
        );
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(settings(&[("DYNOSCOPE_PAGE_SIZE", "200")]).page_size, 200);
        assert_eq!(settings(&[("DYNOSCOPE_PAGE_SIZE", "0")]).page_size, 1);
        assert_eq!(settings(&[("DYNOSCOPE_PAGE_SIZE", "5000")]).page_size, 1000);
        assert_eq!(settings(&[("DYNOSCOPE_PAGE_SIZE", "many")]).page_size, 50);
    }

    #[test]
    fn explicit_values_override() {
        let settings = settings(&[("AWS_PROFILE", "aws"), ("AWS_REGION", "eu-west-1")])
            .overridden(None, Some("us-east-1".to_string()), None);

        assert_eq!(settings.connection.profile.as_deref(), Some("aws"));
        assert_eq!(settings.connection.region.as_deref(), Some("us-east-1"));
    }
}
