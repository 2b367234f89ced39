// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

use std::path::Path;
use argh::FromArgs;
use serde::Deserialize;
use crate::session::{Policy, TimeFormat};
use crate::system::negotiate::{NegotiateError, RequestedLevel};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// include allow events and multicast/broadcast noise
    pub show_all: bool,
    pub show_ipv4: bool,
    pub show_ipv6: bool,
    /// keep only events of the logged-on user
    pub own_user_only: bool,
    pub exclude_addresses: Vec<String>,
    pub exclude_programs: Vec<String>,
    /// display width used for wrapped lines
    pub screen_width: usize,
    /// pin the notification api level, 0-4; absent means the default
    /// with graceful step-down
    pub api_level: Option<u8>,
    /// deadline for one blocking registration call
    pub negotiate_timeout_ms: u64,
    pub time_format: TimeFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            show_all: false,
            show_ipv4: true,
            show_ipv6: true,
            own_user_only: false,
            exclude_addresses: Vec::new(),
            exclude_programs: Vec::new(),
            screen_width: 100,
            api_level: None,
            negotiate_timeout_ms: 5000,
            time_format: TimeFormat::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn requested_level(&self) -> Result<RequestedLevel, NegotiateError> {
        RequestedLevel::from_config(self.api_level)
    }

    /// Derive the per-session filter policy. When show-all is off the
    /// monitor's own module joins the program exclusion list, its own
    /// traffic is noise.
    pub fn policy(&self) -> Policy {
        let mut exclude_programs = self.exclude_programs.clone();
        if !self.show_all {
            if let Ok(own) = std::env::current_exe() {
                exclude_programs.push(own.to_string_lossy().to_string());
            }
        }
        Policy {
            show_all: self.show_all,
            show_ipv4: self.show_ipv4,
            show_ipv6: self.show_ipv6,
            own_user_only: self.own_user_only,
            exclude_addresses: self.exclude_addresses.clone(),
            exclude_programs,
            logged_on_user: logged_on_user(),
        }
    }
}

fn logged_on_user() -> String {
    std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_default()
}

#[derive(FromArgs, Debug)]
/// Monitor of the platform packet-filter net events.
pub struct CliArgs {
    #[argh(option, default = "\"wfp-monitor.toml\".to_string()")]
    /// path to the configuration file
    pub config: String,
    #[argh(option)]
    /// pin the notification api level (0-4)
    pub api_level: Option<u8>,
    #[argh(switch)]
    /// include allow events and multicast/broadcast noise
    pub show_all: bool,
    #[argh(option)]
    /// display width for wrapped lines
    pub width: Option<usize>,
    #[argh(switch)]
    /// dump the recorded event window and exit
    pub dump: bool,
}

impl CliArgs {
    pub fn from_env() -> Self {
        argh::from_env()
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(level) = self.api_level {
            config.api_level = Some(level);
        }
        if self.show_all {
            config.show_all = true;
        }
        if let Some(width) = self.width {
            config.screen_width = width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.show_ipv4 && config.show_ipv6);
        assert!(!config.show_all);
        assert_eq!(config.api_level, None);
        assert_eq!(config.screen_width, 100);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            show_ipv6 = false
            api_level = 2
            exclude_programs = ["svchost.exe"]
            time_format = "relative"
            "#,
        )
        .unwrap();
        assert!(!config.show_ipv6);
        assert!(config.show_ipv4);
        assert_eq!(config.api_level, Some(2));
        assert_eq!(config.exclude_programs, vec!["svchost.exe".to_string()]);
        assert_eq!(config.time_format, crate::session::TimeFormat::Relative);
    }

    #[test]
    fn pinned_level_out_of_range_is_rejected() {
        let config: Config = toml::from_str("api_level = 9").unwrap();
        assert!(config.requested_level().is_err());
    }
}
