//! # settings: Process settings
//!
//! Read once at startup from the environment (`.env` is loaded by `main`).
//! Unlike [`crate::config::FollowConfig`], nothing here changes at runtime.
//!
//! | Variable              | Default                  |
//! |-----------------------|--------------------------|
//! | `API_URL`             | `https://nof1.ai/api`    |
//! | `POLL_INTERVAL_SECS`  | `60`                     |
//! | `MONITORED_MODELS`    | all models               |
//! | `DATA_DIR`            | `.`                      |
//! | `SAVE_HISTORY_DATA`   | `false`                  |
//! | `CONFIG_PATH`         | `bitget_config.json`     |
//! | `BITGET_TRADING_MODE` | unset = monitor only     |
//! | `BITGET_API_URL`      | `https://api.bitget.com` |
//! | `BIND_ADDR`           | `0.0.0.0:5010`           |
//! | `LOG_DIR`             | `logs`                   |

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context};

use crate::engine::dispatcher::TradingMode;
use crate::exchange::BitgetCredentials;

const DEFAULT_API_URL: &str = "https://nof1.ai/api";
const DEFAULT_BITGET_URL: &str = "https://api.bitget.com";
const DEFAULT_POLL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url:          String,
    pub poll_interval:    u64,
    pub monitored_models: Vec<String>,
    pub data_dir:         PathBuf,
    pub save_history:     bool,
    pub config_path:      PathBuf,
    pub log_dir:          PathBuf,
    pub bind_addr:        SocketAddr,
    /// Empty = HTTP API open.
    pub api_key:          String,

    // ── Notifications ────────────────────────────────────────────────────────
    pub wechat_webhook:   Option<String>,
    pub telegram_token:   Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_proxy:   Option<String>,

    // ── Exchange ─────────────────────────────────────────────────────────────
    /// `None` = monitor only.
    pub trading_mode:     Option<TradingMode>,
    pub bitget_url:       String,
    pub live_creds:       BitgetCredentials,
    pub demo_creds:       BitgetCredentials,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let poll_interval = match get("POLL_INTERVAL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .with_context(|| format!("POLL_INTERVAL_SECS must be a positive integer, got '{raw}'"))?,
            None => DEFAULT_POLL_SECS,
        };

        let bind_addr = or("BIND_ADDR", "0.0.0.0:5010")
            .parse()
            .context("BIND_ADDR is not a socket address")?;

        let trading_mode = get("BITGET_TRADING_MODE")
            .map(|raw| raw.parse::<TradingMode>())
            .transpose()
            .map_err(anyhow::Error::msg)?;

        let live_creds = BitgetCredentials {
            api_key:    or("BITGET_API_KEY", ""),
            secret_key: or("BITGET_SECRET_KEY", ""),
            passphrase: or("BITGET_PASSPHRASE", ""),
        };
        let demo_creds = BitgetCredentials {
            api_key:    or("BITGET_DEMO_API_KEY", ""),
            secret_key: or("BITGET_DEMO_SECRET_KEY", ""),
            passphrase: or("BITGET_DEMO_PASSPHRASE", ""),
        };

        if let Some(mode) = trading_mode {
            if mode.uses_demo() && !demo_creds.is_complete() {
                bail!("BITGET_TRADING_MODE={mode} needs BITGET_DEMO_API_KEY, BITGET_DEMO_SECRET_KEY and BITGET_DEMO_PASSPHRASE");
            }
            if mode.uses_live() && !live_creds.is_complete() {
                bail!("BITGET_TRADING_MODE={mode} needs BITGET_API_KEY, BITGET_SECRET_KEY and BITGET_PASSPHRASE");
            }
        }

        Ok(Self {
            api_url:          or("API_URL", DEFAULT_API_URL),
            poll_interval,
            monitored_models: get("MONITORED_MODELS").map(|raw| split_list(&raw)).unwrap_or_default(),
            data_dir:         or("DATA_DIR", ".").into(),
            save_history:     get("SAVE_HISTORY_DATA").is_some_and(|v| is_truthy(&v)),
            config_path:      or("CONFIG_PATH", "bitget_config.json").into(),
            log_dir:          or("LOG_DIR", "logs").into(),
            bind_addr,
            api_key:          or("API_KEY", ""),
            wechat_webhook:   get("WECHAT_WEBHOOK_URL"),
            telegram_token:   get("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
            telegram_proxy:   get("TELEGRAM_PROXY"),
            trading_mode,
            bitget_url:       or("BITGET_API_URL", DEFAULT_BITGET_URL),
            live_creds,
            demo_creds,
        })
    }

    /// Human label for notices and logs.
    pub fn trading_label(&self) -> String {
        match self.trading_mode {
            Some(mode) => mode.to_string(),
            None => "monitor only".to_string(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_are_monitor_only() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.api_url, "https://nof1.ai/api");
        assert_eq!(s.poll_interval, 60);
        assert!(s.monitored_models.is_empty());
        assert!(s.trading_mode.is_none());
        assert_eq!(s.trading_label(), "monitor only");
        assert_eq!(s.bind_addr.port(), 5010);
        assert!(!s.save_history);
    }

    #[test]
    fn lists_and_flags_are_parsed() {
        let s = settings(&[
            ("MONITORED_MODELS", " gpt-5, ,claude-sonnet-4-5 "),
            ("SAVE_HISTORY_DATA", "Yes"),
            ("POLL_INTERVAL_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(s.monitored_models, vec!["gpt-5", "claude-sonnet-4-5"]);
        assert!(s.save_history);
        assert_eq!(s.poll_interval, 30);
    }

    #[test]
    fn configured_mode_requires_credentials() {
        let err = settings(&[("BITGET_TRADING_MODE", "1")]).unwrap_err();
        assert!(err.to_string().contains("BITGET_API_KEY"));

        let s = settings(&[
            ("BITGET_TRADING_MODE", "demo"),
            ("BITGET_DEMO_API_KEY", "k"),
            ("BITGET_DEMO_SECRET_KEY", "s"),
            ("BITGET_DEMO_PASSPHRASE", "p"),
        ])
        .unwrap();
        assert_eq!(s.trading_mode, Some(TradingMode::DemoOnly));
    }

    #[test]
    fn paper_needs_no_credentials() {
        let s = settings(&[("BITGET_TRADING_MODE", "paper")]).unwrap();
        assert_eq!(s.trading_mode, Some(TradingMode::Paper));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(settings(&[("BITGET_TRADING_MODE", "7")]).is_err());
        assert!(settings(&[("POLL_INTERVAL_SECS", "0")]).is_err());
    }
}
