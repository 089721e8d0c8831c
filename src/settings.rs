use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{Error, Result};

/// Runtime configuration of the operator
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// The namespace every watcher is scoped to
    pub namespace: String,

    /// Directory holding the manifests of required objects
    pub assets_dir: PathBuf,

    /// How long watchers get to finish their initial listing before the first pass
    pub settle_delay: Duration,

    /// Period between reconciliation passes
    pub sync_interval: Duration,

    /// Coalescing window of the startup trigger
    pub trigger_window: Duration,

    /// Whether the startup trigger may fire again after it has run
    pub trigger_rearm: bool,

    /// Consecutive watch errors tolerated before a watcher gives up
    pub watch_error_budget: usize,

    /// Abort startup when the required objects cannot be loaded
    pub fail_on_load_error: bool,

    /// Address the diagnostics server binds to
    pub listen_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
            assets_dir: PathBuf::from("assets"),
            settle_delay: Duration::from_secs(5),
            sync_interval: Duration::from_secs(60),
            trigger_window: Duration::from_secs(1),
            trigger_rearm: true,
            watch_error_budget: 10,
            fail_on_load_error: false,
            listen_addr: "0.0.0.0:8080".into(),
        }
    }
}

impl Settings {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` yields for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            namespace: lookup("WATCH_NAMESPACE").unwrap_or(defaults.namespace),
            assets_dir: lookup("ASSETS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.assets_dir),
            settle_delay: parse(&lookup, "SETTLE_DELAY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.settle_delay),
            sync_interval: match parse::<u64>(&lookup, "SYNC_INTERVAL_SECS")? {
                Some(0) => {
                    return Err(Error::Config {
                        name: "SYNC_INTERVAL_SECS",
                        reason: "must be greater than zero".into(),
                    })
                }
                Some(secs) => Duration::from_secs(secs),
                None => defaults.sync_interval,
            },
            trigger_window: parse(&lookup, "TRIGGER_WINDOW_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.trigger_window),
            trigger_rearm: parse(&lookup, "TRIGGER_REARM")?.unwrap_or(defaults.trigger_rearm),
            watch_error_budget: parse(&lookup, "WATCH_ERROR_BUDGET")?
                .unwrap_or(defaults.watch_error_budget),
            fail_on_load_error: parse(&lookup, "FAIL_ON_LOAD_ERROR")?
                .unwrap_or(defaults.fail_on_load_error),
            listen_addr: lookup("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| Error::Config {
                name,
                reason: format!("{raw:?}: {e}"),
            })
        })
        .transpose()
}
