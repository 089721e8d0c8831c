use thiserror::Error;

/// Expose all controller components used by main
pub mod operator;
pub mod settings;
pub mod watchers;

pub mod existing;
pub mod key;
pub mod lifetime;
pub mod required;
pub mod store;
pub mod trigger;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::Metrics;

#[cfg(test)]
pub(crate) mod fixtures;

pub use key::ObjectKey;
pub use lifetime::{Cause, Lifetime};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Watch of {kind} failed after {errors} consecutive errors: {source}")]
    WatchFailed {
        kind: String,
        errors: usize,
        #[source]
        source: kube::runtime::watcher::Error,
    },

    #[error("Could not read definition {path}: {source}")]
    ReadDefinition {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse definition {path}: {source}")]
    ParseDefinition {
        path: std::path::PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Could not load required objects from {path}: {source}")]
    Load {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid setting {name}: {reason}")]
    Config { name: &'static str, reason: String },

    #[error("Metrics Error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Reconciliation cancelled: {0}")]
    Cancelled(Cause),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(kube::Error::Api(response)) => response.reason.to_lowercase(),
            Error::KubeError(_) => "kubeerror".into(),
            Error::WatchFailed { .. } => "watchfailed".into(),
            Error::ReadDefinition { .. } => "readdefinition".into(),
            Error::ParseDefinition { .. } => "parsedefinition".into(),
            Error::Load { .. } => "load".into(),
            Error::Config { .. } => "config".into(),
            Error::MetricsError(_) => "metricserror".into(),
            Error::Cancelled(_) => "cancelled".into(),
        }
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::KubeError(e)
    }
}
