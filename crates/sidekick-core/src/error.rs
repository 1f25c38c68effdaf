use std::path::PathBuf;

/// A model reply that announced a plan but could not be turned into one.
///
/// Both variants keep the full reply so it can be shown to the user as-is.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanParseError {
    #[error("could not decode the plan block: {message}")]
    Decode { message: String, raw: String },
    #[error("plan block has an unexpected shape: {message}")]
    Shape { message: String, raw: String },
}

impl PlanParseError {
    pub fn raw(&self) -> &str {
        match self {
            Self::Decode { raw, .. } | Self::Shape { raw, .. } => raw,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
