use thiserror::Error;

/// Failures the viewer reports at runtime.
///
/// Everything below the viewer (GPU setup, resource reads, glTF parsing)
/// speaks `anyhow`; those errors are wrapped here once they reach a point
/// where the viewer has to decide what to do with them.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// A model could not be fetched or parsed. Never fatal: the previously
    /// displayed model stays on screen.
    #[error("failed to load model '{path}': {source:#}")]
    AssetLoad {
        path: String,
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ViewerError {
    pub fn asset_load(path: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ViewerError::AssetLoad {
            path: path.into(),
            source: source.into(),
        }
    }
}
