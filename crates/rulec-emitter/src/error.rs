//! Emitter errors

use std::path::PathBuf;
use thiserror::Error;

/// Result type for emitter operations
pub type EmitResult<T> = Result<T, EmitError>;

/// Errors raised while emitting an artifact
#[derive(Debug, Error)]
pub enum EmitError {
    /// A required code fragment is absent; fatal to the whole pass
    #[error("missing template fragment: {0}")]
    TemplateMissing(String),

    /// A fragment failed to render
    #[error("template fragment \"{name}\" failed to render: {source}")]
    TemplateRender {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// Any write before `init` is fatal
    #[error("artifact write before init")]
    AppendBeforeInit,

    /// Block/loop open and close calls went out of balance
    #[error("unbalanced block close in artifact")]
    Unbalanced,

    /// Publishing would overwrite an existing artifact
    #[error("artifact already published: {file_name}")]
    ArtifactExists { file_name: String },

    /// Filesystem failure in the directory catalog
    #[error("artifact I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
