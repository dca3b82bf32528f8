use std::path::PathBuf;

/// An image, mask or output file could not be read, decoded or written.
///
/// Load failures are isolated: the affected reference or test image is
/// skipped and the surrounding batch continues.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("failed to write {path}: {reason}")]
    Encode { path: PathBuf, reason: String },
    #[error("mask is {mask_width}x{mask_height} but image is {width}x{height}")]
    DimensionMismatch {
        width: usize,
        height: usize,
        mask_width: usize,
        mask_height: usize,
    },
    #[error("cannot derive a mask path from {0}")]
    MaskPath(PathBuf),
}

/// A reference or test list could not be read or parsed.
#[derive(thiserror::Error, Debug)]
pub enum ListError {
    #[error("failed to read list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Database construction failed as a whole.
#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error(transparent)]
    List(#[from] ListError),
    #[error("no reference target could be built")]
    NoTargets,
}

/// The evaluation could not run.
#[derive(thiserror::Error, Debug)]
pub enum EvaluationError {
    #[error(transparent)]
    List(#[from] ListError),
    #[error("cannot read report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
