// Error taxonomy for the indexing engine

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("No extractor registered for {}", .0.display())]
    UnsupportedLanguage(PathBuf),

    #[error("File {} is {size} bytes, above the {limit} byte limit", .path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Project path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Project already being watched: {}", .0.display())]
    AlreadyWatched(PathBuf),

    #[error("Project not being watched: {}", .0.display())]
    NotWatched(PathBuf),

    #[error("Failed to watch {}: {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code for collaborators
    pub fn kind(&self) -> &'static str {
        match self {
            IndexError::Io { .. } => "io_error",
            IndexError::Parse { .. } => "parse_error",
            IndexError::UnsupportedLanguage(_) => "unsupported_language",
            IndexError::FileTooLarge { .. } => "file_too_large",
            IndexError::NotFound(_) => "not_found",
            IndexError::AlreadyWatched(_) => "already_watched",
            IndexError::NotWatched(_) => "not_watched",
            IndexError::Watch { .. } => "watch_error",
            IndexError::Config(_) => "config_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = IndexError::io(
            "a.py",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.kind(), "io_error");
        assert!(err.to_string().contains("a.py"));

        assert_eq!(
            IndexError::UnsupportedLanguage(PathBuf::from("x.bin")).kind(),
            "unsupported_language"
        );
        assert_eq!(IndexError::NotWatched(PathBuf::from("/p")).kind(), "not_watched");
    }
}
