use crate::backup::archive::ZipStrategy;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Source not found: {0:?}")]
    SourceNotFound(PathBuf),
    #[error("No files to backup in the source: {0:?}")]
    EmptyArchive(PathBuf),
    #[error("Archive creation failed: {0}")]
    ArchiveCreationFailed(String),
    #[error("Invalid archive request: {0}")]
    InvalidArchiveRequest(String),
    #[error("Zip strategy {0} requested but it is not available: {1}")]
    StrategyUnavailable(ZipStrategy, String),
    #[error("No zip strategy available. Install 7z (p7zip-full) or select the library strategy")]
    NoStrategyAvailable,
    #[error("Database dump failed with exit code {exit_code:?}: {stderr}")]
    DumpFailed { exit_code: Option<i32>, stderr: String },
    #[error("{program} did not finish within {timeout:?}")]
    ProcessTimeout { program: String, timeout: Duration },
    #[error("Backup URL must use HTTPS: {0}")]
    InsecureEndpoint(String),
    #[error("Backup file could not be sent, server answered {status}: {body}")]
    UploadFailed { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { error: Box<Error>, fn_name: String },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> WithFnName<S> for Error {
    fn with_fn_name(self, fn_name: S) -> Self {
        Self::WithFnName {
            error: Box::new(self),
            fn_name: fn_name.into(),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(|e| e.into_iter()).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Strips context layers added by `with_msg` and friends.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithMsg { error, .. }
            | Error::WithFnName { error, .. }
            | Error::WithDebugObjAndFnName { error, .. } => error.root(),
            e => e,
        }
    }

    /// Only transport failures are worth another upload attempt. An HTTP
    /// answer, even a failing one, is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Error::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error);

        match error {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_with_msg() {
        let error = Error::NoStrategyAvailable.with_msg("Custom message");

        match error {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_with_debug_object_and_fn_name() {
        let error = Error::Transport("connection reset".into())
            .with_debug_object_and_fn_name("test_object", "test_function");

        match error {
            Error::WithDebugObjAndFnName { fn_name, .. } => assert_eq!(fn_name, "test_function"),
            _ => panic!("Expected WithDebugObjAndFnName error"),
        }
    }

    #[test]
    fn test_error_from_vec_flattens() {
        let nested = Error::Config("a".into()).chain(Error::Config("b".into()));
        let combined = Error::from(vec![nested, Error::Config("c".into())]);
        match combined {
            Error::LotsOfError(errors) => assert_eq!(errors.len(), 3),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    #[should_panic(expected = "Should not create lots of errors when error is empty")]
    fn test_error_from_empty_vec_panics() {
        let errors: Vec<Error> = vec![];
        let _error = Error::from(errors);
    }

    #[test]
    fn test_root_unwraps_every_layer() {
        let error = Error::EmptyArchive(PathBuf::from("/srv/storage"))
            .with_fn_name("create")
            .with_debug_object_and_fn_name(42, "snapshot")
            .with_msg("Storage backup failed");

        assert!(matches!(error.root(), Error::EmptyArchive(_)));
    }

    #[test]
    fn test_retryable_only_for_transport_errors() {
        assert!(Error::Transport("timeout".into()).is_retryable());
        assert!(Error::Transport("timeout".into())
            .with_msg("attempt 1")
            .is_retryable());
        assert!(!Error::UploadFailed {
            status: 500,
            body: "boom".into()
        }
        .is_retryable());
        assert!(!Error::Io(std::io::Error::other("disk")).is_retryable());
    }

    #[test]
    fn test_error_with_msg_display_is_indented() {
        let error = Error::DumpFailed {
            exit_code: Some(2),
            stderr: "access denied".into(),
        }
        .with_msg("Database backup failed");
        let error_str = error.to_string();

        assert!(error_str.starts_with("Database backup failed:\n  "));
        assert!(error_str.contains("access denied"));
    }
}
