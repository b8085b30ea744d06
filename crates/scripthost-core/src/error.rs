//! Error types for script runtime operations.

use thiserror::Error;

/// Result type for script runtime operations.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Errors that can occur while resolving, loading or invoking scripts.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Script file not found in the content store.
    #[error("Script not found: '{path}'")]
    NotFound { path: String },

    /// Configured scripts folder does not exist.
    #[error("Invocable scripts folder not found: {path}")]
    FolderNotFound { path: String },

    /// Document exists but is not flagged as invocable.
    #[error("Script is not invocable: '{path}'")]
    NotInvocable { path: String },

    /// Module does not export a required function.
    #[error("{path} does not export {export}() function")]
    MissingExport { path: String, export: &'static str },

    /// Startup script was invoked while an instance is still live.
    #[error("Startup script already invoked")]
    AlreadyInvoked,

    /// No action is tracked for a script path.
    #[error("No command registered for script path: {path}")]
    NoActionForPath { path: String },

    /// Host refused an action.
    #[error("Action '{id}' could not be registered: {message}")]
    ActionRejected { id: String, message: String },

    /// No evaluator is registered for a script kind.
    #[error("No evaluator registered for '{path}'")]
    NoEvaluator { path: String },

    /// Module evaluation or extension instantiation failed.
    #[error("Failed to load '{name}': {message}")]
    LoadFailure { name: String, message: String },

    /// A script callback failed while executing.
    #[error("Error invoking {name}: {message}")]
    CallbackFailure { name: String, message: String },

    /// Folder observation could not be started.
    #[error("Failed to watch '{path}': {message}")]
    Watch { path: String, message: String },

    /// IO error from the content store.
    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of [`ScriptError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Script or folder absent.
    NotFound,
    /// Document lacks the invocable flag.
    NotInvocable,
    /// Missing export, double invoke, or missing action.
    ContractViolation,
    /// Evaluation or instantiation threw.
    LoadFailure,
    /// A registered callback threw.
    CallbackFailure,
    /// Host collaborator problem.
    Host,
}

impl ScriptError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create a load failure from any displayable error.
    pub fn load(name: impl Into<String>, message: impl ToString) -> Self {
        Self::LoadFailure {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Create a callback failure from any displayable error.
    pub fn callback(name: impl Into<String>, message: impl ToString) -> Self {
        Self::CallbackFailure {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::FolderNotFound { .. } => ErrorKind::NotFound,
            Self::NotInvocable { .. } => ErrorKind::NotInvocable,
            Self::MissingExport { .. } | Self::AlreadyInvoked | Self::NoActionForPath { .. } => {
                ErrorKind::ContractViolation
            }
            Self::LoadFailure { .. } | Self::NoEvaluator { .. } => ErrorKind::LoadFailure,
            Self::CallbackFailure { .. } => ErrorKind::CallbackFailure,
            Self::ActionRejected { .. }
            | Self::Watch { .. }
            | Self::Io { .. } => ErrorKind::Host,
        }
    }
}
