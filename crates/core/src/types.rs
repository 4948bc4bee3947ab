use thiserror::Error;

/// Errors raised by registry mutations. A call that returns one of these
/// has left the registry untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("task name cannot be empty")]
    EmptyName,

    #[error("task '{0}' is already registered")]
    DuplicateName(String),

    #[error("task '{task}' depends on a handle issued by another registry")]
    ForeignHandle { task: String },

    #[error("task handle does not refer to a registered task")]
    UnknownHandle,

    #[error("dependency cycle detected: {0}")]
    Cycle(String),
}

/// Errors returned from a flow execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecuteError {
    #[error("no task provided")]
    NoTasks,

    #[error("task provided but not defined: {0}")]
    UnknownTask(String),

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("execution canceled")]
    Canceled,
}

impl ExecuteError {
    /// Whether the error was caused by the request itself rather than by
    /// running it.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, ExecuteError::NoTasks | ExecuteError::UnknownTask(_))
    }

    /// Process exit code conventionally associated with the error.
    pub fn exit_code(&self) -> u8 {
        if self.is_invalid_input() {
            2
        } else {
            1
        }
    }
}

/// The main error type for taskmill operations
#[derive(Debug, Error)]
pub enum TaskmillError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

/// Result type alias for taskmill operations
pub type TaskmillResult<T> = Result<T, TaskmillError>;
