use std::path::PathBuf;

use thiserror::Error;

use crate::executor::Abort;

pub type Result<T> = std::result::Result<T, AdminError>;

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Missing configuration file at {}", .0.display())]
    ConfigFileNotFound(PathBuf),
    #[error("Failed to parse {}: {source}", .path.display())]
    MalformedConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to parse {}: {reason}", .path.display())]
    MalformedFile { path: PathBuf, reason: String },
    #[error("Unable to reach host: {message}")]
    Network { host: String, message: String },
    #[error("{0}")]
    Abort(String),
    #[error("Incorrect number of arguments to task {task}: expected {expected}, got {given}")]
    ArgumentMismatch {
        task: String,
        expected: String,
        given: usize,
    },
    #[error("Invalid task name: {0}")]
    UnknownTask(String),
    #[error("Command '{command}' failed with exit code {code}: {stderr}")]
    CommandFailed {
        host: String,
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("Timed out after {seconds} seconds")]
    JobTimedOut { seconds: u64 },
    #[error("Task needs a remote host but is running local-only")]
    NoHost,
    #[error("Failed to render template: {0}")]
    Render(#[from] handlebars::RenderError),
    #[error("Invalid template: {0}")]
    Template(#[from] handlebars::TemplateError),
    #[error("Local I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Aborted(Box<Abort>),
}

impl From<Abort> for AdminError {
    fn from(abort: Abort) -> Self {
        AdminError::Aborted(Box::new(abort))
    }
}

impl AdminError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        AdminError::Configuration(message.into())
    }

    /// The fatal-error primitive tasks call to stop their host's run.
    pub fn abort(message: impl Into<String>) -> Self {
        AdminError::Abort(message.into())
    }

    pub fn network(host: impl Into<String>, message: impl ToString) -> Self {
        AdminError::Network {
            host: host.into(),
            message: message.to_string(),
        }
    }
}
