//! Error types for the LVS control plane

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LvsError>;

#[derive(Error, Debug)]
pub enum LvsError {
    #[error("Format error: {0}")]
    Format(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Server {server} is not a member of service {service}")]
    NotMember { server: String, service: String },

    #[error("Table apply failed: {0}")]
    TableApply(String),

    #[error("Missing configuration option: {0}")]
    MissingOption(String),

    #[error("Monitor already running: {0}")]
    AlreadyRunning(String),

    #[error("Probe fault: {0}")]
    ProbeFault(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LvsError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Format(_) => "FORMAT_ERROR",
            Self::Constraint(_) => "CONSTRAINT_ERROR",
            Self::NotMember { .. } => "NOT_MEMBER",
            Self::TableApply(_) => "TABLE_APPLY_ERROR",
            Self::MissingOption(_) => "MISSING_OPTION",
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::ProbeFault(_) => "PROBE_FAULT",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Shorthand used by parsers throughout the workspace
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}
