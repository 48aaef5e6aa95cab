use std::time::Duration;

use thiserror::Error;

pub const ERR_NOT_YET_INITIALIZED: i32 = 94;
pub const ERR_NO_REPLICATION_ENABLED: i32 = 76;
pub const ERR_NOT_PRIMARY_OR_SECONDARY: i32 = 13436;

#[derive(Debug, Error)]
pub enum MongexError {
    #[error("cannot connect to mongodb: {0}")]
    Connection(String),
    #[error("command {command} failed (code {code:?}): {message}")]
    Command {
        command: String,
        code: Option<i32>,
        message: String,
    },
    #[error("no data to report on an arbiter")]
    ArbiterSkip,
    #[error("cannot handle field {path}: {reason}")]
    MalformedField { path: String, reason: String },
    #[error("collection/namespace {0} is a view and cannot be used for collstats/indexstats")]
    InvalidNamespaceKind(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl MongexError {
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            code: None,
            message: message.into(),
        }
    }

    pub fn command_code(&self) -> Option<i32> {
        match self {
            Self::Command { code, .. } => *code,
            _ => None,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    pub fn is_replication_not_enabled(&self) -> bool {
        matches!(
            self.command_code(),
            Some(
                ERR_NOT_YET_INITIALIZED
                    | ERR_NO_REPLICATION_ENABLED
                    | ERR_NOT_PRIMARY_OR_SECONDARY
            )
        )
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, Self::ArbiterSkip) || self.is_replication_not_enabled()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "ConnectionError",
            Self::Command { .. } => "CommandError",
            Self::ArbiterSkip => "ArbiterSkip",
            Self::MalformedField { .. } => "MalformedField",
            Self::InvalidNamespaceKind(_) => "InvalidNamespaceKind",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Timeout(_) => "Timeout",
        }
    }
}

pub type Result<T> = std::result::Result<T, MongexError>;
