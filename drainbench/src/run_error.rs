use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    ControlRequest(anyhow::Error),
    PollTimeout(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::ControlRequest(_) => ExitCode::ControlRequestFailed,
            Self::PollTimeout(_) => ExitCode::PollTimeout,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e)
            | Self::ControlRequest(e)
            | Self::PollTimeout(e)
            | Self::RuntimeError(e) => e,
        }
    }
}

impl From<drainbench_core::Error> for RunError {
    fn from(err: drainbench_core::Error) -> Self {
        use drainbench_core::Error;

        match err {
            Error::Config(_) => Self::InvalidInput(err.into()),
            Error::ControlRequest { .. } => Self::ControlRequest(err.into()),
            Error::PollTimeout { .. } => Self::PollTimeout(err.into()),
            other => Self::RuntimeError(other.into()),
        }
    }
}

impl From<drainbench_core::ConfigError> for RunError {
    fn from(err: drainbench_core::ConfigError) -> Self {
        Self::InvalidInput(err.into())
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error: {:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}
