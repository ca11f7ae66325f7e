use code::ErrorCode;
use snafu::{Location, Snafu};

pub mod code;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HarvestError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
}

pub type HarvestResult<T, E = HarvestError> = std::result::Result<T, E>;

impl HarvestError {
    pub fn code(&self) -> ErrorCode {
        match self {
            HarvestError::Generic { code, .. } => *code,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.code().is_transport()
    }
}
