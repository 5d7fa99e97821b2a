use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Dump error: {0}")]
    Dump(#[from] hlsdump_engine::DumpError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
