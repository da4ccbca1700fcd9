use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    /// Uniqueness violation on an insert; the mutation was already applied.
    #[error("Record already exists")]
    Duplicate,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    /// Event depends on ledger state that has not arrived yet.
    #[error("Out of order: {0}")]
    OutOfOrder(String),

    #[error("Paddle API error: {detail}")]
    Remote {
        status: Option<u16>,
        code: Option<String>,
        detail: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Paddle error code of a failed remote call, if any.
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            AppError::Remote { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    Duplicate,
    InvalidSignature,
    Unauthorized,
    MalformedEvent,
    InvalidInput,
    NotFound,
    OutOfOrder,
    RemoteError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::Duplicate => "DUPLICATE",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::MalformedEvent => "MALFORMED_EVENT",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::OutOfOrder => "OUT_OF_ORDER",
            ErrorCode::RemoteError => "REMOTE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
