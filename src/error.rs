use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::env;
use std::fmt::{self, Debug, Display};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Internal,
    Integrity,
    Validation,
    Conflict,
    Concurrency,
    Access,
}

pub const ENV_VAR: i32 = 1;
pub const DATABASE: i32 = 2;
pub const CONFIG: i32 = 3;
pub const UNEXPECTED: i32 = 5;

pub const DUPLICATE_POSTING: i32 = 10;
pub const CAPACITY_EXCEEDED: i32 = 11;
pub const BALANCE_MISMATCH: i32 = 12;
pub const AMOUNT_OVERFLOW: i32 = 13;

pub const INVALID_INPUT: i32 = 100;
pub const INVALID_SEATS: i32 = 101;
pub const INVALID_AMOUNT: i32 = 102;
pub const INVALID_OTP_FORMAT: i32 = 103;
pub const INVALID_PAYOUT_DETAILS: i32 = 104;
pub const INVALID_RATING: i32 = 105;

pub const SEATS_UNAVAILABLE: i32 = 200;
pub const ALREADY_REQUESTED: i32 = 201;
pub const NOT_STARTABLE: i32 = 202;
pub const INVALID_OTP: i32 = 203;
pub const INSUFFICIENT_BALANCE: i32 = 204;
pub const INVALID_STATE: i32 = 205;
pub const TOO_MANY_ATTEMPTS: i32 = 206;
pub const ALREADY_RESOLVED: i32 = 207;
pub const ALREADY_REVIEWED: i32 = 208;

pub const BUSY: i32 = 300;

pub const UNAUTHORIZED: i32 = 403;
pub const NOT_FOUND: i32 = 404;

impl Error {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code {
            10..=19 => ErrorKind::Integrity,
            100..=199 => ErrorKind::Validation,
            200..=299 => ErrorKind::Conflict,
            300..=399 => ErrorKind::Concurrency,
            400..=499 => ErrorKind::Access,
            _ => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Concurrency
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code.into_owned());

        match code.as_deref() {
            // lock_not_available, serialization_failure, deadlock_detected
            Some("55P03") | Some("40001") | Some("40P01") => busy_error(),
            Some("23505") => {
                tracing::error!(%err, "unique constraint violated");
                duplicate_posting_error()
            }
            _ => database_error(err),
        }
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        tracing::error!(%err, "authorization engine failure");
        unexpected_error()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();

        let (status, error_message) = match kind {
            ErrorKind::Internal | ErrorKind::Integrity => {
                tracing::error!(code = self.code, message = %self.message, "internal failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, self.message.as_str()),
            ErrorKind::Conflict => (StatusCode::CONFLICT, self.message.as_str()),
            ErrorKind::Concurrency => (StatusCode::SERVICE_UNAVAILABLE, self.message.as_str()),
            ErrorKind::Access if self.code == NOT_FOUND => {
                (StatusCode::NOT_FOUND, self.message.as_str())
            }
            ErrorKind::Access => (StatusCode::FORBIDDEN, self.message.as_str()),
        };

        let body = Json(json!({
            "code": self.code,
            "kind": kind,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error::new(ENV_VAR, "environment variable error")
}

pub fn database_error<T: Debug>(err: T) -> Error {
    tracing::error!(?err, "database error");
    Error::new(DATABASE, "database error")
}

pub fn config_error(message: impl Into<String>) -> Error {
    Error::new(CONFIG, message)
}

pub fn unexpected_error() -> Error {
    Error::new(UNEXPECTED, "unexpected error")
}

pub fn duplicate_posting_error() -> Error {
    Error::new(DUPLICATE_POSTING, "duplicate ledger posting")
}

pub fn capacity_exceeded_error() -> Error {
    Error::new(CAPACITY_EXCEEDED, "seats reserved exceed seat capacity")
}

pub fn balance_mismatch_error() -> Error {
    Error::new(BALANCE_MISMATCH, "cached balance disagrees with ledger")
}

pub fn amount_overflow_error() -> Error {
    Error::new(AMOUNT_OVERFLOW, "amount out of range")
}

pub fn invalid_input_error() -> Error {
    Error::new(INVALID_INPUT, "invalid input")
}

pub fn invalid_seats_error() -> Error {
    Error::new(INVALID_SEATS, "seat count out of range")
}

pub fn invalid_amount_error() -> Error {
    Error::new(INVALID_AMOUNT, "amount must be positive")
}

pub fn invalid_otp_format_error() -> Error {
    Error::new(INVALID_OTP_FORMAT, "otp must be 4 digits")
}

pub fn invalid_payout_details_error() -> Error {
    Error::new(INVALID_PAYOUT_DETAILS, "payout details incomplete")
}

pub fn invalid_rating_error() -> Error {
    Error::new(INVALID_RATING, "rating must be between 1 and 5")
}

pub fn seats_unavailable_error() -> Error {
    Error::new(SEATS_UNAVAILABLE, "not enough free seats")
}

pub fn already_requested_error() -> Error {
    Error::new(ALREADY_REQUESTED, "passenger already holds a request on this trip")
}

pub fn not_startable_error() -> Error {
    Error::new(NOT_STARTABLE, "trip cannot be started now")
}

pub fn invalid_otp_error() -> Error {
    Error::new(INVALID_OTP, "otp is invalid or expired")
}

pub fn insufficient_balance_error() -> Error {
    Error::new(INSUFFICIENT_BALANCE, "insufficient balance")
}

pub fn invalid_state_error() -> Error {
    Error::new(INVALID_STATE, "invalid state")
}

pub fn too_many_attempts_error() -> Error {
    Error::new(TOO_MANY_ATTEMPTS, "too many attempts")
}

pub fn already_resolved_error() -> Error {
    Error::new(ALREADY_RESOLVED, "request already resolved")
}

pub fn already_reviewed_error() -> Error {
    Error::new(ALREADY_REVIEWED, "trip already reviewed")
}

pub fn busy_error() -> Error {
    Error::new(BUSY, "resource busy, retry")
}

pub fn unauthorized_error() -> Error {
    Error::new(UNAUTHORIZED, "unauthorized")
}

pub fn not_found_error() -> Error {
    Error::new(NOT_FOUND, "not found")
}
