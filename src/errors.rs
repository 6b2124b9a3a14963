//! Pool error codes.
//!
//! Codes are grouped by the kind of failure:
//! - 1xx: caller is not allowed to perform the call
//! - 2xx: input or environment failed validation
//! - 3xx: pool state conflicts with the request
//! - 4xx: arithmetic fault, always fatal

use odra::prelude::*;

/// Result type used by the pool internals. Entry points turn an `Err` into a revert.
pub type PoolResult<T> = Result<T, OdraError>;

#[odra::odra_error]
pub enum PoolError {
    // Access
    NotRouter = 100,
    NotController = 101,
    NotLoanOwner = 102,

    // Validation
    UnknownCollection = 200,
    InvalidProof = 201,
    LoanTooLarge = 202,
    DeadLink = 203,
    RootOverwriteDenied = 204,
    TooEarly = 205,
    ZeroAmount = 206,
    PaybackFirst = 207,
    PaymentBelowPenalty = 208,
    InvalidPrice = 209,
    InsufficientRoundHistory = 210,
    InvalidConfiguration = 211,
    CollectionAlreadyListed = 212,
    NoPendingRootUpdate = 213,
    InsufficientShares = 214,

    // State
    LoanAlreadyExists = 300,
    LoanNotFound = 301,
    TokenMismatch = 302,
    InsufficientLiquidity = 303,
    NoRoundData = 304,

    // Arithmetic
    ArithmeticOverflow = 400,
    ArithmeticUnderflow = 401,
    DivisionByZero = 402,
}
