use thiserror::Error;

/// Status vocabulary the core maps its own rejections onto. A host wiring a
/// real transport translates this into whatever status codes that transport
/// uses (gRPC codes, HTTP statuses, ...), the same way `nest::http::Error`
/// maps its variants onto `axum::http::StatusCode`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakwaterError {
	/// Local or remote overload: the client queue was full, a wait expired,
	/// or the server had no credits to admit the call.
	#[error("resource exhausted: {0}")]
	ResourceExhausted(String),

	/// A required piece of request metadata was missing or malformed.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
}

impl BreakwaterError {
	#[must_use]
	pub fn queue_full() -> Self {
		Self::ResourceExhausted("queue full".to_string())
	}

	#[must_use]
	pub fn expired() -> Self {
		Self::ResourceExhausted("request expired".to_string())
	}

	#[must_use]
	pub fn no_credits() -> Self {
		Self::ResourceExhausted("no credits available".to_string())
	}

	#[must_use]
	pub fn missing_id() -> Self {
		Self::InvalidArgument("missing id metadata".to_string())
	}

	/// Short status name, analogous to a gRPC code string, useful for
	/// mapping onto a concrete transport's status vocabulary.
	#[must_use]
	pub const fn code(&self) -> &'static str {
		match self {
			Self::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
			Self::InvalidArgument(_) => "INVALID_ARGUMENT",
		}
	}
}

pub type Result<T> = std::result::Result<T, BreakwaterError>;
