use std::collections::HashMap;
use std::fmt;

use crate::error::{BreakwaterError, Result};

/// Wire metadata key carrying the caller's opaque identity.
pub const KEY_ID: &str = "id";
/// Wire metadata key carrying the caller's advisory pending-send count.
pub const KEY_DEMAND: &str = "demand";
/// Wire metadata key carrying the server's new credit grant.
pub const KEY_CREDITS: &str = "credits";

/// Opaque, self-assigned client identity. Not authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
	#[must_use]
	pub fn new() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}
}

impl Default for ClientId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ClientId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for ClientId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

/// Transport-agnostic per-RPC metadata map. A real transport binding (gRPC
/// headers, an HTTP header map, ...) is expected to translate its native
/// representation into and out of this type at the edge; the core never
/// touches the transport directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(HashMap<String, String>);

impl Metadata {
	#[must_use]
	pub fn new() -> Self {
		Self(HashMap::new())
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.0.insert(key.into(), value.into());
	}

	#[must_use]
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(String::as_str)
	}
}

impl FromIterator<(String, String)> for Metadata {
	fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
		Self(HashMap::from_iter(iter))
	}
}

/// Builds the outbound request metadata attached by the client gate: the
/// caller's id and its current advisory demand.
#[must_use]
pub fn encode_request(id: &ClientId, demand: u64) -> Metadata {
	let mut metadata = Metadata::new();
	metadata.insert(KEY_ID, id.to_string());
	metadata.insert(KEY_DEMAND, demand.to_string());
	metadata
}

/// Reads `id`/`demand` off inbound request metadata. Missing `id` is a
/// protocol violation; missing `demand` defaults to zero.
pub fn decode_request(metadata: &Metadata) -> Result<(ClientId, u64)> {
	let id = metadata.get(KEY_ID).ok_or_else(BreakwaterError::missing_id)?;
	if id.is_empty() {
		return Err(BreakwaterError::missing_id());
	}
	let demand = metadata.get(KEY_DEMAND).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
	Ok((ClientId(id.to_string()), demand))
}

/// Builds the outbound response metadata attached by the server interceptor:
/// the new credit grant for this client.
#[must_use]
pub fn encode_response(credits: u64) -> Metadata {
	let mut metadata = Metadata::new();
	metadata.insert(KEY_CREDITS, credits.to_string());
	metadata
}

/// Reads `credits` off inbound response metadata. Missing or malformed
/// `credits` is treated as "no update".
#[must_use]
pub fn decode_response(metadata: &Metadata) -> Option<u64> {
	metadata.get(KEY_CREDITS).and_then(|v| v.parse::<u64>().ok())
}
