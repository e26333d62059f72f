//! Protocol paths and lifecycle defaults.

use std::time::Duration;

/// Path of the JSON-RPC endpoint relative to the daemon base URL.
pub const RPC_PATH: &str = "/api/v1/rpc";

/// Path of the push-event stream relative to the daemon base URL.
pub const EVENTS_PATH: &str = "/api/v1/events";

/// JSON-RPC protocol version tag sent and expected on every call.
pub const JSONRPC_VERSION: &str = "2.0";

/// Placeholder used when the envelope omits a source field.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Number of recent messages kept for late-joining listeners.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_000;

/// Idle time after which a cached group/identity map is reloaded.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Delay between a lost event-stream connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
