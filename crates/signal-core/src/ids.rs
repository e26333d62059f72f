//! Branded ID newtypes.
//!
//! [`ListenerId`] is an opaque UUID v7 handle that keys a listener's replay
//! state in the registry. [`RpcId`] correlates a JSON-RPC request with its
//! response; generated ids come from a process-wide monotonic counter so two
//! calls can never share one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Opaque handle identifying one registered message listener.
    ///
    /// Keep the handle to remove the listener later, or to re-register it
    /// and receive only the buffered messages it has not seen yet.
    ListenerId
}

branded_id! {
    /// Identifier correlating a JSON-RPC request with its response.
    RpcId
}

impl ListenerId {
    /// Create a new random handle (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

static RPC_SEQUENCE: AtomicU64 = AtomicU64::new(1);

impl RpcId {
    /// Generate the next id for `method`, formatted as `<method>-<n>`.
    #[must_use]
    pub fn next(method: &str) -> Self {
        let n = RPC_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{method}-{n}"))
    }

    /// Use `id` when it is present and non-blank, otherwise generate one.
    #[must_use]
    pub fn or_next(id: Option<&str>, method: &str) -> Self {
        match id.map(str::trim) {
            Some(id) if !id.is_empty() => Self::from(id),
            _ => Self::next(method),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn listener_id_is_uuid_v7() {
        let id = ListenerId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn listener_ids_are_unique() {
        assert_ne!(ListenerId::new(), ListenerId::new());
    }

    #[test]
    fn rpc_id_carries_method_prefix() {
        let id = RpcId::next("listGroups");
        assert!(id.starts_with("listGroups-"));
    }

    #[test]
    fn rpc_ids_never_repeat() {
        let ids: HashSet<RpcId> = (0..10_000).map(|_| RpcId::next("send")).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn rpc_ids_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..1_000).map(|_| RpcId::next("x")).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 8_000);
    }

    #[test]
    fn or_next_keeps_explicit_id() {
        assert_eq!(RpcId::or_next(Some("custom-7"), "send").as_str(), "custom-7");
    }

    #[test]
    fn or_next_replaces_blank_id() {
        let id = RpcId::or_next(Some("   "), "version");
        assert!(id.starts_with("version-"));
        let id = RpcId::or_next(None, "version");
        assert!(id.starts_with("version-"));
    }

    #[test]
    fn serde_is_transparent() {
        let id = ListenerId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
