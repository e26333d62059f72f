//! The public gateway facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value, json};
use signal_core::{Attachment, ListenerId, Quote};
use signal_events::{Classifier, GroupNameResolver, MessageListener, ReplayRegistry};
use signal_rpc::{Endpoint, RpcClient};
use signal_settings::GatewaySettings;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::cache::{GroupCache, GroupLoader, GroupMap, IdentityCache, IdentityLoader, IdentityMap, TtlCache};
use crate::errors::{GatewayError, Result};
use crate::listener::{EventStreamWorker, StreamState, WorkerHandle};

/// A text message to send.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendMessage {
    /// Sending account.
    pub account: String,
    /// Message body.
    pub message: String,
    /// Direct recipients (phone numbers or UUIDs).
    pub recipients: Vec<String>,
    /// Groups, by id or title. Takes precedence over `recipients`.
    pub groups: Vec<String>,
    /// Message to quote.
    pub quote: Option<Quote>,
    /// Inline attachment.
    pub attachment: Option<Attachment>,
}

impl SendMessage {
    /// A message from `account` with no targets yet.
    pub fn new(account: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Add a direct recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Add a group by id or title.
    #[must_use]
    pub fn to_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Quote a prior message.
    #[must_use]
    pub fn with_quote(mut self, quote: Quote) -> Self {
        self.quote = Some(quote);
        self
    }

    /// Attach a file.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// A reaction to send or withdraw.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReactionRequest {
    /// Reacting account.
    pub account: String,
    /// Reaction emoji.
    pub emoji: String,
    /// Author of the target message.
    pub target_author: String,
    /// Timestamp of the target message.
    pub target_timestamp: i64,
    /// Withdraw instead of add.
    pub remove: bool,
    /// Direct recipients.
    pub recipients: Vec<String>,
    /// Groups, by id or title.
    pub groups: Vec<String>,
}

/// A remote delete of a prior message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Account that sent the message.
    pub account: String,
    /// Timestamp of the message to delete.
    pub target_timestamp: i64,
    /// Direct recipients.
    pub recipients: Vec<String>,
    /// Groups, by id or title.
    pub groups: Vec<String>,
}

/// Where one logical send goes.
#[derive(Debug, PartialEq, Eq)]
enum Targets {
    /// One call per resolved group id.
    Groups(Vec<String>),
    /// One call addressed to every recipient.
    Recipients(Vec<String>),
}

/// Client gateway to one Signal daemon.
///
/// Outbound calls run on the caller's task. While enabled, a background
/// worker reads the event stream and publishes messages to registered
/// listeners, replaying recent history to late joiners.
pub struct SignalGateway {
    settings: GatewaySettings,
    rpc: RpcClient,
    registry: Arc<ReplayRegistry>,
    groups: Arc<GroupCache>,
    identities: Arc<IdentityCache>,
    worker: Mutex<Option<WorkerHandle>>,
    state: Arc<watch::Sender<StreamState>>,
    enabled: AtomicBool,
}

impl std::fmt::Debug for SignalGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalGateway")
            .field("endpoint", &self.rpc.endpoint().to_string())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl SignalGateway {
    /// Create a disabled gateway for the daemon in `settings`.
    pub fn new(settings: GatewaySettings) -> Result<Self> {
        settings.validate()?;
        let endpoint = Endpoint::parse(&settings.daemon_url)?;
        let rpc = RpcClient::new(endpoint, settings.connect_timeout())?;

        let ttl = settings.cache_ttl();
        let groups = Arc::new(TtlCache::new(
            "groups",
            ttl,
            Arc::new(GroupLoader::new(rpc.clone())),
        ));
        let identities = Arc::new(TtlCache::new(
            "identities",
            ttl,
            Arc::new(IdentityLoader::new(rpc.clone())),
        ));

        Ok(Self {
            registry: Arc::new(ReplayRegistry::new(settings.replay_capacity)),
            settings,
            rpc,
            groups,
            identities,
            worker: Mutex::new(None),
            state: Arc::new(watch::channel(StreamState::Stopped).0),
            enabled: AtomicBool::new(false),
        })
    }

    /// Create a gateway for `daemon_url` with default settings.
    pub fn for_url(daemon_url: &str) -> Result<Self> {
        Self::new(GatewaySettings::for_url(daemon_url))
    }

    /// Settings this gateway was built with.
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Daemon addresses.
    pub fn endpoint(&self) -> &Endpoint {
        self.rpc.endpoint()
    }

    // ── lifecycle ───────────────────────────────────────────────────

    /// Check the daemon version and start the event-stream worker.
    ///
    /// Returns the daemon version. Fails with
    /// [`GatewayError::DaemonUnavailable`] when the version check yields
    /// nothing, in which case no worker is started. Serialised with
    /// [`disable`]: a `disable` issued while the check is in flight runs
    /// after it and stops the worker started here.
    ///
    /// [`disable`]: Self::disable
    pub async fn enable(&self) -> Result<String> {
        let mut worker = self.worker.lock().await;
        let version = self.check_version().await?;

        if worker.is_none() {
            let resolver: Arc<dyn GroupNameResolver> = self.groups.clone();
            let handle = EventStreamWorker::new(
                self.rpc.http().clone(),
                self.endpoint().events_url().clone(),
                Classifier::new(resolver),
                Arc::clone(&self.registry),
                self.settings.reconnect_delay(),
            )
            .with_state(Arc::clone(&self.state))
            .spawn();
            *worker = Some(handle);
        }
        Ok(version)
    }

    /// Check the daemon version and allow outbound calls without reading events.
    pub async fn enable_rpc_only(&self) -> Result<String> {
        let _lifecycle = self.worker.lock().await;
        self.check_version().await
    }

    /// Version check; marks the gateway enabled on success. Callers hold
    /// the worker lock.
    async fn check_version(&self) -> Result<String> {
        let Some(version) = self.signal_version().await else {
            return Err(GatewayError::DaemonUnavailable {
                url: self.endpoint().to_string(),
            });
        };
        self.enabled.store(true, Ordering::SeqCst);
        info!(version = %version, url = %self.endpoint(), "connected to signal daemon");
        Ok(version)
    }

    /// Stop the worker, drop cached data, and unregister every listener.
    pub async fn disable(&self) {
        let mut worker = self.worker.lock().await;
        self.enabled.store(false, Ordering::SeqCst);
        if let Some(handle) = worker.take() {
            handle.stop().await;
        }
        self.groups.invalidate_all();
        self.identities.invalidate_all();
        self.registry.reset();
        debug!("gateway disabled");
    }

    /// Whether the gateway accepts outbound calls.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Current event-stream worker state.
    pub fn stream_state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Whether the event stream is currently connected.
    pub fn is_listening_events(&self) -> bool {
        self.stream_state() == StreamState::Streaming
    }

    /// A receiver observing worker state changes across restarts.
    pub fn watch_stream_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(GatewayError::Disabled)
        }
    }

    // ── queries ─────────────────────────────────────────────────────

    /// Daemon version, or `None` when the daemon cannot be asked.
    pub async fn signal_version(&self) -> Option<String> {
        match self.rpc.call("version", json!({}), None).await {
            Ok(result) => {
                let version = result.get("version").and_then(Value::as_str)?.trim();
                (!version.is_empty()).then(|| version.to_string())
            }
            Err(e) => {
                error!(error = %e, url = %self.endpoint(), "version check failed");
                None
            }
        }
    }

    /// Groups of `account`, keyed by group id.
    pub async fn groups(&self, account: &str) -> Result<Arc<GroupMap>> {
        self.ensure_enabled()?;
        self.groups.get(account).await
    }

    /// Identities known to `account`, keyed by phone number.
    pub async fn identities(&self, account: &str) -> Result<Arc<IdentityMap>> {
        self.ensure_enabled()?;
        self.identities.get(account).await
    }

    /// Raw JSON-RPC call.
    pub async fn send_json_rpc(&self, method: &str, params: Value, id: Option<&str>) -> Result<Value> {
        self.ensure_enabled()?;
        Ok(self.rpc.call(method, params, id).await?)
    }

    // ── listeners ───────────────────────────────────────────────────

    /// Register a listener; it first receives the buffered history.
    pub fn add_message_listener(&self, listener: Arc<dyn MessageListener>) -> ListenerId {
        self.registry.add_listener(listener)
    }

    /// Register or re-register under `id`; only messages newer than those
    /// already handed to `id` are replayed. Returns the replay count.
    pub fn add_message_listener_with_id(
        &self,
        id: ListenerId,
        listener: Arc<dyn MessageListener>,
    ) -> usize {
        self.registry.add_listener_with_id(id, listener)
    }

    /// Unregister a listener.
    pub fn remove_message_listener(&self, id: &ListenerId) -> bool {
        self.registry.remove_listener(id)
    }

    /// Number of buffered messages available for replay.
    pub fn buffered_messages(&self) -> usize {
        self.registry.buffered()
    }

    // ── outbound ────────────────────────────────────────────────────

    /// Send a text message. Returns one `send` result per delivery.
    pub async fn send_message(&self, request: &SendMessage) -> Result<Vec<Value>> {
        self.ensure_enabled()?;
        debug!(account = %request.account, "sending message");

        let mut params = account_params(&request.account);
        let _ = params.insert("message".into(), json!(request.message));
        if let Some(quote) = &request.quote {
            let _ = params.insert("quote-timestamp".into(), json!(quote.timestamp));
            let _ = params.insert("quote-author".into(), json!(quote.author));
            let _ = params.insert("quote-message".into(), json!(quote.message));
            if let Some(mention) = &quote.mention {
                let _ = params.insert("quote-mention".into(), json!(mention));
            }
        }
        if let Some(attachment) = &request.attachment {
            let _ = params.insert("attachment".into(), json!(attachment.to_attachment_param()));
        }

        let targets = self
            .targets(&request.account, &request.recipients, &request.groups)
            .await?;
        self.deliver("send", params, targets).await
    }

    /// Send or withdraw a reaction. Returns one result per delivery.
    pub async fn send_reaction(&self, request: &ReactionRequest) -> Result<Vec<Value>> {
        self.ensure_enabled()?;
        debug!(account = %request.account, "sending reaction");

        let mut params = account_params(&request.account);
        let _ = params.insert("emoji".into(), json!(request.emoji));
        let _ = params.insert("target-author".into(), json!(request.target_author));
        let _ = params.insert("target-timestamp".into(), json!(request.target_timestamp));
        let _ = params.insert("remove".into(), json!(request.remove));

        let targets = self
            .targets(&request.account, &request.recipients, &request.groups)
            .await?;
        self.deliver("sendReaction", params, targets).await
    }

    /// Remotely delete a prior message. Returns one result per delivery.
    pub async fn delete_message(&self, request: &DeleteRequest) -> Result<Vec<Value>> {
        self.ensure_enabled()?;
        debug!(account = %request.account, "remote deleting message");

        let mut params = account_params(&request.account);
        let _ = params.insert("target-timestamp".into(), json!(request.target_timestamp));

        let targets = self
            .targets(&request.account, &request.recipients, &request.groups)
            .await?;
        self.deliver("remoteDelete", params, targets).await
    }

    async fn deliver(
        &self,
        method: &'static str,
        params: Map<String, Value>,
        targets: Targets,
    ) -> Result<Vec<Value>> {
        match targets {
            Targets::Recipients(recipients) => {
                let mut params = params;
                let _ = params.insert("recipient".into(), json!(recipients));
                let result = self.rpc.call(method, Value::Object(params), None).await?;
                Ok(vec![result])
            }
            Targets::Groups(ids) => {
                let mut results = Vec::with_capacity(ids.len());
                for id in ids {
                    let mut params = params.clone();
                    let _ = params.insert("group-id".into(), json!(id));
                    results.push(self.rpc.call(method, Value::Object(params), None).await?);
                }
                Ok(results)
            }
        }
    }

    /// Groups win over recipients; both are deduplicated in order.
    async fn targets(&self, account: &str, recipients: &[String], groups: &[String]) -> Result<Targets> {
        if !groups.is_empty() {
            return Ok(Targets::Groups(self.resolve_group_ids(account, groups).await?));
        }
        if recipients.is_empty() {
            return Err(GatewayError::NoRecipients);
        }
        let mut distinct: Vec<String> = Vec::with_capacity(recipients.len());
        for r in recipients {
            if !distinct.contains(r) {
                distinct.push(r.clone());
            }
        }
        Ok(Targets::Recipients(distinct))
    }

    /// Resolve ids or titles to distinct group ids, skipping unknown ones.
    async fn resolve_group_ids(&self, account: &str, wanted: &[String]) -> Result<Vec<String>> {
        let groups = self.groups.get(account).await?;
        if groups.is_empty() {
            error!(account, "no groups found for account");
            return Ok(Vec::new());
        }

        let mut ids: Vec<String> = Vec::with_capacity(wanted.len());
        for name in wanted {
            match groups.resolve(name) {
                Some(group) if !ids.contains(&group.id) => ids.push(group.id.clone()),
                Some(_) => debug!(group = %name, "group already targeted"),
                None => warn!(account, group = %name, "could not find group"),
            }
        }
        Ok(ids)
    }
}

impl Drop for SignalGateway {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

fn account_params(account: &str) -> Map<String, Value> {
    let mut params = Map::new();
    let _ = params.insert("account".into(), json!(account));
    params
}
