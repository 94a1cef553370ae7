//! In-process fakes for tests.
//!
//! [`FakePlatform`] records every remote call and lets a test shape the
//! platform's answers: which tenants a user shares with the bot, which
//! channels exist, and when command registrations are confirmed.
//! [`FlakyStore`] is a [`MemoryStore`] whose writes can be made to fail.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{PlatformError, PlatformResult, StoreError, StoreResult};
use crate::event::{ChannelId, MessageId, RemoteId, TenantId, UserId};
use crate::message::OutboundMessage;
use crate::platform::{ChannelInfo, CommandSpec, Platform, TenantInfo};
use crate::store::{MemoryStore, Scope, SettingsStore};

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Upsert { tenant: TenantId, name: String, remote_id: RemoteId },
    DeleteCommand { tenant: TenantId, remote_id: RemoteId },
    Send { channel: ChannelId, message_id: MessageId, message: OutboundMessage },
    Edit { channel: ChannelId, message_id: MessageId, message: OutboundMessage },
    DeleteMessage { channel: ChannelId, message_id: MessageId },
}

#[derive(Debug, Default)]
struct UpsertGate {
    held: bool,
    released: BTreeSet<u64>,
}

impl UpsertGate {
    fn admits(&self, ticket: u64) -> bool {
        !self.held || self.released.contains(&ticket)
    }
}

/// A scriptable [`Platform`].
///
/// Upserting a command overwrites any command of the same name in the tenant
/// and returns the same remote id. Unknown channels resolve to embed-capable
/// text channels unless registered otherwise with
/// [`add_channel`](FakePlatform::add_channel).
pub struct FakePlatform {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU64,
    upsert_tickets: AtomicU64,
    live_commands: Mutex<HashMap<RemoteId, (TenantId, String)>>,
    mutual: Mutex<HashMap<UserId, Vec<TenantInfo>>>,
    channels: Mutex<HashMap<ChannelId, Option<ChannelInfo>>>,
    hold: watch::Sender<UpsertGate>,
    lookup_delay: Mutex<Option<Duration>>,
    fail_deletes: AtomicBool,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            upsert_tickets: AtomicU64::new(0),
            live_commands: Mutex::new(HashMap::new()),
            mutual: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            hold: watch::Sender::new(UpsertGate::default()),
            lookup_delay: Mutex::new(None),
            fail_deletes: AtomicBool::new(false),
        }
    }

    // -------------------------------------------------------------------------
    // Scripting
    // -------------------------------------------------------------------------

    /// Sets the tenants `user` shares with the bot.
    pub fn set_mutual(&self, user: &str, tenants: Vec<TenantInfo>) {
        self.mutual.lock().insert(user.to_string(), tenants);
    }

    /// Registers a channel. `None` makes the channel unknown.
    pub fn add_channel(&self, id: &str, info: Option<ChannelInfo>) {
        self.channels.lock().insert(id.to_string(), info);
    }

    /// Makes command upserts wait until [`release_upserts`](Self::release_upserts).
    ///
    /// Every upsert call takes a ticket, numbered from zero in call order.
    pub fn hold_upserts(&self) {
        self.hold.send_modify(|gate| gate.held = true);
    }

    /// Lets the upserts holding `tickets` through while the rest stay held.
    pub fn release_tickets(&self, tickets: impl IntoIterator<Item = u64>) {
        self.hold.send_modify(|gate| gate.released.extend(tickets));
    }

    pub fn release_upserts(&self) {
        self.hold.send_replace(UpsertGate::default());
    }

    /// How many upsert calls have been made, held or not.
    pub fn upsert_tickets(&self) -> u64 {
        self.upsert_tickets.load(Ordering::SeqCst)
    }

    /// Delays every mutual-tenant lookup.
    pub fn set_lookup_delay(&self, delay: Duration) {
        *self.lookup_delay.lock() = Some(delay);
    }

    /// Makes command and message deletions fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Every message sent, with its channel.
    pub fn sent(&self) -> Vec<(ChannelId, OutboundMessage)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Send { channel, message, .. } => Some((channel.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn sent_to(&self, channel: &str) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, m)| m)
            .collect()
    }

    /// Messages sent to `channel` and not deleted since.
    pub fn visible_in(&self, channel: &str) -> Vec<(MessageId, OutboundMessage)> {
        let calls = self.calls.lock();
        let deleted: Vec<&MessageId> = calls
            .iter()
            .filter_map(|c| match c {
                Call::DeleteMessage { channel: ch, message_id } if ch == channel => Some(message_id),
                _ => None,
            })
            .collect();
        calls
            .iter()
            .filter_map(|c| match c {
                Call::Send {
                    channel: ch,
                    message_id,
                    message,
                } if ch == channel && !deleted.contains(&message_id) => {
                    Some((message_id.clone(), message.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<(MessageId, OutboundMessage)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Edit {
                    message_id, message, ..
                } => Some((message_id.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_messages(&self) -> Vec<MessageId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::DeleteMessage { message_id, .. } => Some(message_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of commands upserted in `tenant`, in call order.
    pub fn upserted(&self, tenant: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Upsert { tenant: t, name, .. } if t == tenant => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of commands currently registered in `tenant`, sorted.
    pub fn live_commands(&self, tenant: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .live_commands
            .lock()
            .values()
            .filter(|(t, _)| t == tenant)
            .map(|(_, n)| n.clone())
            .collect();
        names.sort();
        names
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn upsert_command(&self, tenant: &str, spec: &CommandSpec) -> PlatformResult<RemoteId> {
        let ticket = self.upsert_tickets.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.hold.subscribe();
        let _ = rx.wait_for(|gate| gate.admits(ticket)).await;

        let remote_id = format!("cmd-{tenant}-{}", spec.name);
        self.live_commands
            .lock()
            .insert(remote_id.clone(), (tenant.to_string(), spec.name.clone()));
        self.record(Call::Upsert {
            tenant: tenant.to_string(),
            name: spec.name.clone(),
            remote_id: remote_id.clone(),
        });
        Ok(remote_id)
    }

    async fn delete_command(&self, tenant: &str, remote_id: &str) -> PlatformResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(PlatformError::request("delete rejected"));
        }
        self.live_commands.lock().remove(remote_id);
        self.record(Call::DeleteCommand {
            tenant: tenant.to_string(),
            remote_id: remote_id.to_string(),
        });
        Ok(())
    }

    async fn send_message(&self, channel: &str, message: OutboundMessage) -> PlatformResult<MessageId> {
        let message_id = self.next_id("msg-");
        self.record(Call::Send {
            channel: channel.to_string(),
            message_id: message_id.clone(),
            message,
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        channel: &str,
        message_id: &str,
        message: OutboundMessage,
    ) -> PlatformResult<()> {
        self.record(Call::Edit {
            channel: channel.to_string(),
            message_id: message_id.to_string(),
            message,
        });
        Ok(())
    }

    async fn delete_message(&self, channel: &str, message_id: &str) -> PlatformResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(PlatformError::request("delete rejected"));
        }
        self.record(Call::DeleteMessage {
            channel: channel.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn mutual_tenants(&self, user: &str) -> PlatformResult<Vec<TenantInfo>> {
        let delay = *self.lookup_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.mutual.lock().get(user).cloned().unwrap_or_default())
    }

    async fn channel(&self, channel: &str) -> PlatformResult<Option<ChannelInfo>> {
        Ok(self
            .channels
            .lock()
            .get(channel)
            .cloned()
            .unwrap_or_else(|| Some(ChannelInfo::text(channel))))
    }
}

/// A [`MemoryStore`] whose writes fail on demand.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Makes every write fail while `fail` is set. Reads keep working.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io("disk full".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FlakyStore {
    async fn values(&self, scope: &Scope, key: &str) -> StoreResult<Vec<String>> {
        self.inner.values(scope, key).await
    }

    async fn set_values(&self, scope: &Scope, key: &str, values: Vec<String>) -> StoreResult<()> {
        self.check()?;
        self.inner.set_values(scope, key, values).await
    }

    async fn add_value(&self, scope: &Scope, key: &str, value: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.add_value(scope, key, value).await
    }

    async fn remove_value(&self, scope: &Scope, key: &str, value: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.remove_value(scope, key, value).await
    }

    async fn component_enabled(&self, tenant: &str, component: &str) -> StoreResult<Option<bool>> {
        self.inner.component_enabled(tenant, component).await
    }

    async fn set_component_enabled(&self, tenant: &str, component: &str, enabled: bool) -> StoreResult<()> {
        self.check()?;
        self.inner.set_component_enabled(tenant, component, enabled).await
    }
}
