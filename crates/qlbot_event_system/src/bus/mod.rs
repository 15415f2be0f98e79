//! # Event Bus
//!
//! Registry of event streams. Each stream keeps, per owner, five priority
//! buckets of hooks. Dispatch walks the buckets from highest to lowest; inside
//! a bucket, owners are visited in the order they first hooked the stream.
//!
//! ## Fault isolation
//!
//! Every hook runs inside `catch_unwind`. An error or a panic is logged with
//! the owner and handler name and recorded in the [`DispatchReport`], then
//! dispatch moves on to the next hook. Only [`Flow::Stop`] ends a dispatch
//! early.
//!
//! ## Locking
//!
//! Hooks are copied out of the registry before any of them runs, so hooks are
//! free to register or remove hooks (including themselves) while handling an
//! event.

mod stats;

pub use stats::{BusStats, DispatchReport, HandlerFault, FAULT_LOG_CAPACITY};

use crate::error::{panic_message, RegistrationError};
use crate::events::{Event, EventKind};
use crate::utils::{lock, read, write};
use compact_str::CompactString;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, warn};

/// What a hook wants the dispatcher to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Keep dispatching
    #[default]
    Continue,
    /// Skip every remaining hook
    Stop,
    /// Only meaningful for commands: reply with the usage string
    Usage,
}

/// Dispatch priority, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Highest,
    High,
    #[default]
    Normal,
    Low,
    Lowest,
}

/// Number of priority buckets.
pub const PRIORITY_LEVELS: usize = 5;

impl Priority {
    pub const ALL: [Priority; PRIORITY_LEVELS] = [
        Priority::Highest,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Lowest,
    ];

    pub fn level(self) -> u8 {
        self as u8
    }

    pub(crate) fn bucket(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Priority {
    type Error = RegistrationError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Priority::ALL
            .get(usize::from(level))
            .copied()
            .ok_or(RegistrationError::InvalidPriority(level))
    }
}

/// Hook callback. `C` is the context handed to every hook (the agent).
pub type HookFn<C> = Arc<dyn Fn(&C, &Event) -> anyhow::Result<Flow> + Send + Sync>;

struct Hook<C> {
    handler: CompactString,
    callback: HookFn<C>,
}

impl<C> Clone for Hook<C> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

struct OwnerHooks<C> {
    owner: CompactString,
    buckets: [Vec<Hook<C>>; PRIORITY_LEVELS],
}

impl<C> OwnerHooks<C> {
    fn new(owner: &str) -> Self {
        Self {
            owner: CompactString::new(owner),
            buckets: Default::default(),
        }
    }

    fn contains(&self, handler: &str) -> bool {
        self.buckets
            .iter()
            .any(|bucket| bucket.iter().any(|h| h.handler == handler))
    }

    fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

struct Stream<C> {
    owners: Vec<OwnerHooks<C>>,
}

impl<C> Stream<C> {
    /// Hooks in dispatch order, optionally limited to one owner.
    fn snapshot(&self, only: Option<&str>) -> Vec<(CompactString, Hook<C>)> {
        let mut hooks = Vec::new();
        for bucket in 0..PRIORITY_LEVELS {
            for owner in &self.owners {
                if only.is_some_and(|o| owner.owner != o) {
                    continue;
                }
                for hook in &owner.buckets[bucket] {
                    hooks.push((owner.owner.clone(), hook.clone()));
                }
            }
        }
        hooks
    }

    fn len(&self) -> usize {
        self.owners.iter().map(OwnerHooks::len).sum()
    }
}

/// Priority-ordered, fault-isolating event dispatcher.
pub struct EventBus<C> {
    streams: DashMap<EventKind, Stream<C>>,
    stats: RwLock<BusStats>,
    fault_log: Mutex<VecDeque<HandlerFault>>,
}

impl<C> EventBus<C> {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
            stats: RwLock::new(BusStats::default()),
            fault_log: Mutex::new(VecDeque::with_capacity(FAULT_LOG_CAPACITY)),
        }
    }

    /// Hooks a handler into a stream.
    ///
    /// # Arguments
    ///
    /// * `kind` - Stream to hook into
    /// * `owner` - Name of the plugin that owns the hook
    /// * `handler` - Handler name, unique per owner and stream
    /// * `priority` - Dispatch bucket
    /// * `callback` - Function called with the context and the event
    ///
    /// # Returns
    ///
    /// `Err(RegistrationError::DuplicateHook)` if `(owner, handler)` is already
    /// hooked into the stream.
    pub fn add_hook<F>(
        &self,
        kind: EventKind,
        owner: &str,
        handler: &str,
        priority: Priority,
        callback: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(&C, &Event) -> anyhow::Result<Flow> + Send + Sync + 'static,
    {
        let mut stream = self
            .streams
            .entry(kind)
            .or_insert_with(|| Stream { owners: Vec::new() });

        if stream
            .owners
            .iter()
            .any(|o| o.owner == owner && o.contains(handler))
        {
            return Err(RegistrationError::DuplicateHook {
                stream: kind.to_string(),
                owner: owner.to_string(),
                handler: handler.to_string(),
            });
        }

        let position = match stream.owners.iter().position(|o| o.owner == owner) {
            Some(position) => position,
            None => {
                stream.owners.push(OwnerHooks::new(owner));
                stream.owners.len() - 1
            }
        };
        stream.owners[position].buckets[priority.bucket()].push(Hook {
            handler: CompactString::new(handler),
            callback: Arc::new(callback),
        });
        drop(stream);

        write(&self.stats).total_hooks += 1;
        debug!("🔧 Hooked {}@{} into '{}' ({:?})", handler, owner, kind, priority);
        Ok(())
    }

    /// Removes a previously added hook.
    pub fn remove_hook(
        &self,
        kind: EventKind,
        owner: &str,
        handler: &str,
    ) -> Result<(), RegistrationError> {
        let unknown = || RegistrationError::UnknownHook {
            stream: kind.to_string(),
            owner: owner.to_string(),
            handler: handler.to_string(),
        };

        let mut stream = self.streams.get_mut(&kind).ok_or_else(unknown)?;
        let position = stream
            .owners
            .iter()
            .position(|o| o.owner == owner && o.contains(handler))
            .ok_or_else(unknown)?;

        let entry = &mut stream.owners[position];
        for bucket in entry.buckets.iter_mut() {
            bucket.retain(|h| h.handler != handler);
        }
        if entry.len() == 0 {
            stream.owners.remove(position);
        }
        drop(stream);

        let mut stats = write(&self.stats);
        stats.total_hooks = stats.total_hooks.saturating_sub(1);
        debug!("🔧 Unhooked {}@{} from '{}'", handler, owner, kind);
        Ok(())
    }

    /// Removes every hook registered by `owner`.
    ///
    /// # Returns
    ///
    /// The number of hooks removed.
    pub fn remove_owner(&self, owner: &str) -> usize {
        let mut removed = 0;
        for mut stream in self.streams.iter_mut() {
            stream.owners.retain(|o| {
                if o.owner == owner {
                    removed += o.len();
                    false
                } else {
                    true
                }
            });
        }

        let mut stats = write(&self.stats);
        stats.total_hooks = stats.total_hooks.saturating_sub(removed);
        removed
    }

    /// Dispatches `event` to every hook of its stream.
    ///
    /// # Returns
    ///
    /// A report of how many hooks ran, whether one stopped the dispatch, and
    /// which ones failed.
    pub fn trigger(&self, ctx: &C, event: &Event) -> DispatchReport {
        let hooks = self.snapshot(event.kind(), None);
        self.run(ctx, event, hooks)
    }

    /// Dispatches `event` to the hooks of a single owner.
    pub fn trigger_owner(&self, ctx: &C, event: &Event, owner: &str) -> DispatchReport {
        let hooks = self.snapshot(event.kind(), Some(owner));
        self.run(ctx, event, hooks)
    }

    fn snapshot(&self, kind: EventKind, only: Option<&str>) -> Vec<(CompactString, Hook<C>)> {
        self.streams
            .get(&kind)
            .map(|stream| stream.snapshot(only))
            .unwrap_or_default()
    }

    fn run(&self, ctx: &C, event: &Event, hooks: Vec<(CompactString, Hook<C>)>) -> DispatchReport {
        let kind = event.kind();
        let mut report = DispatchReport::default();

        for (owner, hook) in hooks {
            report.invoked += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| (hook.callback)(ctx, event)));

            let error = match outcome {
                Ok(Ok(Flow::Continue)) => continue,
                Ok(Ok(Flow::Stop)) => {
                    report.stopped = true;
                    break;
                }
                Ok(Ok(other)) => {
                    warn!(
                        "⚠️ {}@{} returned unexpected value {:?} on '{}'",
                        hook.handler, owner, other, kind
                    );
                    continue;
                }
                Ok(Err(e)) => format!("{e:?}"),
                Err(panic) => panic_message(panic.as_ref()),
            };

            error!("❌ {}@{} failed on '{}': {}", hook.handler, owner, kind, error);
            report.faults.push(HandlerFault {
                stream: kind,
                owner: owner.to_string(),
                handler: hook.handler.to_string(),
                error,
            });
        }

        self.record(&report);
        report
    }

    fn record(&self, report: &DispatchReport) {
        {
            let mut stats = write(&self.stats);
            stats.events_triggered += 1;
            stats.handlers_invoked += report.invoked as u64;
            stats.handler_faults += report.faults.len() as u64;
            if report.stopped {
                stats.dispatches_stopped += 1;
            }
        }

        if !report.faults.is_empty() {
            let mut log = lock(&self.fault_log);
            for fault in &report.faults {
                if log.len() == FAULT_LOG_CAPACITY {
                    log.pop_front();
                }
                log.push_back(fault.clone());
            }
        }
    }

    /// Whether `(owner, handler)` is hooked into `kind`.
    pub fn is_hooked(&self, kind: EventKind, owner: &str, handler: &str) -> bool {
        self.streams.get(&kind).is_some_and(|stream| {
            stream
                .owners
                .iter()
                .any(|o| o.owner == owner && o.contains(handler))
        })
    }

    /// Number of hooks on one stream.
    pub fn hook_count(&self, kind: EventKind) -> usize {
        self.streams.get(&kind).map(|s| s.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> BusStats {
        read(&self.stats).clone()
    }

    /// Most recent faults, oldest first.
    pub fn recent_faults(&self) -> Vec<HandlerFault> {
        lock(&self.fault_log).iter().cloned().collect()
    }
}

impl<C> Default for EventBus<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for EventBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("streams", &self.streams.len())
            .field("stats", &self.stats())
            .finish()
    }
}
