/// Statistics tracking for the event bus
use crate::events::EventKind;
use serde::{Deserialize, Serialize};

/// Most recent faults kept for inspection.
pub const FAULT_LOG_CAPACITY: usize = 64;

/// Dispatch statistics for monitoring
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BusStats {
    /// Total number of registered hooks
    pub total_hooks: usize,
    /// Events triggered since start
    pub events_triggered: u64,
    /// Individual handler invocations
    pub handlers_invoked: u64,
    /// Invocations that returned an error or panicked
    pub handler_faults: u64,
    /// Dispatches cut short by a handler returning stop
    pub dispatches_stopped: u64,
}

/// A handler that failed during dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerFault {
    pub stream: EventKind,
    pub owner: String,
    pub handler: String,
    /// Full error chain or panic message
    pub error: String,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that were called, including faulty ones
    pub invoked: usize,
    /// Whether a handler stopped the dispatch
    pub stopped: bool,
    pub faults: Vec<HandlerFault>,
}
