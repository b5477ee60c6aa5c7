//! Completion signal
//!
//! The SX1262 raises DIO1 once per finished transmit or receive. That edge
//! is turned into a single pending flag which the link consumes before it
//! queues more work. Signalling twice before a consume still leaves exactly
//! one pending completion.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// One-shot completion indicator shared between interrupt and link
pub struct CompletionSignal {
    inner: Signal<CriticalSectionRawMutex, ()>,
}

impl CompletionSignal {
    /// Create a signal with nothing pending
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Signal::new(),
        }
    }

    /// Mark a hardware completion (callable from interrupt context)
    pub fn signal(&self) {
        self.inner.signal(());
    }

    /// Consume a pending completion, if any
    pub fn take(&self) -> bool {
        self.inner.try_take().is_some()
    }

    /// Check for a pending completion without consuming it
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.signaled()
    }

    /// Drop any pending completion
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Wait for the next completion and consume it
    pub async fn wait(&self) {
        self.inner.wait().await;
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide completion signal for the node's single transceiver.
///
/// The DIO1 interrupt has no user-data parameter, so the interrupt task
/// reaches the link through this singleton. The board carries exactly one
/// radio; a second transceiver would need its own signal.
pub static RADIO_COMPLETION: CompletionSignal = CompletionSignal::new();
