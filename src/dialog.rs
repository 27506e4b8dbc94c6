//! Modal prompts as request/response pairs
//!
//! [`PromptSlot`] is a single-slot pending-request register: `show` parks the
//! caller until the UI answers through `resolve`. At most one request is
//! outstanding; a second `show` while visible fails instead of queueing.

use async_trait::async_trait;
use log::debug;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{oneshot, watch};

use crate::error::DialogError;
use crate::model::{CategoryOption, CATEGORY_OPTIONS};

pub const CATEGORY_DIALOG_TITLE: &str = "Qual o tipo de evento?";

struct Pending<T> {
    id: u64,
    tx: oneshot::Sender<Option<T>>,
}

struct SlotState<T> {
    next_id: u64,
    pending: Option<Pending<T>>,
}

/// Visibility only changes while the state lock is held, so a visible slot
/// always has a pending request behind it.
pub struct PromptSlot<T> {
    state: Mutex<SlotState<T>>,
    visible: watch::Sender<bool>,
}

impl<T> Default for PromptSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PromptSlot<T> {
    pub fn new() -> Self {
        let (visible, _) = watch::channel(false);
        Self {
            state: Mutex::new(SlotState {
                next_id: 0,
                pending: None,
            }),
            visible,
        }
    }

    fn state(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Show the prompt and wait for the answer. `Ok(None)` means dismissed.
    /// Dropping the returned future withdraws the request and hides the prompt.
    pub async fn show(&self) -> Result<Option<T>, DialogError> {
        let (id, answer) = {
            let mut state = self.state();
            if state.pending.is_some() {
                return Err(DialogError::AlreadyVisible);
            }
            state.next_id += 1;
            let id = state.next_id;
            let (tx, rx) = oneshot::channel();
            state.pending = Some(Pending { id, tx });
            self.visible.send_replace(true);
            (id, rx)
        };

        let _withdraw = Withdraw { slot: self, id };
        answer.await.map_err(|_| DialogError::Closed)
    }

    /// Answer the outstanding request. Returns false if nothing was waiting.
    pub fn resolve(&self, answer: Option<T>) -> bool {
        let pending = {
            let mut state = self.state();
            let Some(pending) = state.pending.take() else {
                return false;
            };
            self.visible.send_replace(false);
            pending
        };
        pending.tx.send(answer).is_ok()
    }

    /// Drop the outstanding request; its caller sees [`DialogError::Closed`]
    pub fn close(&self) {
        let mut state = self.state();
        if state.pending.take().is_some() {
            self.visible.send_replace(false);
        }
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    pub fn watch_visibility(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }

    fn withdraw(&self, id: u64) {
        let mut state = self.state();
        if state.pending.as_ref().is_some_and(|p| p.id == id) {
            state.pending = None;
            self.visible.send_replace(false);
            debug!("Prompt {} withdrawn before an answer", id);
        }
    }
}

/// Clears the slot if the waiting `show` goes away unanswered
struct Withdraw<'a, T> {
    slot: &'a PromptSlot<T>,
    id: u64,
}

impl<T> Drop for Withdraw<'_, T> {
    fn drop(&mut self) {
        self.slot.withdraw(self.id);
    }
}

/// Category picker as seen by the interaction controller
#[async_trait]
pub trait SelectionDialog: Send + Sync {
    /// Resolve to the chosen option, or `None` if dismissed
    async fn show(&self) -> Result<Option<CategoryOption>, DialogError>;
}

/// The category picker overlay
pub struct CategoryDialog {
    options: &'static [CategoryOption],
    slot: PromptSlot<usize>,
}

impl Default for CategoryDialog {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryDialog {
    pub fn new() -> Self {
        Self {
            options: &CATEGORY_OPTIONS,
            slot: PromptSlot::new(),
        }
    }

    pub fn title(&self) -> &'static str {
        CATEGORY_DIALOG_TITLE
    }

    pub fn options(&self) -> &'static [CategoryOption] {
        self.options
    }

    /// User picked the option at `index`. Out-of-range picks are ignored.
    pub fn select(&self, index: usize) -> bool {
        if index >= self.options.len() {
            debug!("Ignoring out-of-range category pick {}", index);
            return false;
        }
        self.slot.resolve(Some(index))
    }

    /// Backdrop tap or back button
    pub fn dismiss(&self) -> bool {
        self.slot.resolve(None)
    }

    pub fn close(&self) {
        self.slot.close();
    }

    pub fn is_visible(&self) -> bool {
        self.slot.is_visible()
    }

    pub fn watch_visibility(&self) -> watch::Receiver<bool> {
        self.slot.watch_visibility()
    }
}

#[async_trait]
impl SelectionDialog for CategoryDialog {
    async fn show(&self) -> Result<Option<CategoryOption>, DialogError> {
        let picked = self.slot.show().await?;
        Ok(picked.and_then(|i| self.options.get(i).copied()))
    }
}
