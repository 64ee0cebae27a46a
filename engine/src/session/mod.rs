//! Session-wide state flags.
//!
//! The creation flags are depth counters: entering twice needs two releases
//! before the flag reads false again. Acquisition returns a [`FlagGuard`] that
//! releases on drop, so every exit path (early return, `?`, unwinding) leaves
//! the counter balanced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlag {
    CreatingNode,
    CreatingNodeTree,
    CreatingScriptedGroup,
}

#[derive(Debug, Default)]
pub struct SessionState {
    creating_node: AtomicUsize,
    creating_node_tree: AtomicUsize,
    creating_scripted_group: AtomicUsize,
    created_with_legacy_ids: AtomicBool,
}

impl SessionState {
    /// All flags cleared.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn counter(&self, flag: SessionFlag) -> &AtomicUsize {
        match flag {
            SessionFlag::CreatingNode => &self.creating_node,
            SessionFlag::CreatingNodeTree => &self.creating_node_tree,
            SessionFlag::CreatingScriptedGroup => &self.creating_scripted_group,
        }
    }

    pub fn enter(self: &Arc<Self>, flag: SessionFlag) -> FlagGuard {
        let previous = self.counter(flag).fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            trace!("Session flag {:?} set", flag);
        }
        FlagGuard {
            state: Arc::clone(self),
            flag,
        }
    }

    fn leave(&self, flag: SessionFlag) {
        let result = self
            .counter(flag)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                depth.checked_sub(1)
            });
        if result == Ok(1) {
            trace!("Session flag {:?} cleared", flag);
        }
    }

    pub fn depth(&self, flag: SessionFlag) -> usize {
        self.counter(flag).load(Ordering::SeqCst)
    }

    pub fn is_set(&self, flag: SessionFlag) -> bool {
        self.depth(flag) > 0
    }

    pub fn is_creating_node(&self) -> bool {
        self.is_set(SessionFlag::CreatingNode)
    }

    pub fn is_creating_node_tree(&self) -> bool {
        self.is_set(SessionFlag::CreatingNodeTree)
    }

    pub fn is_creating_scripted_group(&self) -> bool {
        self.is_set(SessionFlag::CreatingScriptedGroup)
    }

    /// True while any creation bracket is open; autosave and refreshes wait.
    pub fn is_bulk_mutation_in_flight(&self) -> bool {
        self.is_creating_node() || self.is_creating_node_tree()
    }

    pub fn was_created_with_legacy_ids(&self) -> bool {
        self.created_with_legacy_ids.load(Ordering::SeqCst)
    }

    pub fn set_created_with_legacy_ids(&self, value: bool) {
        self.created_with_legacy_ids.store(value, Ordering::SeqCst);
    }

    /// Clears everything. Guards still alive afterwards release without underflow.
    pub fn reset(&self) {
        self.creating_node.store(0, Ordering::SeqCst);
        self.creating_node_tree.store(0, Ordering::SeqCst);
        self.creating_scripted_group.store(0, Ordering::SeqCst);
        self.created_with_legacy_ids.store(false, Ordering::SeqCst);
    }
}

/// Scope-bound hold on one session flag.
#[must_use = "the flag is released as soon as the guard is dropped"]
pub struct FlagGuard {
    state: Arc<SessionState>,
    flag: SessionFlag,
}

impl FlagGuard {
    pub fn flag(&self) -> SessionFlag {
        self.flag
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.state.leave(self.flag);
    }
}
