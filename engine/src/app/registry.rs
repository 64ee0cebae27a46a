//! Open application instances of one process.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use log::info;

use crate::app::instance::{AppInstance, AppServices};
use crate::error::{EngineError, Result};

#[derive(Debug, Default)]
struct RegistryState {
    open: BTreeSet<u32>,
    next_id: u32,
    terminated: bool,
}

/// Decides whether closing an instance ends the session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates and registers a new instance, then runs its project-created
    /// callback.
    pub fn new_instance(self: &Arc<Self>, services: AppServices) -> Result<AppInstance> {
        let app_id = {
            let mut state = self.lock();
            if state.terminated {
                return Err(EngineError::runtime("the session has been terminated"));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.open.insert(id);
            id
        };
        info!("Application instance {} opened", app_id);
        let instance = AppInstance::new(app_id, services, Arc::clone(self));
        instance.exec_on_project_created_callback();
        Ok(instance)
    }

    /// Returns true when `app_id` was the last open instance.
    pub fn unregister(&self, app_id: u32) -> bool {
        let mut state = self.lock();
        let removed = state.open.remove(&app_id);
        removed && state.open.is_empty()
    }

    pub fn is_open(&self, app_id: u32) -> bool {
        self.lock().open.contains(&app_id)
    }

    pub fn open_instances(&self) -> Vec<u32> {
        self.lock().open.iter().copied().collect()
    }

    pub fn terminate(&self) {
        let mut state = self.lock();
        if !state.terminated {
            info!("Session terminated");
        }
        state.terminated = true;
        state.open.clear();
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }
}
