//! Presentation-side capabilities injected into the engine.
//!
//! The engine never draws anything itself. Everything a front end would show
//! (dialogs, progress, node widgets, viewer refreshes) goes through
//! [`HostCallbacks`]; [`HeadlessHost`] just logs.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::node::Node;
use crate::render::BatchReport;

/// Creation context forwarded to the presentation layer with a new node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeGuiRequest {
    pub position: Option<(f64, f64)>,
    pub push_undo: bool,
    pub auto_connect: bool,
    pub user_edited: bool,
    pub was_loaded: bool,
}

pub trait HostCallbacks: Send + Sync {
    fn error_dialog(&self, title: &str, message: &str);
    fn warning_dialog(&self, title: &str, message: &str);

    fn progress_start(&self, task: &str, message: &str);
    /// `progress` is in `0.0..=1.0`. Returning false aborts the task.
    fn progress_update(&self, task: &str, progress: f64) -> bool;
    fn progress_end(&self, task: &str);

    fn create_node_gui(&self, node: &Arc<Node>, request: &NodeGuiRequest);
    /// Emitted once per successful construction, fresh or loaded.
    fn on_node_created(&self, node: &Arc<Node>, was_loaded: bool, user_edited: bool);

    fn render_process_started(&self, writer: &str, first: i32, last: i32, step: i32);
    fn render_finished(&self, report: &BatchReport);

    fn project_load_status(&self, message: &str);
    fn redraw_viewers(&self);
}

/// Host for command-line and test sessions. Progress is never aborted.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessHost;

impl HostCallbacks for HeadlessHost {
    fn error_dialog(&self, title: &str, message: &str) {
        error!("{}: {}", title, message);
    }

    fn warning_dialog(&self, title: &str, message: &str) {
        warn!("{}: {}", title, message);
    }

    fn progress_start(&self, task: &str, message: &str) {
        debug!("[{}] {}", task, message);
    }

    fn progress_update(&self, _task: &str, _progress: f64) -> bool {
        true
    }

    fn progress_end(&self, task: &str) {
        debug!("[{}] done", task);
    }

    fn create_node_gui(&self, _node: &Arc<Node>, _request: &NodeGuiRequest) {}

    fn on_node_created(&self, node: &Arc<Node>, was_loaded: bool, user_edited: bool) {
        debug!(
            "Node {} created (loaded: {}, user: {})",
            node.script_name(),
            was_loaded,
            user_edited
        );
    }

    fn render_process_started(&self, writer: &str, first: i32, last: i32, step: i32) {
        info!(
            "Render process for {} started: frames {}..{} step {}",
            writer, first, last, step
        );
    }

    fn render_finished(&self, report: &BatchReport) {
        info!(
            "Render batch finished: {} succeeded, {} failed",
            report.succeeded().len(),
            report.failures().len()
        );
    }

    fn project_load_status(&self, message: &str) {
        debug!("{}", message);
    }

    fn redraw_viewers(&self) {}
}
