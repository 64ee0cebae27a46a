//! Render work dispatcher.
//!
//! A dispatch call goes `Resolving -> Validating -> Executing` and ends in
//! `Completed` or `Failed`. Resolution and validation run on the calling thread
//! and reject the whole batch before anything executes. Execution failures are
//! kept per item. Only one dispatch may be in flight per dispatcher.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use rayon::prelude::*;

use crate::error::{EngineError, Result};
use crate::host::HostCallbacks;
use crate::node::NodeCollection;
use crate::render::error::RenderError;
use crate::render::executor::render_in_process;
use crate::render::process::ProcessLauncher;
use crate::render::stats::RenderStats;
use crate::render::work::{RenderTarget, RenderWork};
use crate::util::timing::ScopedTimer;

/// Serializes the current project for external render processes.
pub type ProjectExporter = Arc<dyn Fn() -> Result<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Resolving,
    Validating,
    Executing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    InProcessSequential,
    /// In-process on a bounded worker pool.
    InProcessPooled { workers: usize },
    /// One renderer process per item.
    ExternalProcesses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub collect_stats: bool,
    pub mode: ExecutionMode,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            collect_stats: false,
            mode: ExecutionMode::InProcessSequential,
        }
    }
}

impl DispatchOptions {
    pub fn with_stats(mut self, collect_stats: bool) -> Self {
        self.collect_stats = collect_stats;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Shared stop request. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub writer: String,
    /// Stats are present only when they were requested.
    pub result: std::result::Result<Option<RenderStats>, RenderError>,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregated outcome of a batch, one item per writer in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub items: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn failures(&self) -> Vec<&RenderError> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref().err())
            .collect()
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|item| item.is_success())
            .map(|item| item.writer.as_str())
            .collect()
    }

    pub fn was_cancelled(&self) -> bool {
        self.failures().iter().any(|e| e.is_cancelled())
    }

    pub fn is_success(&self) -> bool {
        self.items.iter().all(ItemOutcome::is_success)
    }

    pub fn outcome(&self, writer: &str) -> Option<&ItemOutcome> {
        self.items.iter().find(|item| item.writer == writer)
    }
}

/// Holds the dispatcher's single busy slot until dropped.
struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| EngineError::DispatchBusy)?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Everything needed to execute one item, shared with the worker threads.
#[derive(Clone)]
struct ItemRunner {
    graph: NodeCollection,
    host: Arc<dyn HostCallbacks>,
    launcher: Option<ProcessLauncher>,
    project_json: Option<Arc<str>>,
    output_dir: PathBuf,
    collect_stats: bool,
}

impl ItemRunner {
    fn run(&self, work: &RenderWork, force_external: bool, cancel: &CancelToken) -> ItemOutcome {
        let writer = work.writer_name.clone();
        if cancel.is_cancelled() {
            return ItemOutcome {
                result: Err(RenderError::Cancelled {
                    writer: writer.clone(),
                }),
                writer,
            };
        }

        let external = match (&self.launcher, &self.project_json) {
            (Some(launcher), Some(project)) if force_external || requires_clean_host(work) => {
                Some((launcher, project))
            }
            _ => None,
        };
        let result = match external {
            Some((launcher, project)) => launcher.run(
                project,
                work,
                &self.output_dir,
                self.collect_stats,
                cancel,
                self.host.as_ref(),
            ),
            None => render_in_process(
                work,
                &self.graph,
                &self.output_dir,
                cancel,
                self.collect_stats,
                self.host.as_ref(),
            ),
        };

        match &result {
            Ok(_) => info!("Render of {} finished", writer),
            Err(RenderError::Cancelled { .. }) => info!("Render of {} cancelled", writer),
            Err(e) => error!("{}", e),
        }
        ItemOutcome { writer, result }
    }
}

fn requires_clean_host(work: &RenderWork) -> bool {
    work.writer()
        .map(|w| w.descriptor().requires_clean_host)
        .unwrap_or(false)
}

/// Handle on a running batch.
pub struct DispatchHandle {
    cancel: CancelToken,
    receiver: Receiver<BatchReport>,
    monitor: Option<JoinHandle<()>>,
    report: Option<BatchReport>,
}

impl DispatchHandle {
    /// Asks every still-running item to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.report.is_some() || self.monitor.as_ref().is_none_or(|m| m.is_finished())
    }

    /// Non-blocking poll; returns the report once the batch is done.
    pub fn try_report(&mut self) -> Option<&BatchReport> {
        if self.report.is_none() {
            match self.receiver.try_recv() {
                Ok(report) => {
                    self.join_monitor();
                    self.report = Some(report);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
        }
        self.report.as_ref()
    }

    /// Blocks until the batch is done.
    pub fn wait(mut self) -> Result<BatchReport> {
        if let Some(report) = self.report.take() {
            return Ok(report);
        }
        let report = self
            .receiver
            .recv()
            .map_err(|_| EngineError::runtime("render monitor stopped without a report"))?;
        self.join_monitor();
        Ok(report)
    }

    fn join_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            if monitor.join().is_err() {
                warn!("Render monitor thread panicked after reporting");
            }
        }
    }
}

pub struct RenderDispatcher {
    graph: NodeCollection,
    host: Arc<dyn HostCallbacks>,
    busy: Arc<AtomicBool>,
    active: Mutex<Option<CancelToken>>,
    launcher: Option<ProcessLauncher>,
    exporter: Option<ProjectExporter>,
    output_dir: PathBuf,
}

impl RenderDispatcher {
    pub fn new(graph: NodeCollection, host: Arc<dyn HostCallbacks>, output_dir: PathBuf) -> Self {
        Self {
            graph,
            host,
            busy: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
            launcher: None,
            exporter: None,
            output_dir,
        }
    }

    /// Enables external render processes.
    pub fn with_external_renderer(
        mut self,
        launcher: ProcessLauncher,
        exporter: ProjectExporter,
    ) -> Self {
        self.launcher = Some(launcher);
        self.exporter = Some(exporter);
        self
    }

    /// Directory relative writer outputs are resolved against.
    pub fn set_output_dir(&mut self, output_dir: PathBuf) {
        self.output_dir = output_dir;
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn supports_external(&self) -> bool {
        self.launcher.is_some()
    }

    /// Cancels the most recent dispatch if it is still running.
    pub fn cancel_active(&self) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = active.as_ref() {
            token.cancel();
        }
    }

    fn set_active(&self, token: &CancelToken) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
    }

    fn transition(&self, state: DispatchState) {
        debug!("RenderDispatcher: {:?}", state);
    }

    /// Resolving and validating, in that order, for the whole list.
    fn prepare(&self, targets: Vec<RenderTarget>) -> Result<Vec<RenderWork>> {
        self.transition(DispatchState::Resolving);
        let works = targets
            .into_iter()
            .map(|target| target.resolve(&self.graph))
            .collect::<Result<Vec<_>>>()
            .inspect_err(|_| self.transition(DispatchState::Failed))?;

        self.transition(DispatchState::Validating);
        for work in &works {
            work.validate()
                .inspect_err(|_| self.transition(DispatchState::Failed))?;
        }
        Ok(works)
    }

    fn runner(&self, collect_stats: bool, needs_project: bool) -> Result<ItemRunner> {
        let project_json: Option<Arc<str>> = match (&self.exporter, needs_project) {
            (Some(exporter), true) => Some(Arc::from(exporter()?)),
            _ => None,
        };
        Ok(ItemRunner {
            graph: self.graph.clone(),
            host: Arc::clone(&self.host),
            launcher: self.launcher.clone(),
            project_json,
            output_dir: self.output_dir.clone(),
            collect_stats,
        })
    }

    /// Renders one item to completion on the calling thread. Writers that need
    /// a clean host go to an external process when one is configured, as does
    /// everything when `options.mode` is `ExternalProcesses`.
    pub fn render_blocking(
        &self,
        target: RenderTarget,
        options: DispatchOptions,
    ) -> Result<Option<RenderStats>> {
        let report = self.render_blocking_report(target, options)?;
        match report.items.into_iter().next().map(|item| item.result) {
            Some(Ok(stats)) => Ok(stats),
            Some(Err(e)) => Err(EngineError::Render(e)),
            None => Ok(None),
        }
    }

    /// Same as `render_blocking`, with the outcome returned as a one-item
    /// report instead of an error.
    pub fn render_blocking_report(
        &self,
        target: RenderTarget,
        options: DispatchOptions,
    ) -> Result<BatchReport> {
        let busy = BusyGuard::acquire(&self.busy)?;
        let mut works = self.prepare(vec![target])?;
        let Some(work) = works.pop() else {
            return Ok(BatchReport::default());
        };

        let force_external = options.mode == ExecutionMode::ExternalProcesses;
        let external = self.supports_external() && (force_external || requires_clean_host(&work));
        if force_external && !self.supports_external() {
            warn!(
                "No renderer executable configured, rendering {} in-process",
                work.writer_name
            );
        }
        let runner = self.runner(options.collect_stats, external)?;
        let cancel = CancelToken::new();
        self.set_active(&cancel);

        self.transition(DispatchState::Executing);
        let outcome = {
            let _timer = ScopedTimer::info(format!("Blocking render of {}", work.writer_name));
            runner.run(&work, force_external, &cancel)
        };
        self.transition(if outcome.result.is_ok() {
            DispatchState::Completed
        } else {
            DispatchState::Failed
        });
        let report = BatchReport {
            items: vec![outcome],
        };
        drop(busy);
        self.host.render_finished(&report);
        Ok(report)
    }

    /// Starts a batch and returns immediately. Items run on a monitor thread
    /// (or its worker pool); a failing item does not stop the others.
    pub fn start_batch(
        &self,
        targets: Vec<RenderTarget>,
        options: DispatchOptions,
    ) -> Result<DispatchHandle> {
        let busy = BusyGuard::acquire(&self.busy)?;
        let works = self.prepare(targets)?;

        let force_external = options.mode == ExecutionMode::ExternalProcesses;
        let needs_project =
            self.supports_external() && (force_external || works.iter().any(requires_clean_host));
        let runner = self.runner(options.collect_stats, needs_project)?;
        let cancel = CancelToken::new();
        self.set_active(&cancel);

        self.transition(DispatchState::Executing);
        info!("Starting render batch of {} item(s)", works.len());

        let (sender, receiver) = mpsc::channel();
        let host = Arc::clone(&self.host);
        let token = cancel.clone();
        let mode = options.mode;
        let monitor = thread::Builder::new()
            .name("render-monitor".to_string())
            .spawn(move || {
                let report = {
                    let _timer =
                        ScopedTimer::info(format!("Render batch of {} item(s)", works.len()));
                    run_items(&runner, &works, mode, &token)
                };
                debug!(
                    "RenderDispatcher: {:?} ({} failure(s))",
                    DispatchState::Completed,
                    report.failures().len()
                );
                host.render_finished(&report);
                drop(busy);
                let _ = sender.send(report);
            })?;

        Ok(DispatchHandle {
            cancel,
            receiver,
            monitor: Some(monitor),
            report: None,
        })
    }
}

fn run_items(
    runner: &ItemRunner,
    works: &[RenderWork],
    mode: ExecutionMode,
    cancel: &CancelToken,
) -> BatchReport {
    let items = match mode {
        ExecutionMode::InProcessSequential => works
            .iter()
            .map(|work| runner.run(work, false, cancel))
            .collect(),
        ExecutionMode::ExternalProcesses => works
            .iter()
            .map(|work| runner.run(work, true, cancel))
            .collect(),
        ExecutionMode::InProcessPooled { workers } => {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(workers.max(1))
                .thread_name(|i| format!("render-worker-{}", i))
                .build()
            {
                Ok(pool) => pool.install(|| {
                    works
                        .par_iter()
                        .map(|work| runner.run(work, false, cancel))
                        .collect()
                }),
                Err(e) => {
                    warn!("Render pool unavailable ({}), rendering sequentially", e);
                    works
                        .iter()
                        .map(|work| runner.run(work, false, cancel))
                        .collect()
                }
            }
        }
    };
    BatchReport { items }
}
