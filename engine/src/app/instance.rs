//! Application instance: one project, one top-level graph, one timeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::app::command_line::{CommandLineArgs, WriterArg};
use crate::app::project::{Project, ProjectDocument, name_from_path};
use crate::app::registry::SessionRegistry;
use crate::app::timeline::Timeline;
use crate::config::EngineSettings;
use crate::error::{EngineError, Result};
use crate::host::{HeadlessHost, HostCallbacks};
use crate::node::params::{FIRST_FRAME_PARAM, LAST_FRAME_PARAM};
use crate::node::{CreationRequest, LoadRequest, Node, NodeCollection, NodeFactory};
use crate::plugin::{HostCapabilities, PluginManager};
use crate::render::{
    BatchReport, DispatchHandle, DispatchOptions, ExecutionMode, ProcessLauncher,
    ProjectExporter, RenderDispatcher, RenderRequest, RenderStats, RenderTarget,
};
use crate::script::{NoScripting, ScriptRunner};
use crate::session::{SessionFlag, SessionState};
use crate::util::timing::{ScopedTimer, measure_info};

/// Collaborators shared by every instance of a session.
#[derive(Clone)]
pub struct AppServices {
    pub plugins: Arc<PluginManager>,
    pub host: Arc<dyn HostCallbacks>,
    pub scripts: Arc<dyn ScriptRunner>,
    pub settings: EngineSettings,
}

impl AppServices {
    /// No presentation layer and no scripting runtime.
    pub fn headless(plugins: Arc<PluginManager>, settings: EngineSettings) -> Self {
        Self {
            plugins,
            host: Arc::new(HeadlessHost),
            scripts: Arc::new(NoScripting),
            settings,
        }
    }

    pub fn with_host(mut self, host: Arc<dyn HostCallbacks>) -> Self {
        self.host = host;
        self
    }

    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptRunner>) -> Self {
        self.scripts = scripts;
        self
    }
}

/// Result of `start_writers_rendering`.
pub enum RenderLaunch {
    Finished(BatchReport),
    Running(DispatchHandle),
}

impl RenderLaunch {
    /// Waits for a running batch if needed.
    pub fn into_report(self) -> Result<BatchReport> {
        match self {
            RenderLaunch::Finished(report) => Ok(report),
            RenderLaunch::Running(handle) => handle.wait(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Other instances are still open.
    InstanceClosed,
    /// This was the last instance; the session is over.
    SessionTerminated,
}

pub struct AppInstance {
    app_id: u32,
    registry: Arc<SessionRegistry>,
    services: AppServices,
    project: Arc<RwLock<Project>>,
    timeline: Arc<RwLock<Timeline>>,
    nodes: NodeCollection,
    flags: Arc<SessionState>,
    factory: NodeFactory,
    dispatcher: RenderDispatcher,
    closed: bool,
}

impl AppInstance {
    pub(crate) fn new(app_id: u32, services: AppServices, registry: Arc<SessionRegistry>) -> Self {
        let project = Arc::new(RwLock::new(Project::default()));
        let timeline = Arc::new(RwLock::new(Timeline::default()));
        let nodes = NodeCollection::new();
        let flags = SessionState::new();

        let factory = NodeFactory::new(
            Arc::clone(&services.plugins),
            Arc::clone(&flags),
            Arc::clone(&services.host),
            Arc::clone(&services.scripts),
            nodes.clone(),
            HostCapabilities::new(services.settings.host_capabilities.iter().cloned()),
            &app_id_string(app_id),
            &services.settings.default_writer,
        );

        let output_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut dispatcher =
            RenderDispatcher::new(nodes.clone(), Arc::clone(&services.host), output_dir);
        if let Some(executable) = &services.settings.renderer_executable {
            dispatcher = dispatcher.with_external_renderer(
                ProcessLauncher::new(executable),
                project_exporter(&project, &timeline, &nodes),
            );
        }

        Self {
            app_id,
            registry,
            services,
            project,
            timeline,
            nodes,
            flags,
            factory,
            dispatcher,
            closed: false,
        }
    }

    pub fn app_id(&self) -> u32 {
        self.app_id
    }

    /// Name scripts use to address this instance, e.g. `app1`.
    pub fn app_id_string(&self) -> String {
        app_id_string(self.app_id)
    }

    pub fn project(&self) -> Arc<RwLock<Project>> {
        Arc::clone(&self.project)
    }

    pub fn timeline(&self) -> Arc<RwLock<Timeline>> {
        Arc::clone(&self.timeline)
    }

    pub fn nodes(&self) -> &NodeCollection {
        &self.nodes
    }

    pub fn flags(&self) -> &Arc<SessionState> {
        &self.flags
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.services.plugins
    }

    pub fn factory(&self) -> &NodeFactory {
        &self.factory
    }

    pub fn dispatcher(&self) -> &RenderDispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.services.settings
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn read_project(&self) -> Result<RwLockReadGuard<'_, Project>> {
        self.project.read().map_err(|e| {
            EngineError::runtime(format!("Failed to acquire project read lock: {}", e))
        })
    }

    fn write_project(&self) -> Result<RwLockWriteGuard<'_, Project>> {
        self.project.write().map_err(|e| {
            EngineError::runtime(format!("Failed to acquire project write lock: {}", e))
        })
    }

    fn read_timeline(&self) -> Result<RwLockReadGuard<'_, Timeline>> {
        self.timeline.read().map_err(|e| {
            EngineError::runtime(format!("Failed to acquire timeline read lock: {}", e))
        })
    }

    fn write_timeline(&self) -> Result<RwLockWriteGuard<'_, Timeline>> {
        self.timeline.write().map_err(|e| {
            EngineError::runtime(format!("Failed to acquire timeline write lock: {}", e))
        })
    }

    // --- Nodes ---

    pub fn create_node(&self, request: CreationRequest) -> Result<Arc<Node>> {
        let add_to_project = request.add_to_project;
        let node = self.factory.create_node(request)?;
        if add_to_project {
            self.write_project()?.dirty = true;
        }
        Ok(node)
    }

    pub fn load_node(&self, request: LoadRequest<'_>) -> Result<Arc<Node>> {
        let node = self.factory.load_node(request)?;
        self.write_project()?.dirty = true;
        Ok(node)
    }

    pub fn create_writer(
        &self,
        filename: &str,
        collection: Option<&NodeCollection>,
        user_edited: bool,
        first_frame: Option<i32>,
        last_frame: Option<i32>,
    ) -> Result<Arc<Node>> {
        let node =
            self.factory
                .create_writer(filename, collection, user_edited, first_frame, last_frame)?;
        self.write_project()?.dirty = true;
        Ok(node)
    }

    /// Removes a top-level node, disconnecting everything that read from it.
    pub fn remove_node(&self, id: Uuid) -> Result<Option<Arc<Node>>> {
        let removed = self.nodes.remove(id);
        if removed.is_some() {
            self.write_project()?.dirty = true;
        }
        Ok(removed)
    }

    pub fn get_node_by_fully_specified_name(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes.find_by_fully_specified_name(name)
    }

    // --- Timeline ---

    pub fn frame_range(&self) -> Result<(i32, i32)> {
        Ok(self.read_timeline()?.frame_range())
    }

    pub fn set_frame_range(&self, first: i32, last: i32) -> Result<()> {
        self.write_timeline()?.set_frame_range(first, last);
        self.write_project()?.dirty = true;
        Ok(())
    }

    pub fn seek(&self, frame: i32) -> Result<i32> {
        let frame = self.write_timeline()?.seek(frame);
        self.services.host.redraw_viewers();
        Ok(frame)
    }

    pub fn project_frame_rate(&self) -> Result<f64> {
        Ok(self.read_project()?.frame_rate)
    }

    // --- Project lifecycle ---

    /// Loads `path` and replaces the graph, timeline and project metadata.
    ///
    /// The new graph is built off to the side and swapped in only once it is
    /// complete, so readers of `nodes()` never see a partially loaded project.
    /// On failure the current project is left untouched and the host shows
    /// the error.
    pub fn load_project(&mut self, path: &Path) -> Result<()> {
        let result = self.load_project_document(path);
        if let Err(e) = &result {
            self.services.host.project_load_status("");
            self.services
                .host
                .error_dialog("Project load failed", &e.to_string());
        }
        result
    }

    fn load_project_document(&mut self, path: &Path) -> Result<()> {
        let _timer = ScopedTimer::info(format!("Loading project {}", path.display()));
        self.services
            .host
            .project_load_status(&format!("Loading {}", path.display()));

        let json_str = fs::read_to_string(path).map_err(|e| EngineError::project_load(path, e))?;
        let document =
            ProjectDocument::load(&json_str).map_err(|e| EngineError::project_load(path, e))?;

        self.dispatcher.cancel_active();
        let previous_legacy = self.flags.was_created_with_legacy_ids();
        let legacy = document.uses_legacy_ids();
        if legacy {
            info!("{} uses legacy lower-case plugin ids", path.display());
        }
        self.flags.set_created_with_legacy_ids(legacy);

        let staged = NodeCollection::new();
        let built = {
            let _tree = self.flags.enter(SessionFlag::CreatingNodeTree);
            self.factory.load_tree(&staged, &document.nodes, false)
        };
        if let Err(e) = built {
            self.flags.set_created_with_legacy_ids(previous_legacy);
            return Err(EngineError::project_load(path, e));
        }

        {
            let mut project = self.write_project()?;
            let mut timeline = self.write_timeline()?;
            self.nodes.replace_contents(&staged);
            *project = Project::from_document(&document, path);
            let mut loaded_timeline = Timeline::new(document.first_frame, document.last_frame);
            loaded_timeline.seek(document.current_frame);
            *timeline = loaded_timeline;
        }

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            self.dispatcher.set_output_dir(dir.to_path_buf());
        }
        info!(
            "Project {} loaded with {} node(s)",
            path.display(),
            self.nodes.len()
        );

        if let Some(callback) = document.on_project_loaded.as_deref() {
            self.run_project_callback("post-load", callback);
        }
        self.services.host.project_load_status("");
        self.services.host.redraw_viewers();
        Ok(())
    }

    fn write_document(&self, path: &Path) -> Result<()> {
        let document = {
            let project = self.read_project()?;
            let timeline = self.read_timeline()?;
            ProjectDocument::capture(&project, &timeline, &self.nodes)
        };
        fs::write(path, document.save()?)?;
        Ok(())
    }

    /// Writes the project to `path` and makes it the project's file.
    pub fn save(&self, path: &Path) -> Result<()> {
        measure_info(format!("Saving project {}", path.display()), || {
            self.write_document(path)
        })?;
        let mut project = self.write_project()?;
        project.path = Some(path.to_path_buf());
        project.dirty = false;
        info!("Project saved to {}", path.display());
        Ok(())
    }

    /// Like `save`, also renaming the project after the new file.
    pub fn save_as(&self, path: &Path) -> Result<()> {
        self.write_project()?.name = name_from_path(path);
        self.save(path)
    }

    /// Writes a copy without touching the project's path or dirty state.
    pub fn save_temp(&self, path: &Path) -> Result<()> {
        self.write_document(path)?;
        debug!("Project copy written to {}", path.display());
        Ok(())
    }

    /// Writes an autosave copy unless a node or node tree is being created.
    /// Returns the file written, if any.
    pub fn trigger_autosave(&self) -> Result<Option<PathBuf>> {
        if self.flags.is_bulk_mutation_in_flight() {
            debug!("Autosave postponed: node creation in progress");
            return Ok(None);
        }
        let Some(dir) = &self.services.settings.autosave_dir else {
            return Ok(None);
        };
        fs::create_dir_all(dir)?;
        let name = self.read_project()?.name.clone();
        let path = dir.join(format!("{}.{}.autosave.json", name, self.app_id_string()));
        self.save_temp(&path)?;
        Ok(Some(path))
    }

    /// Clears the graph and starts a fresh project; the instance stays open.
    pub fn reset_project(&mut self) -> Result<()> {
        self.dispatcher.cancel_active();
        {
            let _tree = self.flags.enter(SessionFlag::CreatingNodeTree);
            self.nodes.clear();
        }
        *self.write_project()? = Project::default();
        *self.write_timeline()? = Timeline::default();
        self.flags.set_created_with_legacy_ids(false);
        self.services.host.redraw_viewers();
        info!("Project of {} reset", self.app_id_string());
        Ok(())
    }

    /// Resets the project and closes this instance. Closing the last open
    /// instance terminates the session.
    pub fn close_project(&mut self) -> Result<CloseOutcome> {
        if self.closed {
            return Ok(if self.registry.is_terminated() {
                CloseOutcome::SessionTerminated
            } else {
                CloseOutcome::InstanceClosed
            });
        }

        self.reset_project()?;
        self.flags.reset();
        self.closed = true;

        if self.registry.unregister(self.app_id) {
            self.registry.terminate();
            Ok(CloseOutcome::SessionTerminated)
        } else {
            info!("{} closed", self.app_id_string());
            Ok(CloseOutcome::InstanceClosed)
        }
    }

    pub fn about_to_quit(&mut self) -> Result<CloseOutcome> {
        info!("{} about to quit", self.app_id_string());
        self.close_project()
    }

    pub fn exec_on_project_created_callback(&self) {
        let callback = match self.read_project() {
            Ok(project) => project.on_project_created.clone(),
            Err(e) => {
                warn!("{}", e);
                None
            }
        };
        let callback =
            callback.or_else(|| self.services.settings.on_project_created.clone());
        if let Some(callback) = callback {
            self.run_project_callback("project-created", &callback);
        }
    }

    /// Script failures here are logged and swallowed.
    fn run_project_callback(&self, hook: &str, entry_point: &str) {
        let args = [self.app_id_string()];
        match self.services.scripts.call(entry_point, &args, None) {
            Ok(()) => debug!("{} callback '{}' ran", hook, entry_point),
            Err(e) => {
                warn!("{} callback '{}' failed: {}", hook, entry_point, e);
                self.services.host.warning_dialog(
                    &format!("{} callback failed", hook),
                    &format!("{}: {}", entry_point, e),
                );
            }
        }
    }

    // --- Rendering ---

    fn render_options(
        &self,
        items: usize,
        collect_stats: bool,
        separate_process: bool,
    ) -> DispatchOptions {
        let mode = if separate_process {
            ExecutionMode::ExternalProcesses
        } else {
            let workers = self.services.settings.worker_count().min(items.max(1));
            if workers > 1 {
                ExecutionMode::InProcessPooled { workers }
            } else {
                ExecutionMode::InProcessSequential
            }
        };
        DispatchOptions::default()
            .with_stats(collect_stats)
            .with_mode(mode)
    }

    /// Renders the given writers. An empty list renders every writer over its
    /// own range. With `block` the call returns once the batch is done.
    pub fn start_writers_rendering(
        &self,
        collect_stats: bool,
        block: bool,
        requests: Vec<RenderRequest>,
    ) -> Result<RenderLaunch> {
        let requests = if requests.is_empty() {
            self.writers_work_for_cl(&[])?
        } else {
            requests
        };
        let options = self.render_options(requests.len(), collect_stats, false);
        self.launch(requests, options, block)
    }

    fn launch(
        &self,
        requests: Vec<RenderRequest>,
        options: DispatchOptions,
        block: bool,
    ) -> Result<RenderLaunch> {
        let mut targets: Vec<RenderTarget> =
            requests.into_iter().map(RenderTarget::Named).collect();
        if block && targets.len() == 1 {
            if let Some(target) = targets.pop() {
                let report = self.dispatcher.render_blocking_report(target, options)?;
                return Ok(RenderLaunch::Finished(report));
            }
        }
        let handle = self.dispatcher.start_batch(targets, options)?;
        if block {
            Ok(RenderLaunch::Finished(handle.wait()?))
        } else {
            Ok(RenderLaunch::Running(handle))
        }
    }

    /// Single writer, rendered to completion on the calling thread.
    pub fn render_writer_blocking(
        &self,
        request: RenderRequest,
        collect_stats: bool,
    ) -> Result<Option<RenderStats>> {
        self.dispatcher.render_blocking(
            RenderTarget::Named(request),
            DispatchOptions::default().with_stats(collect_stats),
        )
    }

    /// Cancels the running render, if any.
    pub fn abort_render(&self) {
        self.dispatcher.cancel_active();
    }

    /// Turns command-line writer values into render requests. Missing bounds
    /// come from the writer's `firstFrame`/`lastFrame`, then from the project
    /// range; a missing step follows the direction of the range.
    pub fn writers_work_for_cl(&self, writers: &[WriterArg]) -> Result<Vec<RenderRequest>> {
        let project_range = self.frame_range()?;
        if writers.is_empty() {
            return Ok(self
                .nodes
                .writers()
                .iter()
                .map(|node| writer_request(node, &node.script_name(), None, project_range))
                .collect());
        }

        writers
            .iter()
            .map(|arg| {
                let node = self
                    .get_node_by_fully_specified_name(&arg.name)
                    .filter(|node| node.is_writer())
                    .ok_or_else(|| EngineError::UnknownWriter(arg.name.clone()))?;
                Ok(writer_request(&node, &arg.name, Some(arg), project_range))
            })
            .collect()
    }

    /// Loads the project named on the command line and renders its writers.
    pub fn load_from_command_line(&mut self, args: &CommandLineArgs) -> Result<RenderLaunch> {
        self.load_project(&args.project)?;
        if let Some(dir) = &args.output_dir {
            self.dispatcher.set_output_dir(dir.clone());
        }
        let requests = self.writers_work_for_cl(&args.writers)?;
        if requests.is_empty() {
            warn!("{} has no writers to render", args.project.display());
            return Ok(RenderLaunch::Finished(BatchReport::default()));
        }
        let options =
            self.render_options(requests.len(), args.collect_stats, args.separate_process);
        self.launch(requests, options, args.block)
    }
}

impl Drop for AppInstance {
    fn drop(&mut self) {
        if !self.closed {
            self.dispatcher.cancel_active();
            self.registry.unregister(self.app_id);
        }
    }
}

fn app_id_string(app_id: u32) -> String {
    format!("app{}", app_id)
}

fn writer_request(
    node: &Node,
    name: &str,
    arg: Option<&WriterArg>,
    (project_first, project_last): (i32, i32),
) -> RenderRequest {
    let params = node.params();
    let param_frame = |param: &str| {
        let value = params.get_i64(param)?;
        match i32::try_from(value) {
            Ok(frame) => Some(frame),
            Err(_) => {
                warn!("{}: {} {} is out of range, using the project range", name, param, value);
                None
            }
        }
    };
    let first = arg
        .and_then(|a| a.first_frame)
        .or_else(|| param_frame(FIRST_FRAME_PARAM))
        .unwrap_or(project_first);
    let last = arg
        .and_then(|a| a.last_frame)
        .or_else(|| param_frame(LAST_FRAME_PARAM))
        .unwrap_or(project_last);
    let step = arg
        .and_then(|a| a.frame_step)
        .unwrap_or(if first > last { -1 } else { 1 });
    RenderRequest::new(name, first, last, step)
}

/// Serializes the live project for external render processes.
fn project_exporter(
    project: &Arc<RwLock<Project>>,
    timeline: &Arc<RwLock<Timeline>>,
    nodes: &NodeCollection,
) -> ProjectExporter {
    let project = Arc::clone(project);
    let timeline = Arc::clone(timeline);
    let nodes = nodes.clone();
    Arc::new(move || -> Result<String> {
        let project = project.read().map_err(|e| {
            EngineError::runtime(format!("Failed to acquire project read lock: {}", e))
        })?;
        let timeline = timeline.read().map_err(|e| {
            EngineError::runtime(format!("Failed to acquire timeline read lock: {}", e))
        })?;
        Ok(ProjectDocument::capture(&project, &timeline, &nodes).save()?)
    })
}
