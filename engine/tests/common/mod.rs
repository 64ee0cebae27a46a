//! Shared fixtures for the integration tests: small plugins, a recording host
//! and a scripted-group runner.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use engine::host::{HostCallbacks, NodeGuiRequest};
use engine::node::{Node, ParamDefinition, ParamValue};
use engine::plugin::{FrameContext, NodePlugin, PluginDescriptor, PluginManager};
use engine::render::BatchReport;
use engine::script::{
    CREATE_INSTANCE_ENTRY_POINT, GroupMetadata, ScriptError, ScriptHost, ScriptRunner,
};
use engine::{AppInstance, AppServices, EngineSettings, SessionRegistry, SessionState};

pub const SOURCE_ID: &str = "test.Source";
pub const FILTER_ID: &str = "test.Filter";
pub const WRITER_ID: &str = "test.Writer";
pub const GATED_WRITER_ID: &str = "test.GatedWriter";
pub const SCRIPTED_GROUP_ID: &str = "test.ScriptedGroup";

/// Writers fail on the frame stored in this parameter.
pub const FAIL_AT_PARAM: &str = "failAt";

/// Blocks render threads until the test opens it.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
    entered: Mutex<bool>,
    entered_cv: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    fn pass(&self) {
        {
            *self.entered.lock().unwrap() = true;
            self.entered_cv.notify_all();
        }
        let open = self.open.lock().unwrap();
        let _ = self
            .opened
            .wait_timeout_while(open, Duration::from_secs(10), |open| !*open)
            .unwrap();
    }

    /// Waits until a render thread reached the gate.
    pub fn wait_entered(&self) {
        let entered = self.entered.lock().unwrap();
        let (entered, _) = self
            .entered_cv
            .wait_timeout_while(entered, Duration::from_secs(10), |entered| !*entered)
            .unwrap();
        assert!(*entered, "render never reached the gate");
    }
}

pub struct TestPlugin {
    descriptor: Arc<PluginDescriptor>,
    inputs: usize,
    params: Vec<ParamDefinition>,
    gate: Option<Arc<Gate>>,
    rendered: Mutex<Vec<(String, i32)>>,
    threads: Mutex<Vec<ThreadId>>,
}

impl TestPlugin {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            inputs: 1,
            params: Vec::new(),
            gate: None,
            rendered: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_inputs(mut self, inputs: usize) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.params.push(ParamDefinition::new(name, value));
        self
    }

    pub fn with_gate(mut self, gate: &Arc<Gate>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }

    pub fn rendered_frames(&self, writer: &str) -> Vec<i32> {
        self.rendered
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == writer)
            .map(|(_, frame)| *frame)
            .collect()
    }

    /// Thread of every successfully rendered frame, in render order.
    pub fn render_threads(&self) -> Vec<ThreadId> {
        self.threads.lock().unwrap().clone()
    }

    pub fn render_count(&self) -> usize {
        self.rendered.lock().unwrap().len()
    }
}

impl NodePlugin for TestPlugin {
    fn descriptor(&self) -> &Arc<PluginDescriptor> {
        &self.descriptor
    }

    fn parameters(&self) -> Vec<ParamDefinition> {
        self.params.clone()
    }

    fn input_count(&self) -> usize {
        self.inputs
    }

    fn render_frame(&self, ctx: &FrameContext<'_>) -> Result<(), String> {
        if !self.descriptor.is_writer {
            return Err("not a writer".to_string());
        }
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if ctx.params.get_i64(FAIL_AT_PARAM) == Some(ctx.frame as i64) {
            return Err("simulated write error".to_string());
        }
        self.rendered
            .lock()
            .unwrap()
            .push((ctx.node_name.to_string(), ctx.frame));
        self.threads.lock().unwrap().push(thread::current().id());
        Ok(())
    }
}

pub fn writer_plugin(id: &str) -> TestPlugin {
    TestPlugin::new(PluginDescriptor::new(id, "Writer", 1, 0).writer())
        .with_param(FAIL_AT_PARAM, i64::MIN)
}

/// Source, filter and writer plugins plus the built-in set. Returns the
/// manager and the writer so tests can inspect what was rendered.
pub fn standard_plugins() -> (Arc<PluginManager>, Arc<TestPlugin>) {
    let manager = Arc::new(PluginManager::new());
    engine::builtin::register_builtin_plugins(&manager);

    manager.register(Arc::new(
        TestPlugin::new(PluginDescriptor::new(SOURCE_ID, "Source", 1, 0)).with_inputs(0),
    ));
    manager.register(Arc::new(
        TestPlugin::new(PluginDescriptor::new(FILTER_ID, "Filter", 1, 0))
            .with_param("size", 1)
            .with_param("mode", "linear"),
    ));
    let writer = Arc::new(writer_plugin(WRITER_ID));
    manager.register(writer.clone());
    (manager, writer)
}

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        render_workers: Some(2),
        ..EngineSettings::default()
    }
}

/// Helper: routes engine logs into the captured test output (`RUST_LOG` picks the level).
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn open_app(services: AppServices) -> (Arc<SessionRegistry>, AppInstance) {
    init_logging();
    let registry = SessionRegistry::new();
    let app = registry.new_instance(services).unwrap();
    (registry, app)
}

pub fn headless_app(plugins: Arc<PluginManager>) -> (Arc<SessionRegistry>, AppInstance) {
    open_app(AppServices::headless(plugins, test_settings()))
}

pub fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("engine-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Host that records what the engine told it.
#[derive(Default)]
pub struct RecordingHost {
    /// (script name, was_loaded, user_edited)
    pub created: Mutex<Vec<(String, bool, bool)>>,
    pub gui_requests: Mutex<Vec<(String, NodeGuiRequest)>>,
    pub reports: Mutex<Vec<BatchReport>>,
    /// (title, message) of every error and warning dialog.
    pub dialogs: Mutex<Vec<(String, String)>>,
    /// (task, progress) of every progress update.
    pub progress: Mutex<Vec<(String, f64)>>,
    /// Progress updates answered before the host asks to abort.
    pub abort_after: Option<usize>,
}

impl RecordingHost {
    pub fn aborting_after(updates: usize) -> Self {
        Self {
            abort_after: Some(updates),
            ..Self::default()
        }
    }

    pub fn dialog_titles(&self) -> Vec<String> {
        self.dialogs
            .lock()
            .unwrap()
            .iter()
            .map(|(title, _)| title.clone())
            .collect()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _, _)| name.clone())
            .collect()
    }
}

impl HostCallbacks for RecordingHost {
    fn error_dialog(&self, title: &str, message: &str) {
        self.dialogs
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }

    fn warning_dialog(&self, title: &str, message: &str) {
        self.dialogs
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }

    fn progress_start(&self, _task: &str, _message: &str) {}

    fn progress_update(&self, task: &str, progress: f64) -> bool {
        let mut updates = self.progress.lock().unwrap();
        updates.push((task.to_string(), progress));
        self.abort_after.is_none_or(|limit| updates.len() <= limit)
    }

    fn progress_end(&self, _task: &str) {}

    fn create_node_gui(&self, node: &Arc<Node>, request: &NodeGuiRequest) {
        self.gui_requests
            .lock()
            .unwrap()
            .push((node.script_name(), *request));
    }

    fn on_node_created(&self, node: &Arc<Node>, was_loaded: bool, user_edited: bool) {
        self.created
            .lock()
            .unwrap()
            .push((node.script_name(), was_loaded, user_edited));
    }

    fn render_process_started(&self, _writer: &str, _first: i32, _last: i32, _step: i32) {}

    fn render_finished(&self, report: &BatchReport) {
        self.reports.lock().unwrap().push(report.clone());
    }

    fn project_load_status(&self, _message: &str) {}
    fn redraw_viewers(&self) {}
}

/// Script runner whose group script builds `Inner1 -> Inner2` from filters.
#[derive(Default)]
pub struct GroupScriptRunner {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    pub failing: HashSet<String>,
    /// Set by the test once the instance exists.
    pub flags: Mutex<Option<Arc<SessionState>>>,
    pub saw_scripted_flag: AtomicBool,
}

impl GroupScriptRunner {
    pub fn failing(entry_points: &[&str]) -> Self {
        Self {
            failing: entry_points.iter().map(|e| e.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls_to(&self, entry_point: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == entry_point)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

impl ScriptRunner for GroupScriptRunner {
    fn group_metadata(&self, _script: &Path) -> Result<GroupMetadata, ScriptError> {
        Ok(GroupMetadata {
            id: SCRIPTED_GROUP_ID.to_string(),
            label: "Blur Stack".to_string(),
            version: 2,
            grouping: "Filter".to_string(),
        })
    }

    fn call(
        &self,
        entry_point: &str,
        args: &[String],
        host: Option<&mut dyn ScriptHost>,
    ) -> Result<(), ScriptError> {
        self.calls
            .lock()
            .unwrap()
            .push((entry_point.to_string(), args.to_vec()));

        if let Some(flags) = self.flags.lock().unwrap().as_ref() {
            if flags.is_creating_scripted_group() {
                self.saw_scripted_flag.store(true, Ordering::SeqCst);
            }
        }

        if self.failing.contains(entry_point) {
            return Err(ScriptError::Raised {
                entry_point: entry_point.to_string(),
                message: "NameError: undefined".to_string(),
            });
        }

        if entry_point == CREATE_INSTANCE_ENTRY_POINT {
            let host = host.ok_or_else(|| ScriptError::Unavailable(entry_point.to_string()))?;
            let raise = |message: String| ScriptError::Raised {
                entry_point: entry_point.to_string(),
                message,
            };
            let first = host.create_node(FILTER_ID, Some("Inner1")).map_err(raise)?;
            let second = host.create_node(FILTER_ID, Some("Inner2")).map_err(raise)?;
            host.connect(&first, &second, 0).map_err(raise)?;
            host.set_param(&second, "size", ParamValue::Integer(3))
                .map_err(raise)?;
        }
        Ok(())
    }
}
