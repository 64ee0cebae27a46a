//! Application instance lifecycle: project load/save, reset and close,
//! project callbacks and command-line rendering.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{
    FILTER_ID, GroupScriptRunner, RecordingHost, SOURCE_ID, WRITER_ID, headless_app, open_app,
    standard_plugins, temp_dir, test_settings, write_file,
};
use engine::node::params::{FIRST_FRAME_PARAM, LAST_FRAME_PARAM};
use engine::{
    AppInstance, AppServices, CloseOutcome, CommandLineArgs, CreationRequest, EngineError,
    RenderRequest, SessionRegistry, WriterArg,
};

/// Helper: Source -> Filter -> Writer, with a non-default filter size.
fn build_chain(app: &AppInstance) {
    app.create_node(CreationRequest::new(SOURCE_ID).with_name("Read1"))
        .unwrap();
    app.create_node(CreationRequest::new(FILTER_ID).with_default("size", 9))
        .unwrap();
    app.create_node(CreationRequest::new(WRITER_ID).with_name("Write1"))
        .unwrap();
}

/// Helper: script names of the top-level graph, in order.
fn node_names(app: &AppInstance) -> Vec<String> {
    app.nodes()
        .nodes()
        .iter()
        .map(|node| node.script_name())
        .collect()
}

/// Helper: instance with a script runner that fails the given entry points.
fn scripted_app(
    runner: &Arc<GroupScriptRunner>,
    settings: engine::EngineSettings,
) -> (Arc<SessionRegistry>, AppInstance) {
    let (plugins, _) = standard_plugins();
    open_app(AppServices::headless(plugins, settings).with_scripts(runner.clone()))
}

#[test]
fn test_save_then_load_restores_graph_and_range() {
    let (plugins, _) = standard_plugins();
    let (_registry, app) = headless_app(plugins.clone());
    build_chain(&app);
    app.set_frame_range(5, 20).unwrap();
    app.seek(12).unwrap();

    let dir = temp_dir();
    let path = dir.join("shot_010.json");
    app.save_as(&path).unwrap();
    {
        let project = app.project();
        let project = project.read().unwrap();
        assert_eq!(project.name, "shot_010");
        assert_eq!(project.path.as_deref(), Some(path.as_path()));
        assert!(!project.dirty);
    }

    let (_other_registry, mut loaded) = headless_app(plugins);
    loaded.load_project(&path).unwrap();

    assert_eq!(node_names(&loaded), vec!["Read1", "Filter1", "Write1"]);
    let read = loaded.get_node_by_fully_specified_name("Read1").unwrap();
    let filter = loaded.get_node_by_fully_specified_name("Filter1").unwrap();
    let writer = loaded.get_node_by_fully_specified_name("Write1").unwrap();
    assert_eq!(filter.input(0), Some(read.id()));
    assert_eq!(writer.input(0), Some(filter.id()));
    assert_eq!(filter.params().get_i64("size"), Some(9));

    assert_eq!(loaded.frame_range().unwrap(), (5, 20));
    assert_eq!(loaded.timeline().read().unwrap().current_frame(), 12);
    assert!(!loaded.flags().was_created_with_legacy_ids());
    assert_eq!(loaded.dispatcher().output_dir(), dir.as_path());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_failed_load_keeps_current_project() {
    let (plugins, _) = standard_plugins();
    let (_registry, mut app) = headless_app(plugins);
    build_chain(&app);
    app.set_frame_range(1, 48).unwrap();

    let dir = temp_dir();
    let path = write_file(
        &dir,
        "broken.json",
        r#"{
            "format_version": 1,
            "first_frame": 1,
            "last_frame": 10,
            "nodes": [
                {"plugin_id": "test.Filter", "plugin_major": 1, "plugin_minor": 0, "script_name": "Blur1"},
                {"plugin_id": "test.Missing", "plugin_major": 1, "plugin_minor": 0, "script_name": "Gone1"}
            ]
        }"#,
    );

    let err = app.load_project(&path).unwrap_err();
    assert!(matches!(err, EngineError::ProjectLoad { .. }));
    assert!(err.to_string().contains("test.Missing"));

    assert_eq!(node_names(&app), vec!["Read1", "Filter1", "Write1"]);
    assert_eq!(app.frame_range().unwrap(), (1, 48));
    assert!(app.project().read().unwrap().path.is_none());
    assert!(!app.flags().was_created_with_legacy_ids());
    assert!(!app.flags().is_bulk_mutation_in_flight());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_unreadable_project_is_load_error() {
    let (plugins, _) = standard_plugins();
    let (_registry, mut app) = headless_app(plugins);
    let dir = temp_dir();

    let garbage = write_file(&dir, "garbage.json", "{ not json");
    assert!(matches!(
        app.load_project(&garbage),
        Err(EngineError::ProjectLoad { .. })
    ));
    assert!(matches!(
        app.load_project(&dir.join("missing.json")),
        Err(EngineError::ProjectLoad { .. })
    ));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_unversioned_project_uses_legacy_ids() {
    let (plugins, _) = standard_plugins();
    let (_registry, mut app) = headless_app(plugins);
    let dir = temp_dir();
    let path = write_file(
        &dir,
        "old_show.json",
        r#"{
            "last_frame": 10,
            "frame_rate": 25.0,
            "nodes": [
                {"plugin_id": "test.source", "plugin_major": 1, "plugin_minor": 0, "script_name": "Read1"},
                {"plugin_id": "test.filter", "plugin_major": 1, "plugin_minor": 0, "script_name": "Blur1", "inputs": ["Read1"]}
            ]
        }"#,
    );

    app.load_project(&path).unwrap();

    assert!(app.flags().was_created_with_legacy_ids());
    assert!(app.project().read().unwrap().created_with_legacy_ids);
    assert_eq!(app.project().read().unwrap().name, "old_show");
    assert_eq!(app.project_frame_rate().unwrap(), 25.0);
    let blur = app.get_node_by_fully_specified_name("Blur1").unwrap();
    assert_eq!(blur.plugin_id(), FILTER_ID);
    let read = app.get_node_by_fully_specified_name("Read1").unwrap();
    assert_eq!(blur.input(0), Some(read.id()));

    // Lower-case ids keep resolving for nodes created after the load.
    app.create_node(CreationRequest::new("test.filter")).unwrap();

    app.reset_project().unwrap();
    assert!(!app.flags().was_created_with_legacy_ids());
    assert!(matches!(
        app.create_node(CreationRequest::new("test.filter")),
        Err(EngineError::PluginNotFound { .. })
    ));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_post_load_callback_failure_is_not_fatal() {
    let runner = Arc::new(GroupScriptRunner::failing(&["onLoaded"]));
    let (_registry, mut app) = scripted_app(&runner, test_settings());
    let dir = temp_dir();
    let path = write_file(
        &dir,
        "with_callback.json",
        r#"{"format_version": 1, "on_project_loaded": "onLoaded", "nodes": []}"#,
    );

    app.load_project(&path).unwrap();

    assert_eq!(runner.calls_to("onLoaded"), vec![vec![app.app_id_string()]]);
    assert_eq!(
        app.project().read().unwrap().on_project_loaded.as_deref(),
        Some("onLoaded")
    );

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_load_problems_reach_the_host_as_dialogs() {
    let runner = Arc::new(GroupScriptRunner::failing(&["onLoaded"]));
    let host = Arc::new(RecordingHost::default());
    let (plugins, _) = standard_plugins();
    let (_registry, mut app) = open_app(
        AppServices::headless(plugins, test_settings())
            .with_host(host.clone())
            .with_scripts(runner.clone()),
    );
    let dir = temp_dir();

    app.load_project(&dir.join("missing.json")).unwrap_err();
    assert_eq!(host.dialog_titles(), vec!["Project load failed"]);

    let path = write_file(
        &dir,
        "with_callback.json",
        r#"{"format_version": 1, "on_project_loaded": "onLoaded", "nodes": []}"#,
    );
    app.load_project(&path).unwrap();
    assert_eq!(
        host.dialog_titles(),
        vec!["Project load failed", "post-load callback failed"]
    );

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_project_created_callback_runs_for_new_instances() {
    let runner = Arc::new(GroupScriptRunner::failing(&["onCreated"]));
    let mut settings = test_settings();
    settings.on_project_created = Some("onCreated".to_string());

    let (_registry, app) = scripted_app(&runner, settings);

    assert!(!app.is_closed());
    assert_eq!(runner.calls_to("onCreated"), vec![vec!["app0".to_string()]]);
}

#[test]
fn test_reset_clears_project_but_keeps_instance() {
    let (plugins, _) = standard_plugins();
    let (registry, mut app) = headless_app(plugins);
    build_chain(&app);
    app.set_frame_range(10, 20).unwrap();

    app.reset_project().unwrap();

    assert!(app.nodes().is_empty());
    assert!(app.nodes().selection().is_empty());
    assert_eq!(app.frame_range().unwrap(), (1, 100));
    assert_eq!(app.project().read().unwrap().name, "Untitled");
    assert!(!app.project().read().unwrap().dirty);
    assert!(!app.is_closed());
    assert!(registry.is_open(app.app_id()));
}

#[test]
fn test_closing_last_instance_terminates_session() {
    let (plugins, _) = standard_plugins();
    let registry = SessionRegistry::new();
    let services = AppServices::headless(plugins, test_settings());
    let mut first = registry.new_instance(services.clone()).unwrap();
    let mut second = registry.new_instance(services.clone()).unwrap();
    assert_eq!((first.app_id(), second.app_id()), (0, 1));
    build_chain(&first);

    assert_eq!(first.close_project().unwrap(), CloseOutcome::InstanceClosed);
    assert!(first.is_closed());
    assert!(first.nodes().is_empty());
    assert!(!registry.is_terminated());
    assert_eq!(registry.open_instances(), vec![1]);

    // Closing twice changes nothing.
    assert_eq!(first.close_project().unwrap(), CloseOutcome::InstanceClosed);

    assert_eq!(
        second.about_to_quit().unwrap(),
        CloseOutcome::SessionTerminated
    );
    assert!(registry.is_terminated());
    assert!(registry.open_instances().is_empty());
    assert_eq!(first.close_project().unwrap(), CloseOutcome::SessionTerminated);

    assert!(registry.new_instance(services).is_err());
}

#[test]
fn test_dropping_instance_unregisters_it() {
    let (plugins, _) = standard_plugins();
    let registry = SessionRegistry::new();
    let services = AppServices::headless(plugins, test_settings());
    let first = registry.new_instance(services.clone()).unwrap();
    let second = registry.new_instance(services).unwrap();

    drop(first);

    assert_eq!(registry.open_instances(), vec![second.app_id()]);
    assert!(!registry.is_terminated());
}

#[test]
fn test_seek_is_clamped_to_range() {
    let (plugins, _) = standard_plugins();
    let (_registry, app) = headless_app(plugins);

    app.set_frame_range(10, 1).unwrap();
    assert_eq!(app.frame_range().unwrap(), (1, 10));
    assert_eq!(app.seek(50).unwrap(), 10);
    assert_eq!(app.seek(-3).unwrap(), 1);
}

#[test]
fn test_autosave_waits_for_node_creation() {
    let (plugins, _) = standard_plugins();
    let dir = temp_dir();
    let mut settings = test_settings();
    settings.autosave_dir = Some(dir.clone());
    let (_registry, app) = open_app(AppServices::headless(plugins, settings));
    build_chain(&app);

    {
        let _creating = app.flags().enter(engine::SessionFlag::CreatingNode);
        assert_eq!(app.trigger_autosave().unwrap(), None);
    }

    let path = app.trigger_autosave().unwrap().unwrap();
    assert_eq!(path, dir.join("Untitled.app0.autosave.json"));
    let document =
        engine::app::ProjectDocument::load(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(document.nodes.len(), 3);
    assert!(app.project().read().unwrap().path.is_none());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_command_line_writer_ranges() {
    let (plugins, _) = standard_plugins();
    let (_registry, app) = headless_app(plugins);
    app.set_frame_range(3, 6).unwrap();
    app.create_node(CreationRequest::new(WRITER_ID).with_name("Write1"))
        .unwrap();
    app.create_node(
        CreationRequest::new(WRITER_ID)
            .with_name("Write2")
            .with_default(FIRST_FRAME_PARAM, 20)
            .with_default(LAST_FRAME_PARAM, 10),
    )
    .unwrap();

    let all = app.writers_work_for_cl(&[]).unwrap();
    assert_eq!(
        all,
        vec![
            RenderRequest::new("Write1", 3, 6, 1),
            RenderRequest::new("Write2", 20, 10, -1),
        ]
    );

    let args: Vec<WriterArg> = vec!["Write1:8:6".parse().unwrap(), "Write2".parse().unwrap()];
    assert_eq!(
        app.writers_work_for_cl(&args).unwrap(),
        vec![
            RenderRequest::new("Write1", 8, 6, -1),
            RenderRequest::new("Write2", 20, 10, -1),
        ]
    );

    let unknown = vec![WriterArg::new("Write7")];
    assert!(matches!(
        app.writers_work_for_cl(&unknown),
        Err(EngineError::UnknownWriter(name)) if name == "Write7"
    ));
}

#[test]
fn test_out_of_range_frame_params_fall_back_to_project_range() {
    let (plugins, _) = standard_plugins();
    let (_registry, app) = headless_app(plugins);
    app.set_frame_range(3, 6).unwrap();
    app.create_node(
        CreationRequest::new(WRITER_ID)
            .with_name("Write1")
            .with_default(FIRST_FRAME_PARAM, 4)
            .with_default(LAST_FRAME_PARAM, 1i64 << 40),
    )
    .unwrap();
    app.create_node(
        CreationRequest::new(WRITER_ID)
            .with_name("Write2")
            .with_default(FIRST_FRAME_PARAM, -(1i64 << 33)),
    )
    .unwrap();

    assert_eq!(
        app.writers_work_for_cl(&[]).unwrap(),
        vec![
            RenderRequest::new("Write1", 4, 6, 1),
            RenderRequest::new("Write2", 3, 6, 1),
        ]
    );
}

#[test]
fn test_load_from_command_line_renders_project() {
    let (plugins, writer) = standard_plugins();
    let (_registry, mut app) = headless_app(plugins);
    app.set_frame_range(3, 6).unwrap();
    build_chain(&app);
    let dir = temp_dir();
    let path = dir.join("cl.json");
    app.save(&path).unwrap();
    app.reset_project().unwrap();

    let report = app
        .load_from_command_line(&CommandLineArgs::new(&path))
        .unwrap()
        .into_report()
        .unwrap();
    assert!(report.is_success());
    assert_eq!(writer.rendered_frames("Write1"), vec![3, 4, 5, 6]);

    let mut args = CommandLineArgs::new(&path);
    args.writers = vec![WriterArg::new("Write1").with_range(8, 6, -1)];
    args.collect_stats = true;
    let report = app
        .load_from_command_line(&args)
        .unwrap()
        .into_report()
        .unwrap();
    let stats = report.items[0].result.clone().unwrap().unwrap();
    assert_eq!(stats.frames_rendered, 3);
    assert_eq!(writer.rendered_frames("Write1"), vec![3, 4, 5, 6, 8, 7, 6]);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_command_line_without_project_file_fails() {
    let (plugins, _) = standard_plugins();
    let (_registry, mut app) = headless_app(plugins);

    let args = CommandLineArgs::new(Path::new("/nonexistent/p.json"));
    let result = app.load_from_command_line(&args);
    assert!(matches!(result, Err(EngineError::ProjectLoad { .. })));
}
