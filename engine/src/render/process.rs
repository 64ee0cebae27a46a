//! External render processes.
//!
//! The parent writes the project to a temporary file and runs the renderer
//! executable on it, one writer per process:
//!
//! ```text
//! renderer <project.json> --writer <name>:<first>:<last>:<step> --output-dir <dir> [--stats]
//! ```
//!
//! The project file lives in the temp directory, so the parent's output
//! directory is passed along for relative writer outputs.
//!
//! The child reports through its exit code and two stderr markers:
//! `FAILED writer=<w> frame=<n|-> <message>` and
//! `STATS writer=<w> frames=<n> elapsed_ms=<ms> peak_memory=<bytes|->`.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use sysinfo::{Pid, ProcessesToUpdate, System};
use uuid::Uuid;

use crate::host::HostCallbacks;
use crate::render::dispatcher::CancelToken;
use crate::render::error::RenderError;
use crate::render::stats::{MemorySampler, RenderStats};
use crate::render::work::RenderWork;

pub const FAILED_MARKER: &str = "FAILED";
pub const STATS_MARKER: &str = "STATS";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// `name:first:last:step`, the `--writer` argument understood by the renderer.
pub fn writer_arg(work: &RenderWork) -> String {
    format!(
        "{}:{}:{}:{}",
        work.writer_name, work.first_frame, work.last_frame, work.frame_step
    )
}

pub fn format_failure_marker(writer: &str, frame: Option<i32>, message: &str) -> String {
    let frame = frame.map_or_else(|| "-".to_string(), |f| f.to_string());
    format!("{} writer={} frame={} {}", FAILED_MARKER, writer, frame, message)
}

/// Returns (writer, frame, message).
pub fn parse_failure_marker(line: &str) -> Option<(String, Option<i32>, String)> {
    let rest = line.trim().strip_prefix(FAILED_MARKER)?.trim_start();
    let (writer_field, rest) = rest.split_once(' ')?;
    let writer = writer_field.strip_prefix("writer=")?;
    let (frame_field, message) = rest.split_once(' ').unwrap_or((rest, ""));
    let frame = frame_field.strip_prefix("frame=")?;
    let frame = if frame == "-" {
        None
    } else {
        Some(frame.parse().ok()?)
    };
    Some((writer.to_string(), frame, message.trim().to_string()))
}

pub fn format_stats_marker(writer: &str, stats: &RenderStats) -> String {
    let peak = stats
        .peak_memory_bytes
        .map_or_else(|| "-".to_string(), |b| b.to_string());
    format!(
        "{} writer={} frames={} elapsed_ms={} peak_memory={}",
        STATS_MARKER,
        writer,
        stats.frames_rendered,
        stats.elapsed.as_millis(),
        peak
    )
}

pub fn parse_stats_marker(line: &str) -> Option<RenderStats> {
    let rest = line.trim().strip_prefix(STATS_MARKER)?;
    let mut stats = RenderStats::default();
    for field in rest.split_whitespace() {
        let (key, value) = field.split_once('=')?;
        match key {
            "frames" => stats.frames_rendered = value.parse().ok()?,
            "elapsed_ms" => stats.elapsed = Duration::from_millis(value.parse().ok()?),
            "peak_memory" if value != "-" => stats.peak_memory_bytes = Some(value.parse().ok()?),
            _ => {}
        }
    }
    Some(stats)
}

/// Project file living for the duration of one external render.
pub struct TempProjectFile {
    path: PathBuf,
}

impl TempProjectFile {
    pub fn create(contents: &str) -> std::io::Result<Self> {
        let path = std::env::temp_dir().join(format!("engine-render-{}.json", Uuid::new_v4()));
        let mut file = std::fs::File::create(&path)?;
        file.write_all(contents.as_bytes())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempProjectFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    executable: PathBuf,
}

impl ProcessLauncher {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Renders `work` in a child process and waits for it, polling the cancel
    /// token. A cancelled child is killed and reaped before returning.
    pub fn run(
        &self,
        project_json: &str,
        work: &RenderWork,
        output_dir: &Path,
        collect_stats: bool,
        cancel: &CancelToken,
        host: &dyn HostCallbacks,
    ) -> Result<Option<RenderStats>, RenderError> {
        let writer = work.writer_name.as_str();
        let project = TempProjectFile::create(project_json).map_err(|e| {
            RenderError::failed(writer, None, format!("cannot write project file: {}", e))
        })?;

        let mut command = Command::new(&self.executable);
        command
            .arg(project.path())
            .arg("--writer")
            .arg(writer_arg(work))
            .arg("--output-dir")
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if collect_stats {
            command.arg("--stats");
        }

        let mut child = command.spawn().map_err(|e| {
            RenderError::failed(
                writer,
                None,
                format!("cannot launch {}: {}", self.executable.display(), e),
            )
        })?;
        debug!(
            "Render process {} started for {} ({})",
            child.id(),
            writer,
            writer_arg(work)
        );
        host.render_process_started(writer, work.first_frame, work.last_frame, work.frame_step);

        let stderr = spawn_stderr_reader(&mut child, writer);
        let mut sampler = collect_stats.then(|| MemorySampler::child(child.id()));
        let started = Instant::now();

        let status = loop {
            if cancel.is_cancelled() {
                terminate(&mut child);
                // Not joined: a surviving holder of the pipe would block the report.
                drop(stderr);
                return Err(RenderError::Cancelled {
                    writer: writer.to_string(),
                });
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(sampler) = sampler.as_mut() {
                        sampler.sample();
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    terminate(&mut child);
                    drop(stderr);
                    return Err(RenderError::failed(writer, None, e.to_string()));
                }
            }
        };

        let lines = stderr.join().unwrap_or_default();
        drop(project);
        interpret_exit(writer, status, &lines, collect_stats).map(|stats| {
            stats.map(|mut stats| {
                if stats.elapsed.is_zero() {
                    stats.elapsed = started.elapsed();
                }
                if stats.peak_memory_bytes.is_none() {
                    stats.peak_memory_bytes = sampler.as_ref().and_then(MemorySampler::peak);
                }
                stats
            })
        })
    }
}

fn spawn_stderr_reader(child: &mut Child, writer: &str) -> JoinHandle<Vec<String>> {
    let stderr = child.stderr.take();
    let writer = writer.to_string();
    thread::spawn(move || {
        let Some(stderr) = stderr else {
            return Vec::new();
        };
        BufReader::new(stderr)
            .lines()
            .map_while(Result::ok)
            .inspect(|line| debug!("[render {}] {}", writer, line))
            .collect()
    })
}

/// Kills the child and everything it started, then reaps the child.
fn terminate(child: &mut Child) {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    // Collected first: once the child dies its descendants are re-parented.
    let descendants = descendants_of(&system, Pid::from_u32(child.id()));

    if let Err(e) = child.kill() {
        debug!("Render process {} already gone: {}", child.id(), e);
    }
    for pid in &descendants {
        if let Some(process) = system.process(*pid) {
            if !process.kill() {
                debug!("Could not kill process {} of render {}", pid, child.id());
            }
        }
    }
    if let Err(e) = child.wait() {
        warn!("Could not reap render process {}: {}", child.id(), e);
    }
}

/// Every process below `root`, breadth first. Threads listed as tasks are skipped.
fn descendants_of(system: &System, root: Pid) -> Vec<Pid> {
    let mut found = vec![root];
    let mut index = 0;
    while index < found.len() {
        let parent = found[index];
        found.extend(
            system
                .processes()
                .iter()
                .filter(|(pid, process)| {
                    process.thread_kind().is_none()
                        && process.parent() == Some(parent)
                        && **pid != parent
                })
                .map(|(pid, _)| *pid),
        );
        index += 1;
    }
    found.remove(0);
    found
}

fn interpret_exit(
    writer: &str,
    status: ExitStatus,
    lines: &[String],
    collect_stats: bool,
) -> Result<Option<RenderStats>, RenderError> {
    if status.success() {
        if !collect_stats {
            return Ok(None);
        }
        let reported = lines.iter().rev().find_map(|l| parse_stats_marker(l));
        return Ok(Some(reported.unwrap_or_default()));
    }

    if let Some((_, frame, message)) = lines.iter().rev().find_map(|l| parse_failure_marker(l)) {
        return Err(RenderError::failed(writer, frame, message));
    }
    let message = lines
        .iter()
        .rev()
        .find(|l| !l.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| format!("render process exited with {}", status));
    Err(RenderError::failed(writer, None, message))
}
