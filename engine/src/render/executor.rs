//! In-process execution of one render item.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};

use crate::host::HostCallbacks;
use crate::node::{Node, NodeCollection};
use crate::plugin::FrameContext;
use crate::render::dispatcher::CancelToken;
use crate::render::error::RenderError;
use crate::render::stats::{MemorySampler, RenderStats};
use crate::render::work::RenderWork;
use crate::util::timing::ScopedTimer;

const MAX_UPSTREAM_DEPTH: usize = 64;

/// Renders every frame of `work` on the calling thread. The cancel token is
/// checked before each frame; frames already written stay on disk.
///
/// Progress is reported to the host under the writer's name. A host that
/// answers an update with false cancels the whole batch.
pub fn render_in_process(
    work: &RenderWork,
    graph: &NodeCollection,
    output_dir: &Path,
    cancel: &CancelToken,
    collect_stats: bool,
    host: &dyn HostCallbacks,
) -> Result<Option<RenderStats>, RenderError> {
    host.progress_start(
        &work.writer_name,
        &format!(
            "Rendering frames {} to {}",
            work.first_frame, work.last_frame
        ),
    );
    let result = render_frames(work, graph, output_dir, cancel, collect_stats, host);
    host.progress_end(&work.writer_name);
    result
}

fn render_frames(
    work: &RenderWork,
    graph: &NodeCollection,
    output_dir: &Path,
    cancel: &CancelToken,
    collect_stats: bool,
    host: &dyn HostCallbacks,
) -> Result<Option<RenderStats>, RenderError> {
    let writer = work.writer().ok_or_else(|| {
        RenderError::failed(&work.writer_name, None, "writer was removed from the graph")
    })?;
    let _timer = ScopedTimer::debug_lazy(|| format!("Render {}", work.writer_name));

    let params = writer.params();
    let upstream = upstream_labels(graph, &writer);
    let mut stats = RenderStats::default();
    let mut sampler = if collect_stats {
        MemorySampler::current_process()
    } else {
        None
    };
    let started = Instant::now();
    let total = work.frame_count().max(1) as f64;

    for (done, frame) in work.frames().enumerate() {
        if cancel.is_cancelled() {
            debug!("{}: cancelled before frame {}", work.writer_name, frame);
            return Err(RenderError::Cancelled {
                writer: work.writer_name.clone(),
            });
        }

        let frame_started = Instant::now();
        let ctx = FrameContext {
            node_name: &work.writer_name,
            params: &params,
            frame,
            upstream: &upstream,
            output_dir,
        };
        writer.plugin().render_frame(&ctx).map_err(|message| {
            error!("{}: frame {} failed: {}", work.writer_name, frame, message);
            RenderError::failed(&work.writer_name, Some(frame), message)
        })?;

        stats.record_frame(frame, frame_started.elapsed());
        if let Some(sampler) = sampler.as_mut() {
            sampler.sample();
        }
        if !host.progress_update(&work.writer_name, (done + 1) as f64 / total) {
            info!("{}: aborted by host after frame {}", work.writer_name, frame);
            cancel.cancel();
            return Err(RenderError::Cancelled {
                writer: work.writer_name.clone(),
            });
        }
    }

    if !collect_stats {
        return Ok(None);
    }
    stats.elapsed = started.elapsed();
    stats.peak_memory_bytes = sampler.and_then(|s| s.peak());
    Ok(Some(stats))
}

/// Labels along the chain feeding input 0 of `node`, nearest first.
pub fn upstream_labels(graph: &NodeCollection, node: &Arc<Node>) -> Vec<String> {
    let mut labels = Vec::new();
    let mut current = node.input(0);
    while let Some(id) = current {
        if labels.len() >= MAX_UPSTREAM_DEPTH {
            break;
        }
        let Some(upstream) = graph.get(id) else { break };
        labels.push(upstream.label());
        current = upstream.input(0);
    }
    labels
}
