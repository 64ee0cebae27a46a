//! Writer producing one small text file per frame.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use log::trace;

use crate::builtin::WRITE_FRAMES_ID;
use crate::node::ParamDefinition;
use crate::node::params::FILENAME_PARAM;
use crate::plugin::{FrameContext, NodePlugin, PluginDescriptor};

pub const DEFAULT_FILENAME: &str = "frames/{writer}_{frame:04}.txt";

pub struct WriteFramesPlugin {
    descriptor: Arc<PluginDescriptor>,
}

impl WriteFramesPlugin {
    pub fn new() -> Self {
        Self {
            descriptor: Arc::new(
                PluginDescriptor::new(WRITE_FRAMES_ID, "Write Frames", 1, 0)
                    .with_grouping("Image/Writers")
                    .writer(),
            ),
        }
    }

    fn output_path(&self, ctx: &FrameContext<'_>) -> PathBuf {
        let template = ctx
            .params
            .get_string(FILENAME_PARAM)
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let path = PathBuf::from(format_frame_tokens(&template, ctx.node_name, ctx.frame));
        if path.is_relative() {
            ctx.output_dir.join(path)
        } else {
            path
        }
    }
}

impl Default for WriteFramesPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl NodePlugin for WriteFramesPlugin {
    fn descriptor(&self) -> &Arc<PluginDescriptor> {
        &self.descriptor
    }

    fn parameters(&self) -> Vec<ParamDefinition> {
        vec![ParamDefinition::new(FILENAME_PARAM, DEFAULT_FILENAME)]
    }

    fn render_frame(&self, ctx: &FrameContext<'_>) -> Result<(), String> {
        let path = self.output_path(ctx);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
        }

        let mut contents = format!("frame {}\nwriter {}\n", ctx.frame, ctx.node_name);
        if !ctx.upstream.is_empty() {
            contents.push_str(&format!("upstream {}\n", ctx.upstream.join(" <- ")));
        }
        fs::write(&path, contents).map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
        trace!("{}: wrote {}", ctx.node_name, path.display());
        Ok(())
    }
}

/// Expands `{writer}`, `{frame}` and zero-padded `{frame:N}` tokens. Unknown
/// tokens and unmatched braces are kept as they are.
pub fn format_frame_tokens(template: &str, writer: &str, frame: i32) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            result.push_str(&rest[open..]);
            return result;
        };

        let token = &after[..close];
        match token {
            "frame" => result.push_str(&frame.to_string()),
            "writer" => result.push_str(writer),
            _ => match token
                .strip_prefix("frame:")
                .and_then(|width| width.parse::<usize>().ok())
            {
                Some(width) if frame < 0 => {
                    result.push_str(&format!("-{:0width$}", frame.unsigned_abs(), width = width))
                }
                Some(width) => result.push_str(&format!("{:0width$}", frame, width = width)),
                None => {
                    result.push('{');
                    result.push_str(token);
                    result.push('}');
                }
            },
        }
        rest = &after[close + 1..];
    }
    result.push_str(rest);
    result
}
