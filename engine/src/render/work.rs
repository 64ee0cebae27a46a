//! Render requests and resolved render work.

use std::sync::{Arc, Weak};

use crate::error::{EngineError, Result};
use crate::node::{Node, NodeCollection};

/// Symbolic request: writer by (fully specified) name plus a frame range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub writer_name: String,
    pub first_frame: i32,
    pub last_frame: i32,
    pub frame_step: i32,
}

impl RenderRequest {
    pub fn new(writer_name: &str, first_frame: i32, last_frame: i32, frame_step: i32) -> Self {
        Self {
            writer_name: writer_name.to_string(),
            first_frame,
            last_frame,
            frame_step,
        }
    }
}

/// A frame range bound to a writer node. The node is owned by its collection;
/// the work only holds a weak handle.
#[derive(Debug, Clone)]
pub struct RenderWork {
    writer: Weak<Node>,
    pub writer_name: String,
    pub first_frame: i32,
    pub last_frame: i32,
    pub frame_step: i32,
}

impl RenderWork {
    pub fn new(writer: &Arc<Node>, first_frame: i32, last_frame: i32, frame_step: i32) -> Self {
        Self {
            writer: Arc::downgrade(writer),
            writer_name: writer.script_name(),
            first_frame,
            last_frame,
            frame_step,
        }
    }

    fn named(mut self, writer_name: &str) -> Self {
        self.writer_name = writer_name.to_string();
        self
    }

    /// `None` once the writer has been removed from its graph.
    pub fn writer(&self) -> Option<Arc<Node>> {
        self.writer.upgrade()
    }

    pub fn validate(&self) -> Result<()> {
        if frame_range_is_valid(self.first_frame, self.last_frame, self.frame_step) {
            Ok(())
        } else {
            Err(EngineError::InvalidFrameRange {
                writer: self.writer_name.clone(),
                first: self.first_frame,
                last: self.last_frame,
                step: self.frame_step,
            })
        }
    }

    /// Frames in render order. Empty for a zero step.
    pub fn frames(&self) -> impl Iterator<Item = i32> + use<> {
        let (first, last, step) = (self.first_frame, self.last_frame, self.frame_step);
        let start = if step == 0 { None } else { Some(first) };
        std::iter::successors(start, move |frame| frame.checked_add(step)).take_while(move |frame| {
            if step > 0 { *frame <= last } else { *frame >= last }
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames().count()
    }
}

/// Forward ranges need a positive step, backward ranges a negative one.
/// A single frame accepts either sign.
pub fn frame_range_is_valid(first: i32, last: i32, step: i32) -> bool {
    match step {
        s if s > 0 => first <= last,
        s if s < 0 => first >= last,
        _ => false,
    }
}

/// Either form a caller may hand to the dispatcher.
#[derive(Debug, Clone)]
pub enum RenderTarget {
    Named(RenderRequest),
    Resolved(RenderWork),
}

impl RenderTarget {
    /// Normalises the target into `RenderWork`, looking named writers up in
    /// `collection`. Non-writer nodes count as unknown writers.
    pub fn resolve(self, collection: &NodeCollection) -> Result<RenderWork> {
        match self {
            RenderTarget::Named(request) => {
                let writer = collection
                    .find_by_fully_specified_name(&request.writer_name)
                    .filter(|node| node.is_writer())
                    .ok_or_else(|| EngineError::UnknownWriter(request.writer_name.clone()))?;
                Ok(RenderWork::new(
                    &writer,
                    request.first_frame,
                    request.last_frame,
                    request.frame_step,
                )
                .named(&request.writer_name))
            }
            RenderTarget::Resolved(work) => match work.writer() {
                Some(writer) if writer.is_writer() => Ok(work),
                _ => Err(EngineError::UnknownWriter(work.writer_name)),
            },
        }
    }
}

impl From<RenderRequest> for RenderTarget {
    fn from(request: RenderRequest) -> Self {
        RenderTarget::Named(request)
    }
}

impl From<RenderWork> for RenderTarget {
    fn from(work: RenderWork) -> Self {
        RenderTarget::Resolved(work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_range_needs_negative_step() {
        assert!(frame_range_is_valid(10, 1, -1));
        assert!(!frame_range_is_valid(1, 10, -1));
        assert!(frame_range_is_valid(1, 10, 2));
        assert!(!frame_range_is_valid(10, 1, 1));
        assert!(!frame_range_is_valid(1, 1, 0));
        assert!(frame_range_is_valid(5, 5, -3));
    }
}
