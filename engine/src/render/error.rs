use thiserror::Error;

/// Failure of one render item, tagged with the writer that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Writer '{writer}' failed{}: {message}", describe_frame(.frame))]
    Failed {
        writer: String,
        frame: Option<i32>,
        message: String,
    },
    #[error("Render of '{writer}' was cancelled")]
    Cancelled { writer: String },
}

impl RenderError {
    pub fn failed(writer: &str, frame: Option<i32>, message: impl Into<String>) -> Self {
        RenderError::Failed {
            writer: writer.to_string(),
            frame,
            message: message.into(),
        }
    }

    pub fn writer(&self) -> &str {
        match self {
            RenderError::Failed { writer, .. } | RenderError::Cancelled { writer } => writer,
        }
    }

    pub fn frame(&self) -> Option<i32> {
        match self {
            RenderError::Failed { frame, .. } => *frame,
            RenderError::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Cancelled { .. })
    }
}

fn describe_frame(frame: &Option<i32>) -> String {
    frame.map(|f| format!(" at frame {}", f)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_writer_and_frame() {
        let err = RenderError::failed("Write2", Some(14), "disk full");
        assert_eq!(err.to_string(), "Writer 'Write2' failed at frame 14: disk full");
        let err = RenderError::failed("Write2", None, "no output");
        assert_eq!(err.to_string(), "Writer 'Write2' failed: no output");
    }
}
