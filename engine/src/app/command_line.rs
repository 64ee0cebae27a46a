//! Command-surface inputs for driving renders.

use std::path::PathBuf;
use std::str::FromStr;

/// One `--writer` value: `NAME[:FIRST:LAST[:STEP]]`. Missing bounds are taken
/// from the writer's own range, then from the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterArg {
    pub name: String,
    pub first_frame: Option<i32>,
    pub last_frame: Option<i32>,
    pub frame_step: Option<i32>,
}

impl WriterArg {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            first_frame: None,
            last_frame: None,
            frame_step: None,
        }
    }

    pub fn with_range(mut self, first: i32, last: i32, step: i32) -> Self {
        self.first_frame = Some(first);
        self.last_frame = Some(last);
        self.frame_step = Some(step);
        self
    }
}

impl FromStr for WriterArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.split(':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(format!("'{}': writer name is empty", value));
        }

        let numbers = parts
            .map(|part| {
                part.trim()
                    .parse::<i32>()
                    .map_err(|_| format!("'{}': '{}' is not a frame number", value, part))
            })
            .collect::<Result<Vec<i32>, String>>()?;

        let mut arg = WriterArg::new(name);
        match numbers.as_slice() {
            [] => {}
            [first, last] => {
                arg.first_frame = Some(*first);
                arg.last_frame = Some(*last);
            }
            [first, last, step] => {
                arg = arg.with_range(*first, *last, *step);
            }
            _ => {
                return Err(format!(
                    "'{}': expected NAME, NAME:FIRST:LAST or NAME:FIRST:LAST:STEP",
                    value
                ));
            }
        }
        Ok(arg)
    }
}

/// Everything an external entry point needs to load a project and render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLineArgs {
    pub project: PathBuf,
    /// Empty means every writer of the project.
    pub writers: Vec<WriterArg>,
    pub collect_stats: bool,
    pub block: bool,
    pub separate_process: bool,
    /// Base directory for relative writer outputs. Defaults to the project's
    /// directory.
    pub output_dir: Option<PathBuf>,
}

impl CommandLineArgs {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            writers: Vec::new(),
            collect_stats: false,
            block: true,
            separate_process: false,
            output_dir: None,
        }
    }
}
