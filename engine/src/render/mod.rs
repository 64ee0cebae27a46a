pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod process;
pub mod stats;
pub mod work;

pub use dispatcher::{
    BatchReport, CancelToken, DispatchHandle, DispatchOptions, DispatchState, ExecutionMode,
    ItemOutcome, ProjectExporter, RenderDispatcher,
};
pub use error::RenderError;
pub use process::ProcessLauncher;
pub use stats::RenderStats;
pub use work::{RenderRequest, RenderTarget, RenderWork};
