pub mod command_line;
pub mod instance;
pub mod project;
pub mod registry;
pub mod timeline;

pub use command_line::{CommandLineArgs, WriterArg};
pub use instance::{AppInstance, AppServices, CloseOutcome, RenderLaunch};
pub use project::{Project, ProjectDocument};
pub use registry::SessionRegistry;
pub use timeline::Timeline;
