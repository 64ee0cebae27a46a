pub mod collection;
pub mod factory;
pub mod instance;
pub mod params;
pub mod snapshot;

pub use collection::NodeCollection;
pub use factory::{CreationRequest, LoadRequest, NodeFactory};
pub use instance::{Node, NodeState};
pub use params::{ParamAssignment, ParamDefinition, ParamSet, ParamValue};
pub use snapshot::NodeSnapshot;
