use std::sync::Arc;

use crate::builtin::{CONSTANT_ID, DOT_ID, GROUP_ID};
use crate::node::ParamDefinition;
use crate::plugin::{NodePlugin, PluginDescriptor};

/// Non-rendering nodes: routing dots, constants and plain groups.
pub struct UtilityPlugin {
    descriptor: Arc<PluginDescriptor>,
    parameters: Vec<ParamDefinition>,
    inputs: usize,
}

impl UtilityPlugin {
    pub fn dot() -> Self {
        Self {
            descriptor: Arc::new(PluginDescriptor::new(DOT_ID, "Dot", 1, 0).with_grouping("Other")),
            parameters: Vec::new(),
            inputs: 1,
        }
    }

    pub fn constant() -> Self {
        Self {
            descriptor: Arc::new(
                PluginDescriptor::new(CONSTANT_ID, "Constant", 1, 0).with_grouping("Image"),
            ),
            parameters: vec![ParamDefinition::new("value", 0)],
            inputs: 0,
        }
    }

    pub fn group() -> Self {
        Self {
            descriptor: Arc::new(
                PluginDescriptor::new(GROUP_ID, "Group", 1, 0)
                    .with_grouping("Other")
                    .group(),
            ),
            parameters: Vec::new(),
            inputs: 1,
        }
    }
}

impl NodePlugin for UtilityPlugin {
    fn descriptor(&self) -> &Arc<PluginDescriptor> {
        &self.descriptor
    }

    fn parameters(&self) -> Vec<ParamDefinition> {
        self.parameters.clone()
    }

    fn input_count(&self) -> usize {
        self.inputs
    }
}
