//! Node Registry exposed through the roster ports of the narrative and the
//! dispatcher.

use std::sync::Arc;

use et_01_node_registry::{NodeRegistryApi, NodeRegistryService};
use et_02_narrative::NodeDirectory;
use et_03_config_dispatch::NodeLookup;
use shared_types::{NodeId, NodeRole};

#[derive(Clone)]
pub struct RegistryDirectory {
    registry: Arc<NodeRegistryService>,
}

impl RegistryDirectory {
    pub fn new(registry: Arc<NodeRegistryService>) -> Self {
        Self { registry }
    }
}

impl NodeDirectory for RegistryDirectory {
    fn role_of(&self, node_id: &NodeId) -> Option<NodeRole> {
        self.registry.role_of(node_id)
    }

    fn nodes_with_role(&self, role: NodeRole) -> Vec<NodeId> {
        self.registry.nodes_with_role(role)
    }
}

impl NodeLookup for RegistryDirectory {
    fn is_registered(&self, node_id: &NodeId) -> bool {
        self.registry.role_of(node_id).is_some()
    }
}
