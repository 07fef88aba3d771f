use std::collections::HashSet;

use shared::protocol::Diagram;

use crate::store::Node;

/// Whether the live graph has drifted from the last deployed diagram.
///
/// Only the node-id set is compared: additions and removals count, field edits on existing
/// nodes (label, config, position) and edge changes do not. With nothing deployed there is
/// nothing to drift from.
pub fn has_diagram_changes(nodes: &[Node], last_deployed: Option<&Diagram>) -> bool {
    let Some(last_deployed) = last_deployed else {
        return false;
    };
    let current: HashSet<_> = nodes.iter().map(|node| &node.id).collect();
    let deployed: HashSet<_> = last_deployed.nodes.iter().map(|node| &node.id).collect();
    current.len() != deployed.len() || current.iter().any(|id| !deployed.contains(id))
}
