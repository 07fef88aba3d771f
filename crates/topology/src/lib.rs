//! In-memory diagram model and its file/wire codec.
//!
//! [`GraphStore`] owns the live nodes and edges the editor manipulates; [`codec`] maps them to
//! and from the [`shared::protocol::Diagram`] wire form. Nothing here touches the network.

pub mod codec;
mod diff;
mod store;

pub use codec::{
    export_diagram, import_diagram, import_diagram_str, read_diagram_file, write_diagram_file,
    CodecError, ImportedGraph, DEFAULT_DIAGRAM_FILE_NAME, DEFAULT_DIAGRAM_NAME,
};
pub use diff::has_diagram_changes;
pub use store::{
    Connection, Edge, EdgeDelta, GraphState, GraphStore, Node, NodeData, NodeDelta,
};
