use super::*;
use shared::domain::{ApiServiceConfig, RedisConfig};

fn api(label: &str) -> NodeData {
    NodeData::new(ServiceType::ApiService, label)
}

fn store_with(ids: &[&str]) -> GraphStore {
    let mut store = GraphStore::new();
    store.load_diagram(
        ids.iter()
            .map(|id| Node::new(*id, Position::default(), api(id)))
            .collect(),
        Vec::new(),
    );
    store
}

#[test]
fn add_node_assigns_monotonic_ids() {
    let mut store = GraphStore::new();
    let first = store.add_node(Position::new(1.0, 2.0), api("a"));
    let second = store.add_node(Position::new(3.0, 4.0), api("b"));

    assert_eq!(first, NodeId::from("node-1"));
    assert_eq!(second, NodeId::from("node-2"));
    assert_eq!(store.nodes().len(), 2);
    assert_eq!(store.nodes()[1].position, Position::new(3.0, 4.0));
    assert!(store.nodes()[0].data.config.is_none());
}

#[test]
fn add_node_skips_ids_already_loaded() {
    let mut store = store_with(&["node-1", "node-2"]);
    let id = store.add_node(Position::default(), api("fresh"));
    assert_eq!(id, NodeId::from("node-3"));
}

#[test]
fn duplicate_directed_connect_is_ignored() {
    let mut store = store_with(&["n1", "n2"]);

    let first = store.connect(Connection::new("n1", "n2"));
    let second = store.connect(Connection::new("n1", "n2"));

    assert_eq!(first, Some(EdgeId::from("edge-1")));
    assert_eq!(second, None);
    assert_eq!(store.edges().len(), 1);
    assert_eq!(store.edges()[0].label, "");
}

#[test]
fn reverse_direction_is_a_distinct_edge() {
    let mut store = store_with(&["n1", "n2"]);
    store.connect(Connection::new("n1", "n2"));
    store.connect(Connection::new("n2", "n1"));
    assert_eq!(store.edges().len(), 2);
}

#[test]
fn duplicate_check_ignores_handles() {
    let mut store = store_with(&["n1", "n2"]);
    store.connect(Connection {
        source_handle: Some("right".into()),
        ..Connection::new("n1", "n2")
    });
    let blocked = store.connect(Connection {
        source_handle: Some("bottom".into()),
        ..Connection::new("n1", "n2")
    });
    assert!(blocked.is_none());
    assert_eq!(store.edges()[0].source_handle.as_deref(), Some("right"));
}

#[test]
fn no_ordered_pair_repeats_after_many_connects() {
    let mut store = store_with(&["a", "b", "c"]);
    let ids = ["a", "b", "c"];
    for _ in 0..3 {
        for source in ids {
            for target in ids {
                store.connect(Connection::new(source, target));
            }
        }
    }

    let mut seen = HashSet::new();
    for edge in store.edges() {
        assert!(seen.insert((edge.source.clone(), edge.target.clone())));
    }
    assert_eq!(store.edges().len(), 9);
}

#[test]
fn connect_with_unknown_endpoint_is_ignored() {
    let mut store = store_with(&["n1"]);
    assert!(store.connect(Connection::new("n1", "ghost")).is_none());
    assert!(store.edges().is_empty());
}

#[test]
fn removing_selected_node_clears_selection() {
    let mut store = store_with(&["n1", "n2"]);
    store.select_node(Some(NodeId::from("n1")));

    store.apply_node_deltas(&[NodeDelta::Remove {
        id: NodeId::from("n1"),
    }]);

    assert!(store.selected_node_id().is_none());
    assert_eq!(store.nodes().len(), 1);
}

#[test]
fn removing_other_node_keeps_selection() {
    let mut store = store_with(&["n1", "n2"]);
    store.select_node(Some(NodeId::from("n1")));

    store.apply_node_deltas(&[NodeDelta::Remove {
        id: NodeId::from("n2"),
    }]);

    assert_eq!(store.selected_node_id(), Some(&NodeId::from("n1")));
    assert_eq!(store.selected_node().map(|n| n.data.label.as_str()), Some("n1"));
}

#[test]
fn removing_node_drops_attached_edges() {
    let mut store = store_with(&["n1", "n2", "n3"]);
    store.connect(Connection::new("n1", "n2"));
    store.connect(Connection::new("n3", "n1"));
    store.connect(Connection::new("n2", "n3"));

    store.apply_node_deltas(&[NodeDelta::Remove {
        id: NodeId::from("n1"),
    }]);

    assert_eq!(store.edges().len(), 1);
    assert_eq!(store.edges()[0].source, NodeId::from("n2"));
}

#[test]
fn move_and_select_deltas_apply_in_order() {
    let mut store = store_with(&["n1"]);
    let id = NodeId::from("n1");

    store.apply_node_deltas(&[
        NodeDelta::Move {
            id: id.clone(),
            position: Some(Position::new(40.0, 50.0)),
            dragging: true,
        },
        NodeDelta::Move {
            id: id.clone(),
            position: None,
            dragging: false,
        },
        NodeDelta::Select {
            id: id.clone(),
            selected: true,
        },
    ]);

    let node = &store.nodes()[0];
    assert_eq!(node.position, Position::new(40.0, 50.0));
    assert!(!node.dragging);
    assert!(node.selected);
}

#[test]
fn edge_deltas_select_and_remove() {
    let mut store = store_with(&["n1", "n2"]);
    let a = store.connect(Connection::new("n1", "n2")).expect("edge");
    let b = store.connect(Connection::new("n2", "n1")).expect("edge");

    store.apply_edge_deltas(&[
        EdgeDelta::Select {
            id: a.clone(),
            selected: true,
        },
        EdgeDelta::Remove { id: b },
    ]);

    assert_eq!(store.edges().len(), 1);
    assert!(store.edges()[0].selected);
    assert_eq!(store.edges()[0].id, a);
}

#[test]
fn field_updates_target_one_element() {
    let mut store = store_with(&["n1", "n2"]);
    let edge = store.connect(Connection::new("n1", "n2")).expect("edge");
    let config = ServiceConfig::ApiService(ApiServiceConfig {
        port: 9000,
        endpoints: Vec::new(),
    });

    store.update_node_label(&NodeId::from("n2"), "Billing");
    store.update_node_config(&NodeId::from("n2"), config.clone());
    store.update_edge_label(&edge, "reads");

    assert_eq!(store.nodes()[0].data.label, "n1");
    assert_eq!(store.nodes()[1].data.label, "Billing");
    assert!(store.nodes()[0].data.config.is_none());
    assert_eq!(store.nodes()[1].data.effective_config(), config);
    assert_eq!(store.edges()[0].label, "reads");

    store.remove_edge(&edge);
    assert!(store.edges().is_empty());
}

#[test]
fn config_for_another_kind_is_ignored() {
    let mut store = store_with(&["n1"]);
    let before = store.state();

    store.update_node_config(
        &NodeId::from("n1"),
        ServiceConfig::Redis(RedisConfig::default()),
    );

    assert!(Arc::ptr_eq(&before, &store.state()));
    assert!(store.nodes()[0].data.config.is_none());
    assert_eq!(
        store.nodes()[0].data.effective_config().service_type(),
        ServiceType::ApiService
    );
}

#[test]
fn config_update_keeps_fields_it_does_not_model() {
    let mut store = GraphStore::new();
    let fields = serde_json::json!({ "type": "redis", "maxMemory": "1gb", "persistence": true });
    let mut data = NodeData::new(ServiceType::Redis, "cache");
    data.config = Some(serde_json::from_value(fields).expect("config"));
    store.load_diagram(vec![Node::new("cache", Position::default(), data)], Vec::new());

    store.update_node_config(
        &NodeId::from("cache"),
        ServiceConfig::Redis(RedisConfig {
            max_memory: "4gb".into(),
            eviction_policy: "noeviction".into(),
        }),
    );

    let stored = store.nodes()[0].data.config.as_ref().expect("config");
    assert_eq!(stored.fields()["maxMemory"], "4gb");
    assert_eq!(stored.fields()["persistence"], true);
}

#[test]
fn unknown_ids_keep_the_same_snapshot() {
    let mut store = store_with(&["n1"]);
    let before = store.state();

    store.update_node_label(&NodeId::from("ghost"), "x");
    store.update_node_config(
        &NodeId::from("ghost"),
        ServiceConfig::default_for(ServiceType::Nginx),
    );
    store.update_edge_label(&EdgeId::from("ghost"), "x");
    store.remove_edge(&EdgeId::from("ghost"));
    store.apply_node_deltas(&[NodeDelta::Remove {
        id: NodeId::from("ghost"),
    }]);
    store.connect(Connection::new("n1", "ghost"));

    assert!(Arc::ptr_eq(&before, &store.state()));
}

#[test]
fn mutation_produces_new_snapshot_and_leaves_old_intact() {
    let mut store = store_with(&["n1"]);
    let before = store.state();

    store.update_node_label(&NodeId::from("n1"), "renamed");

    let after = store.state();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.nodes[0].data.label, "n1");
    assert_eq!(after.nodes[0].data.label, "renamed");
}

#[test]
fn load_diagram_replaces_graph_and_clears_selection() {
    let mut store = store_with(&["n1", "n2"]);
    store.connect(Connection::new("n1", "n2"));
    store.select_node(Some(NodeId::from("n2")));
    store.set_viewport(Viewport {
        x: 10.0,
        y: 5.0,
        zoom: 1.5,
    });

    store.load_diagram(
        vec![Node::new("x", Position::default(), api("x"))],
        Vec::new(),
    );

    assert_eq!(store.nodes().len(), 1);
    assert!(store.edges().is_empty());
    assert!(store.selected_node_id().is_none());
    assert_eq!(store.viewport().zoom, 1.5);
}

#[test]
fn effective_config_falls_back_to_defaults_without_storing() {
    let data = NodeData::new(ServiceType::Postgresql, "db");
    let ServiceConfig::Postgresql(config) = data.effective_config() else {
        panic!("expected postgresql defaults");
    };
    assert_eq!(config.version, "16");
    assert!(data.config.is_none());
}
