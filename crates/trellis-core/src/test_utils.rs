//! Test utilities for trellis-core

use crate::*;

/// Handles into the graph built by [`sample_graph`].
pub struct Sample {
    pub graph: TypeGraph,
    pub electrical: TypeNode,
    pub i2c: TypeNode,
    pub resistor: TypeNode,
    pub app: TypeNode,
}

/// `App` holding two resistors in series, plus an unused `I2C` interface.
pub fn sample_graph() -> Sample {
    let mut graph = TypeGraph::default();

    let electrical = graph.add_type("Electrical");
    graph.add_trait(electrical, IS_INTERFACE);

    let i2c = graph.add_type("I2C");
    graph.add_trait(i2c, IS_INTERFACE);
    graph.add_make_child(i2c, electrical, "scl");
    graph.add_make_child(i2c, electrical, "sda");

    let resistor = graph.add_type("Resistor");
    graph.add_trait(resistor, IS_COMPONENT);
    graph.add_make_child(resistor, electrical, "p1");
    graph.add_make_child(resistor, electrical, "p2");

    let app = graph.add_type("App");
    graph.add_trait(app, IS_MODULE);
    graph.add_make_child(app, resistor, "r1");
    graph.add_make_child(app, resistor, "r2");
    let lhs = graph.add_reference(app, &["r1", "p2"]);
    let rhs = graph.add_reference(app, &["r2", "p1"]);
    graph.add_make_link(app, lhs, rhs, EdgeSpec::connection());

    Sample {
        graph,
        electrical,
        i2c,
        resistor,
        app,
    }
}

/// Child identifiers of a type, in declaration order.
pub fn child_names(graph: &TypeGraph, ty: TypeNode) -> Vec<String> {
    graph
        .iter_make_children(ty)
        .into_iter()
        .map(|(id, _)| id.to_string())
        .collect()
}
