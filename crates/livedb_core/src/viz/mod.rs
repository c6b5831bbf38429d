//! # Dependency Graph Vizualisation
//! Renders a [`DependencyGraph`] as a graphviz dot graph, for debugging
//! compiled queries.
//!
//! ```ignore
//! let graph = DependencyGraph::build(&plan, query)?;
//! let dot = viz::render_string(&plan, &graph, &DisplayConfig::default())?;
//! ```
//! Edges are drawn from inputs to their dependents, so data flows down the
//! page to the root selection.

use crate::{
    graph::{DependencyGraph, DependencyNode, NodeKey},
    plan::{self, Expression, Plan, Selection},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, io::Write};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Draw literal nodes (these are often numerous and uninteresting).
    pub show_literals: bool,
    /// Annotate collection nodes with their conditions.
    pub show_conditions: bool,
    /// Suffix labels with arena indexes.
    pub show_ir_ids: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_literals: true,
            show_conditions: true,
            show_ir_ids: false,
        }
    }
}

type Edge = (NodeKey, NodeKey);

pub fn render<W: Write>(lp: &Plan, graph: &DependencyGraph, config: &DisplayConfig, out: &mut W) -> std::io::Result<()> {
    dot::render(
        &plan::With {
            plan: lp,
            extended: (graph, config),
        },
        out,
    )
}

pub fn render_string(lp: &Plan, graph: &DependencyGraph, config: &DisplayConfig) -> std::io::Result<String> {
    let mut buf = Vec::new();
    render(lp, graph, config, &mut buf)?;
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl With<'_> {
    fn shown(&self, key: NodeKey) -> bool {
        let (graph, config) = self.extended;
        config.show_literals
            || !matches!(
                &graph.get(key).node,
                DependencyNode::Expression { expr } if matches!(self.plan.get_expr(*expr), Expression::Literal(_))
            )
    }

    fn label(&self, key: NodeKey) -> String {
        let (graph, config) = self.extended;
        let lp = self.plan;
        let mut label = match &graph.get(key).node {
            DependencyNode::Collection {
                source,
                collection,
                conditions,
            } => {
                let mut l = format!(
                    "{} as {}",
                    lp.get_collection(*collection).name,
                    lp.get_source(*source).alias
                );
                if config.show_conditions && !conditions.is_empty() {
                    l.push_str(&format!(
                        "\n[{}]",
                        conditions.iter().map(|c| lp.describe_expr(*c)).join(" && ")
                    ));
                }
                l
            }
            DependencyNode::Expression { expr } => match lp.get_expr(*expr) {
                Expression::Call { func, .. } => func.to_string(),
                Expression::Subquery(_) => "subquery".to_owned(),
                _ => lp.describe_expr(*expr),
            },
            DependencyNode::Aggregate { agg, .. } => lp.describe_expr(*agg),
            DependencyNode::Selection { body } => {
                let b = lp.get_body(*body);
                let fields = match &b.selection {
                    Some(Selection::Fields(fields)) => fields
                        .iter()
                        .map(|f| match f {
                            plan::SelectField::Named { name, .. } => name.clone(),
                            plan::SelectField::Spread(e) => format!("..{}", lp.describe_expr(*e)),
                        })
                        .join(", "),
                    Some(Selection::Value(e)) => lp.describe_expr(*e),
                    None => String::new(),
                };
                let mut l = format!("select {{{fields}}}");
                if b.group_by.is_some() {
                    l.push_str(" grouped");
                }
                if b.is_windowed() {
                    l.push_str(" windowed");
                }
                l
            }
        };
        if config.show_ir_ids {
            label.push_str(&format!(" #{}", key.arr_idx()));
        }
        label
    }
}

type With<'a> = plan::With<'a, (&'a DependencyGraph, &'a DisplayConfig)>;

impl<'a> dot::Labeller<'a, NodeKey, Edge> for With<'a> {
    fn graph_id(&'a self) -> dot::Id<'a> {
        dot::Id::new("livedb_query").unwrap()
    }

    fn node_id(&'a self, n: &NodeKey) -> dot::Id<'a> {
        dot::Id::new(format!("node{}", n.arr_idx())).unwrap()
    }

    fn node_shape(&'a self, n: &NodeKey) -> Option<dot::LabelText<'a>> {
        let shape = match &self.extended.0.get(*n).node {
            DependencyNode::Collection { .. } => "cylinder",
            DependencyNode::Expression { .. } => "box",
            DependencyNode::Aggregate { .. } => "hexagon",
            DependencyNode::Selection { .. } => "doubleoctagon",
        };
        Some(dot::LabelText::label(shape))
    }

    fn node_label(&'a self, n: &NodeKey) -> dot::LabelText<'a> {
        dot::LabelText::label(self.label(*n))
    }

    fn node_color(&'a self, n: &NodeKey) -> Option<dot::LabelText<'a>> {
        match &self.extended.0.get(*n).node {
            DependencyNode::Collection { .. } => Some(dot::LabelText::label("blue")),
            DependencyNode::Aggregate { .. } => Some(dot::LabelText::label("red")),
            DependencyNode::Selection { .. } => Some(dot::LabelText::label("darkgreen")),
            DependencyNode::Expression { .. } => None,
        }
    }

    fn edge_label(&'a self, _e: &Edge) -> dot::LabelText<'a> {
        dot::LabelText::label("")
    }
}

impl<'a> dot::GraphWalk<'a, NodeKey, Edge> for With<'a> {
    fn nodes(&'a self) -> dot::Nodes<'a, NodeKey> {
        Cow::Owned(
            self.extended
                .0
                .topological_order()
                .iter()
                .copied()
                .filter(|k| self.shown(*k))
                .collect(),
        )
    }

    fn edges(&'a self) -> dot::Edges<'a, Edge> {
        let graph = self.extended.0;
        Cow::Owned(
            graph
                .topological_order()
                .iter()
                .filter(|k| self.shown(**k))
                .flat_map(move |k| {
                    graph
                        .get(*k)
                        .depends_on
                        .iter()
                        .filter(move |d| self.shown(**d))
                        .map(move |d| (*d, *k))
                })
                .unique_by(|(a, b)| (a.arr_idx(), b.arr_idx()))
                .collect(),
        )
    }

    fn source(&'a self, edge: &Edge) -> NodeKey {
        edge.0
    }

    fn target(&'a self, edge: &Edge) -> NodeKey {
        edge.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use livedb_store::MemCollection;

    #[test]
    fn renders_every_node() {
        let mut lp = Plan::new();
        let people = lp.collection(MemCollection::new("Person"));
        let query = lp
            .query(|q| {
                let p = q.from(people);
                let n = q.count_all();
                q.select(fields! { name: p.get("name"), n: n })
                    .group_by([p.get("name")]);
            })
            .unwrap();
        let graph = DependencyGraph::build(&lp, query).unwrap();
        let config = DisplayConfig {
            show_ir_ids: true,
            ..DisplayConfig::default()
        };
        let out = render_string(&lp, &graph, &config).unwrap();
        assert!(out.starts_with("digraph livedb_query"));
        assert!(out.contains("Person as source"));
        assert!(out.contains("count()"));
        assert!(out.contains("select {name, n} grouped"));
    }
}
