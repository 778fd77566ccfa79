use std::{fs::File, io::Write};

use graphviz_rust::{
  attributes::{EdgeAttributes, NodeAttributes},
  dot_structures::{
    Edge as GEdge, EdgeTy, Graph, Id, Node as GNode, NodeId as GNid, Port, Stmt, Vertex,
  },
  printer::{DotPrinter, PrinterContext},
};

use crate::tree::{Tree, VNode, VNodeId};

fn render<S: Clone>(
  tree: &Tree<S>,
  id: VNodeId,
  g: &mut Graph,
  theta: f32,
  depth: u32,
  count: &mut u32,
) -> GNid {
  let node = tree.node(id);
  let node_id = *count;
  *count += 1;
  let leaf = depth == 0 || node.value().count() <= theta;
  let label = node_format(node, leaf);
  let n = GNode::new(
    GNid(Id::Plain(format!("{node_id}")), None),
    vec![
      NodeAttributes::label(label),
      NodeAttributes::shape(graphviz_rust::attributes::shape::plaintext),
    ],
  );
  g.add_stmt(Stmt::Node(n));

  if !leaf {
    for (action, qnode) in node.qnodes().iter().enumerate() {
      for (observation, child) in qnode.children() {
        let child_id = render(tree, *child, g, theta, depth - 1, count);

        let e = GEdge {
          ty: EdgeTy::Pair(
            Vertex::N(GNid(
              Id::Plain(format!("{node_id}")),
              Some(Port(Some(Id::Plain(format!("{action}"))), None)),
            )),
            Vertex::N(child_id),
          ),
          attributes: vec![EdgeAttributes::label(format!("\"o{}\"", observation))],
        };
        g.add_stmt(Stmt::Edge(e));
      }
    }
  }
  GNid(Id::Plain(format!("{node_id}")), None)
}

pub fn render_tree<S: Clone>(tree: &Tree<S>, root: VNodeId, theta: f32, depth: u32) -> Graph {
  let mut g = Graph::DiGraph {
    id: Id::Plain("".to_string()),
    strict: false,
    stmts: vec![],
  };
  let mut count = 0;
  render(tree, root, &mut g, theta, depth, &mut count);
  g
}

pub fn save<S: Clone>(tree: &Tree<S>, root: VNodeId, mut f: File, theta: f32, depth: u32) {
  let g = render_tree(tree, root, theta, depth);
  let mut ctx = PrinterContext::default();
  write!(f, "{}", g.print(&mut ctx)).unwrap();
}

fn node_format<S: Clone>(node: &VNode<S>, leaf: bool) -> String {
  let action_row = if leaf || node.qnodes().is_empty() {
    "".to_string()
  } else {
    let mut result =
      "<table bgcolor=\"lightblue\" border=\"0\" cellspacing=\"0\" cellborder=\"1\"><tr>"
        .to_string();
    for (action, qnode) in node.qnodes().iter().enumerate() {
      result.push_str(&format!(
        "<td port=\"{action}\">a{action}<br/>{:.2}/{}</td>",
        qnode.value().mean(),
        qnode.value().count() as u32
      ));
    }
    result.push_str("</tr></table>");
    result
  };
  format!(
    "<<table border=\"0\"><tr><td>v {:.3} n {} b {}</td></tr><tr><td>{}</td></tr></table>>",
    node.value().mean(),
    node.value().count() as u32,
    node.belief().len(),
    action_row
  )
}
