use std::collections::{HashMap, HashSet};

use lunar_config::ComponentDependency;

/// One dependency edge, annotated with the input it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
  pub source: String,
  pub target: String,
  pub input_key: String,
  pub template_key: Option<String>,
}

impl Edge {
  /// `input_key`, or `input_key.template_key` for template bindings.
  pub fn link_key(&self) -> String {
    match &self.template_key {
      Some(template_key) => format!("{}.{}", self.input_key, template_key),
      None => self.input_key.clone(),
    }
  }
}

/// Directed multigraph over component labels.
///
/// Parallel edges are kept: two dependencies between the same pair of
/// components (e.g. feeding different inputs) are two edges.
#[derive(Debug, Clone)]
pub struct Dag {
  /// Labels in insertion order.
  nodes: Vec<String>,
  edges: Vec<Edge>,
  /// label -> indices into `edges` leaving the node.
  outgoing: HashMap<String, Vec<usize>>,
  /// label -> indices into `edges` entering the node.
  incoming: HashMap<String, Vec<usize>>,
}

impl Dag {
  /// Build the graph. Edge endpoints that are not in `labels` are added as nodes.
  pub fn new<'a>(
    labels: impl IntoIterator<Item = &'a str>,
    dependencies: &[ComponentDependency],
  ) -> Self {
    let mut dag = Self {
      nodes: Vec::new(),
      edges: Vec::with_capacity(dependencies.len()),
      outgoing: HashMap::new(),
      incoming: HashMap::new(),
    };

    for label in labels {
      dag.add_node(label);
    }

    for dep in dependencies {
      dag.add_node(&dep.source_label);
      dag.add_node(&dep.target_label);

      let index = dag.edges.len();
      dag.edges.push(Edge {
        source: dep.source_label.clone(),
        target: dep.target_label.clone(),
        input_key: dep.component_input_key.clone(),
        template_key: dep.template_variable_key.clone(),
      });
      dag
        .outgoing
        .entry(dep.source_label.clone())
        .or_default()
        .push(index);
      dag
        .incoming
        .entry(dep.target_label.clone())
        .or_default()
        .push(index);
    }

    dag
  }

  fn add_node(&mut self, label: &str) {
    if !self.outgoing.contains_key(label) {
      self.nodes.push(label.to_string());
      self.outgoing.insert(label.to_string(), Vec::new());
      self.incoming.insert(label.to_string(), Vec::new());
    }
  }

  pub fn nodes(&self) -> &[String] {
    &self.nodes
  }

  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  pub fn contains(&self, label: &str) -> bool {
    self.outgoing.contains_key(label)
  }

  pub fn in_edges(&self, label: &str) -> impl Iterator<Item = &Edge> {
    self
      .incoming
      .get(label)
      .into_iter()
      .flatten()
      .map(|&i| &self.edges[i])
  }

  pub fn out_edges(&self, label: &str) -> impl Iterator<Item = &Edge> {
    self
      .outgoing
      .get(label)
      .into_iter()
      .flatten()
      .map(|&i| &self.edges[i])
  }

  pub fn in_degree(&self, label: &str) -> usize {
    self.incoming.get(label).map_or(0, Vec::len)
  }

  pub fn out_degree(&self, label: &str) -> usize {
    self.outgoing.get(label).map_or(0, Vec::len)
  }

  /// Distinct upstream labels, in edge order.
  pub fn predecessors(&self, label: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    self
      .in_edges(label)
      .map(|e| e.source.as_str())
      .filter(|s| seen.insert(*s))
      .collect()
  }

  /// Distinct downstream labels, in edge order.
  pub fn successors(&self, label: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    self
      .out_edges(label)
      .map(|e| e.target.as_str())
      .filter(|t| seen.insert(*t))
      .collect()
  }

  /// Nodes with no incoming edges.
  pub fn roots(&self) -> Vec<&str> {
    self
      .nodes
      .iter()
      .filter(|n| self.in_degree(n) == 0)
      .map(String::as_str)
      .collect()
  }

  /// Check for cycles using DFS.
  pub fn is_acyclic(&self) -> bool {
    // DFS with coloring: 0 = white (unvisited), 1 = gray (in progress), 2 = black (done)
    let mut color: HashMap<&str, u8> = self.nodes.iter().map(|n| (n.as_str(), 0u8)).collect();

    fn dfs<'a>(dag: &'a Dag, node: &'a str, color: &mut HashMap<&'a str, u8>) -> bool {
      color.insert(node, 1);
      for edge in dag.out_edges(node) {
        match color.get(edge.target.as_str()) {
          Some(1) => return true,
          Some(0) => {
            if dfs(dag, edge.target.as_str(), color) {
              return true;
            }
          }
          _ => {}
        }
      }
      color.insert(node, 2);
      false
    }

    for node in &self.nodes {
      if color.get(node.as_str()) == Some(&0) && dfs(self, node.as_str(), &mut color) {
        return false;
      }
    }
    true
  }

  /// Breadth-first layers starting from the roots.
  ///
  /// Nodes that cannot be reached from any root (only possible with a cycle)
  /// are left out.
  pub fn bfs_layers(&self) -> Vec<Vec<String>> {
    let roots: Vec<String> = self.roots().into_iter().map(str::to_string).collect();
    let mut seen: HashSet<String> = roots.iter().cloned().collect();
    let mut layers = vec![roots];

    while seen.len() < self.nodes.len() {
      let mut next = Vec::new();
      if let Some(previous) = layers.last() {
        for node in previous {
          for successor in self.successors(node) {
            if seen.insert(successor.to_string()) {
              next.push(successor.to_string());
            }
          }
        }
      }
      if next.is_empty() {
        break;
      }
      layers.push(next);
    }

    layers
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dep(source: &str, target: &str, key: &str) -> ComponentDependency {
    ComponentDependency::new(source, target, key, None).unwrap()
  }

  #[test]
  fn test_multigraph_keeps_parallel_edges() {
    let deps = vec![dep("A", "B", "x"), dep("A", "B", "y")];
    let dag = Dag::new(["A", "B"], &deps);

    assert_eq!(dag.out_degree("A"), 2);
    assert_eq!(dag.in_degree("B"), 2);
    assert_eq!(dag.predecessors("B"), vec!["A"]);
    assert_eq!(dag.successors("A"), vec!["B"]);
  }

  #[test]
  fn test_unknown_endpoints_become_nodes() {
    let deps = vec![dep("A", "ghost", "x")];
    let dag = Dag::new(["A"], &deps);
    assert!(dag.contains("ghost"));
    assert_eq!(dag.nodes().len(), 2);
  }

  #[test]
  fn test_cycle_detection() {
    let chain = vec![dep("A", "B", "x"), dep("B", "C", "x")];
    assert!(Dag::new(["A", "B", "C"], &chain).is_acyclic());

    let cycle = vec![dep("A", "B", "x"), dep("B", "C", "x"), dep("C", "A", "x")];
    assert!(!Dag::new(["A", "B", "C"], &cycle).is_acyclic());
  }

  #[test]
  fn test_bfs_layers() {
    let deps = vec![dep("A", "C", "x"), dep("B", "C", "y"), dep("C", "D", "x")];
    let dag = Dag::new(["A", "B", "C", "D"], &deps);
    assert_eq!(
      dag.bfs_layers(),
      vec![
        vec!["A".to_string(), "B".to_string()],
        vec!["C".to_string()],
        vec!["D".to_string()],
      ]
    );
  }

  #[test]
  fn test_bfs_layers_terminates_on_unreachable_cycle() {
    let deps = vec![dep("B", "C", "x"), dep("C", "B", "x")];
    let dag = Dag::new(["A", "B", "C"], &deps);
    assert_eq!(dag.bfs_layers(), vec![vec!["A".to_string()]]);
  }

  #[test]
  fn test_link_key() {
    let deps = vec![ComponentDependency::new("A", "B", "prompt", Some("name".into())).unwrap()];
    let dag = Dag::new(["A", "B"], &deps);
    let edge = dag.in_edges("B").next().unwrap();
    assert_eq!(edge.link_key(), "prompt.name");
  }
}
