//! Dependency graph building.
//!
//! Files are allocated once as nodes of a [`NodeRegistry`] graph and
//! referenced by [`NodeId`] afterwards; an edge runs from a file to each of
//! its dependencies. The registry is keyed by relative path, so a file
//! imported from several places is extracted once and shared by every
//! parent in the same run.
//!
//! # Resolution
//!
//! For each identifier returned by the extractor the file is looked up, in
//! order, in:
//! 1. the registry (already resolved),
//! 2. each include directory, in the order given,
//! 3. the directory of the file being expanded, when local includes are on.
//!
//! The first match wins. Callers that know their candidates up front
//! register them first (see [`NodeRegistry::register`]), so a candidate's
//! key always names the candidate itself and never an include-dir file with
//! the same relative path. A registered node is expanded the first time it
//! is reached, completely, before it is attached to its parent. Every
//! attachment is checked for a path from the new dependency back to its
//! parent. Since edges are added one at a time, checking only the edge
//! being added is enough to keep the graph acyclic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, trace};

use super::SourceProbe;
use super::types::GraphError;

/// Index of a node in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(super) NodeIndex);

/// One file taking part in dependency resolution.
#[derive(Debug, Clone)]
pub struct FileNode {
  relative_path: String,
  full_path: PathBuf,
  expanded: bool,
  pub(super) effective_mod_time: Option<SystemTime>,
}

impl FileNode {
  /// Identity key, relative to the directory the file was found in.
  pub fn relative_path(&self) -> &str {
    &self.relative_path
  }

  pub fn full_path(&self) -> &Path {
    &self.full_path
  }

  /// Set once the staleness engine has visited the node.
  pub fn effective_mod_time(&self) -> Option<SystemTime> {
    self.effective_mod_time
  }
}

/// Where dependency identifiers are looked up.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
  pub include_dirs: Vec<PathBuf>,
  pub local_include: bool,
}

impl SearchPath {
  pub fn new(include_dirs: Vec<PathBuf>, local_include: bool) -> Self {
    Self {
      include_dirs,
      local_include,
    }
  }
}

/// Run-scoped owner of every [`FileNode`].
#[derive(Debug, Default)]
pub struct NodeRegistry {
  pub(super) graph: DiGraph<FileNode, ()>,
  index: HashMap<String, NodeId>,
}

/// A node being expanded, with the identifiers it still has to attach.
struct Frame {
  node: NodeId,
  pending: std::vec::IntoIter<String>,
  attach_to: Option<NodeId>,
}

enum Lookup {
  Existing(NodeId),
  Created(NodeId),
}

impl NodeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Look a node up by its relative path.
  pub fn get(&self, relative_path: &str) -> Option<NodeId> {
    self.index.get(relative_path).copied()
  }

  pub fn node(&self, id: NodeId) -> &FileNode {
    &self.graph[id.0]
  }

  pub(super) fn node_mut(&mut self, id: NodeId) -> &mut FileNode {
    &mut self.graph[id.0]
  }

  /// Direct dependencies, in the order the extractor returned them.
  pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
    // petgraph lists the most recently added edge first.
    let mut deps: Vec<NodeId> = self.graph.neighbors(id.0).map(NodeId).collect();
    deps.reverse();
    deps
  }

  /// Relative paths of a node's direct dependencies.
  pub fn dependency_paths(&self, id: NodeId) -> Vec<&str> {
    self
      .dependencies(id)
      .into_iter()
      .map(|dep| self.node(dep).relative_path.as_str())
      .collect()
  }

  /// Register a file without expanding it. Returns the existing node when the
  /// relative path is already known.
  pub fn register(&mut self, relative_path: &str, full_path: &Path) -> NodeId {
    if let Some(id) = self.get(relative_path) {
      return id;
    }
    self.insert(relative_path, full_path)
  }

  fn insert(&mut self, relative_path: &str, full_path: &Path) -> NodeId {
    let id = NodeId(self.graph.add_node(FileNode {
      relative_path: relative_path.to_string(),
      full_path: full_path.to_path_buf(),
      expanded: false,
      effective_mod_time: None,
    }));
    self.index.insert(relative_path.to_string(), id);
    trace!(relative = %relative_path, full = %full_path.display(), "registered file");
    id
  }

  /// Fetch the node for `relative_path`, registering and resolving it first
  /// when it is not known yet.
  ///
  /// Expanded nodes are returned as they are; the extractor is never called
  /// twice for the same relative path.
  ///
  /// # Errors
  ///
  /// [`GraphError::KeyConflict`] when `relative_path` is already registered
  /// for a different file, plus every error of [`NodeRegistry::resolve`].
  pub fn get_or_resolve<X, P>(
    &mut self,
    relative_path: &str,
    full_path: &Path,
    search: &SearchPath,
    extract: &mut X,
    probe: &P,
  ) -> Result<NodeId, GraphError>
  where
    X: FnMut(&Path) -> Result<Vec<String>, GraphError>,
    P: SourceProbe + ?Sized,
  {
    let id = match self.get(relative_path) {
      Some(id) => {
        let registered = &self.node(id).full_path;
        if registered != full_path {
          return Err(GraphError::KeyConflict {
            key: relative_path.to_string(),
            registered: registered.clone(),
            requested: full_path.to_path_buf(),
          });
        }
        if self.node(id).expanded {
          return Ok(id);
        }
        id
      }
      None => self.insert(relative_path, full_path),
    };
    self.resolve(id, search, extract, probe)?;
    Ok(id)
  }

  /// Resolve the transitive dependencies of a registered node.
  ///
  /// # Errors
  ///
  /// - [`GraphError::MissingDependency`] when an identifier matches no file
  /// - [`GraphError::CircularDependency`] when an edge would close a cycle
  pub fn resolve<X, P>(&mut self, root: NodeId, search: &SearchPath, extract: &mut X, probe: &P) -> Result<(), GraphError>
  where
    X: FnMut(&Path) -> Result<Vec<String>, GraphError>,
    P: SourceProbe + ?Sized,
  {
    let mut stack = vec![self.frame(root, None, extract)?];

    while let Some(frame) = stack.last_mut() {
      let parent = frame.node;
      match frame.pending.next() {
        Some(identifier) => match self.lookup(&identifier, parent, search, probe)? {
          Lookup::Existing(dep) => self.attach(parent, dep)?,
          Lookup::Created(dep) => {
            let child = self.frame(dep, Some(parent), extract)?;
            stack.push(child);
          }
        },
        None => {
          let done = stack.pop();
          if let Some(Frame {
            node,
            attach_to: Some(parent),
            ..
          }) = done
          {
            self.attach(parent, node)?;
          }
        }
      }
    }

    Ok(())
  }

  fn frame<X>(&mut self, node: NodeId, attach_to: Option<NodeId>, extract: &mut X) -> Result<Frame, GraphError>
  where
    X: FnMut(&Path) -> Result<Vec<String>, GraphError>,
  {
    self.node_mut(node).expanded = true;
    let full_path = &self.node(node).full_path;
    let identifiers = extract(full_path)?;
    if !identifiers.is_empty() {
      debug!(file = %self.node(node).relative_path, dependencies = ?identifiers, "extracted dependencies");
    }
    Ok(Frame {
      node,
      pending: identifiers.into_iter(),
      attach_to,
    })
  }

  fn lookup<P>(&mut self, identifier: &str, parent: NodeId, search: &SearchPath, probe: &P) -> Result<Lookup, GraphError>
  where
    P: SourceProbe + ?Sized,
  {
    if let Some(id) = self.get(identifier) {
      return Ok(self.known(id));
    }

    for include_dir in &search.include_dirs {
      let candidate = include_dir.join(identifier);
      if probe.is_file(&candidate)? {
        return Ok(Lookup::Created(self.insert(identifier, &candidate)));
      }
    }

    if search.local_include {
      let node = self.node(parent);
      let candidate = sibling(&node.full_path, identifier);
      if probe.is_file(&candidate)? {
        let key = sibling(Path::new(&node.relative_path), identifier)
          .to_string_lossy()
          .into_owned();
        if let Some(id) = self.get(&key) {
          let registered = &self.node(id).full_path;
          if *registered != candidate {
            return Err(GraphError::KeyConflict {
              key,
              registered: registered.clone(),
              requested: candidate,
            });
          }
          return Ok(self.known(id));
        }
        return Ok(Lookup::Created(self.insert(&key, &candidate)));
      }
    }

    Err(GraphError::MissingDependency {
      dependency: identifier.to_string(),
      from: self.node(parent).relative_path.clone(),
    })
  }

  /// A registered node still waiting for expansion gets a frame of its own.
  fn known(&self, id: NodeId) -> Lookup {
    if self.node(id).expanded {
      Lookup::Existing(id)
    } else {
      Lookup::Created(id)
    }
  }

  /// Add the edge `parent -> dep` unless `dep` is `parent` or leads back to it.
  fn attach(&mut self, parent: NodeId, dep: NodeId) -> Result<(), GraphError> {
    if has_path_connecting(&self.graph, dep.0, parent.0, None) {
      return Err(GraphError::CircularDependency {
        file: self.node(parent).relative_path.clone(),
        through: self.node(dep).relative_path.clone(),
      });
    }
    self.graph.add_edge(parent.0, dep.0, ());
    Ok(())
  }
}

/// `identifier` resolved against the directory containing `file`.
fn sibling(file: &Path, identifier: &str) -> PathBuf {
  match file.parent() {
    Some(dir) => dir.join(identifier),
    None => PathBuf::from(identifier),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::MemoryProbe;
  use std::cell::RefCell;
  use std::collections::BTreeMap;

  /// Extractor backed by a fixed map from full path to identifiers, counting calls.
  struct MapExtractor {
    deps: BTreeMap<PathBuf, Vec<String>>,
    calls: RefCell<BTreeMap<PathBuf, usize>>,
  }

  impl MapExtractor {
    fn new(entries: &[(&str, &[&str])]) -> Self {
      Self {
        deps: entries
          .iter()
          .map(|(path, deps)| (PathBuf::from(path), deps.iter().map(|d| d.to_string()).collect()))
          .collect(),
        calls: RefCell::new(BTreeMap::new()),
      }
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>, GraphError> {
      *self.calls.borrow_mut().entry(path.to_path_buf()).or_default() += 1;
      Ok(self.deps.get(path).cloned().unwrap_or_default())
    }

    fn calls(&self, path: &str) -> usize {
      self.calls.borrow().get(Path::new(path)).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
      self.calls.borrow().values().sum()
    }
  }

  fn search(dirs: &[&str]) -> SearchPath {
    SearchPath::new(dirs.iter().map(PathBuf::from).collect(), false)
  }

  #[test]
  fn resolves_transitive_chain() {
    let probe = MemoryProbe::with_files(&["/src/a.less", "/src/b.less", "/src/c.less"]);
    let extractor = MapExtractor::new(&[("/src/a.less", &["b.less"]), ("/src/b.less", &["c.less"])]);
    let mut registry = NodeRegistry::new();

    let a = registry
      .get_or_resolve(
        "a.less",
        Path::new("/src/a.less"),
        &search(&["/src"]),
        &mut |p| extractor.extract(p),
        &probe,
      )
      .unwrap();

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.dependency_paths(a), vec!["b.less"]);
    let b = registry.get("b.less").unwrap();
    assert_eq!(registry.dependency_paths(b), vec!["c.less"]);
    assert_eq!(registry.node(b).full_path(), Path::new("/src/b.less"));
  }

  #[test]
  fn already_resolved_paths_are_not_extracted_again() {
    let probe = MemoryProbe::with_files(&["/src/a.less", "/src/b.less", "/src/shared.less"]);
    let extractor = MapExtractor::new(&[
      ("/src/a.less", &["shared.less"]),
      ("/src/b.less", &["shared.less"]),
    ]);
    let mut registry = NodeRegistry::new();
    let paths = search(&["/src"]);
    let mut extract = |p: &Path| extractor.extract(p);

    registry
      .get_or_resolve("a.less", Path::new("/src/a.less"), &paths, &mut extract, &probe)
      .unwrap();
    registry
      .get_or_resolve("b.less", Path::new("/src/b.less"), &paths, &mut extract, &probe)
      .unwrap();
    registry
      .get_or_resolve("shared.less", Path::new("/src/shared.less"), &paths, &mut extract, &probe)
      .unwrap();
    registry
      .get_or_resolve("a.less", Path::new("/src/a.less"), &paths, &mut extract, &probe)
      .unwrap();

    assert_eq!(extractor.calls("/src/shared.less"), 1);
    assert_eq!(extractor.calls("/src/a.less"), 1);
    assert_eq!(extractor.total_calls(), 3);
    assert_eq!(registry.len(), 3);
  }

  #[test]
  fn include_dirs_are_searched_in_order() {
    let probe = MemoryProbe::with_files(&["/src/main.less", "/first/vars.less", "/second/vars.less"]);
    let extractor = MapExtractor::new(&[("/src/main.less", &["vars.less"])]);
    let mut registry = NodeRegistry::new();

    registry
      .get_or_resolve(
        "main.less",
        Path::new("/src/main.less"),
        &search(&["/missing", "/first", "/second"]),
        &mut |p| extractor.extract(p),
        &probe,
      )
      .unwrap();

    let vars = registry.get("vars.less").unwrap();
    assert_eq!(registry.node(vars).full_path(), Path::new("/first/vars.less"));
  }

  #[test]
  fn local_include_is_searched_last() {
    let probe = MemoryProbe::with_files(&["/src/pages/home.js", "/src/pages/util.js", "/lib/util.js"]);
    let extractor = MapExtractor::new(&[("/src/pages/home.js", &["util.js"])]);
    let mut registry = NodeRegistry::new();
    let mut paths = search(&[]);
    paths.local_include = true;

    registry
      .get_or_resolve(
        "pages/home.js",
        Path::new("/src/pages/home.js"),
        &paths,
        &mut |p| extractor.extract(p),
        &probe,
      )
      .unwrap();

    let util = registry.get("pages/util.js").unwrap();
    assert_eq!(registry.node(util).full_path(), Path::new("/src/pages/util.js"));

    let mut registry = NodeRegistry::new();
    paths.include_dirs = vec![PathBuf::from("/lib")];
    registry
      .get_or_resolve(
        "pages/home.js",
        Path::new("/src/pages/home.js"),
        &paths,
        &mut |p| extractor.extract(p),
        &probe,
      )
      .unwrap();
    let util = registry.get("util.js").unwrap();
    assert_eq!(registry.node(util).full_path(), Path::new("/lib/util.js"));
  }

  #[test]
  fn registered_candidate_wins_over_include_dir_file() {
    let probe = MemoryProbe::with_files(&["/src/a.txt", "/src/v.txt", "/inc/v.txt"]);
    let extractor = MapExtractor::new(&[("/src/a.txt", &["v.txt"])]);
    let mut registry = NodeRegistry::new();
    let paths = search(&["/inc"]);
    let mut extract = |p: &Path| extractor.extract(p);
    registry.register("a.txt", Path::new("/src/a.txt"));
    registry.register("v.txt", Path::new("/src/v.txt"));

    let a = registry
      .get_or_resolve("a.txt", Path::new("/src/a.txt"), &paths, &mut extract, &probe)
      .unwrap();
    let v = registry
      .get_or_resolve("v.txt", Path::new("/src/v.txt"), &paths, &mut extract, &probe)
      .unwrap();

    assert_eq!(registry.dependencies(a), vec![v]);
    assert_eq!(registry.node(v).full_path(), Path::new("/src/v.txt"));
    assert_eq!(extractor.calls("/src/v.txt"), 1);
    assert_eq!(extractor.calls("/inc/v.txt"), 0);
  }

  #[test]
  fn same_key_for_another_file_is_a_conflict() {
    let probe = MemoryProbe::with_files(&["/src/a.txt", "/src/v.txt", "/inc/v.txt"]);
    let extractor = MapExtractor::new(&[("/src/a.txt", &["v.txt"])]);
    let mut registry = NodeRegistry::new();
    let paths = search(&["/inc"]);
    let mut extract = |p: &Path| extractor.extract(p);

    registry
      .get_or_resolve("a.txt", Path::new("/src/a.txt"), &paths, &mut extract, &probe)
      .unwrap();
    let err = registry
      .get_or_resolve("v.txt", Path::new("/src/v.txt"), &paths, &mut extract, &probe)
      .unwrap_err();

    match err {
      GraphError::KeyConflict {
        key,
        registered,
        requested,
      } => {
        assert_eq!(key, "v.txt");
        assert_eq!(registered, PathBuf::from("/inc/v.txt"));
        assert_eq!(requested, PathBuf::from("/src/v.txt"));
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn missing_dependency_is_reported() {
    let probe = MemoryProbe::with_files(&["/src/a.less"]);
    let extractor = MapExtractor::new(&[("/src/a.less", &["nowhere.less"])]);
    let mut registry = NodeRegistry::new();

    let err = registry
      .get_or_resolve(
        "a.less",
        Path::new("/src/a.less"),
        &search(&["/src"]),
        &mut |p| extractor.extract(p),
        &probe,
      )
      .unwrap_err();

    match err {
      GraphError::MissingDependency { dependency, from } => {
        assert_eq!(dependency, "nowhere.less");
        assert_eq!(from, "a.less");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn two_node_cycle_names_both_files() {
    let probe = MemoryProbe::with_files(&["/src/a.less", "/src/b.less"]);
    let extractor = MapExtractor::new(&[("/src/a.less", &["b.less"]), ("/src/b.less", &["a.less"])]);
    let mut registry = NodeRegistry::new();

    let err = registry
      .get_or_resolve(
        "a.less",
        Path::new("/src/a.less"),
        &search(&["/src"]),
        &mut |p| extractor.extract(p),
        &probe,
      )
      .unwrap_err();

    match err {
      GraphError::CircularDependency { file, through } => {
        assert_eq!(file, "a.less");
        assert_eq!(through, "b.less");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn self_import_is_a_cycle() {
    let probe = MemoryProbe::with_files(&["/src/a.less"]);
    let extractor = MapExtractor::new(&[("/src/a.less", &["a.less"])]);
    let mut registry = NodeRegistry::new();

    let err = registry
      .get_or_resolve(
        "a.less",
        Path::new("/src/a.less"),
        &search(&["/src"]),
        &mut |p| extractor.extract(p),
        &probe,
      )
      .unwrap_err();

    assert!(matches!(err, GraphError::CircularDependency { .. }));
  }

  #[test]
  fn cycle_behind_second_dependency_is_found() {
    // a -> [x, b], b -> c, c -> a: the cycle sits behind a's second import.
    let probe = MemoryProbe::with_files(&["/s/a", "/s/x", "/s/b", "/s/c"]);
    let extractor = MapExtractor::new(&[("/s/a", &["x", "b"]), ("/s/b", &["c"]), ("/s/c", &["a"])]);
    let mut registry = NodeRegistry::new();

    let err = registry
      .get_or_resolve("a", Path::new("/s/a"), &search(&["/s"]), &mut |p| extractor.extract(p), &probe)
      .unwrap_err();

    match err {
      GraphError::CircularDependency { file, through } => {
        assert_eq!(file, "a");
        assert_eq!(through, "b");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn diamond_is_not_a_cycle() {
    let probe = MemoryProbe::with_files(&["/s/top", "/s/left", "/s/right", "/s/base"]);
    let extractor = MapExtractor::new(&[
      ("/s/top", &["left", "right"]),
      ("/s/left", &["base"]),
      ("/s/right", &["base"]),
    ]);
    let mut registry = NodeRegistry::new();

    let top = registry
      .get_or_resolve("top", Path::new("/s/top"), &search(&["/s"]), &mut |p| extractor.extract(p), &probe)
      .unwrap();

    assert_eq!(registry.dependency_paths(top), vec!["left", "right"]);
    assert_eq!(extractor.calls("/s/base"), 1);
    assert_eq!(registry.len(), 4);
  }

  #[test]
  fn extractor_errors_propagate() {
    let probe = MemoryProbe::with_files(&["/s/a"]);
    let mut registry = NodeRegistry::new();

    let err = registry
      .get_or_resolve(
        "a",
        Path::new("/s/a"),
        &search(&[]),
        &mut |p| {
          Err(GraphError::Extract {
            path: p.to_path_buf(),
            message: "unreadable".to_string(),
          })
        },
        &probe,
      )
      .unwrap_err();

    assert!(err.to_string().contains("unreadable"));
  }
}
