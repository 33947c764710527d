//! Effective modification times and the freshness rule.
//!
//! The effective modification time of a file is the newest modification
//! time across the file and its whole dependency closure. It is computed
//! with a petgraph post-order walk and memoized on each node, so a file
//! shared by many parents is stat'ed once per run.

use std::time::SystemTime;

use petgraph::visit::DfsPostOrder;

use super::SourceProbe;
use super::graph::{NodeId, NodeRegistry};
use super::types::GraphError;

impl NodeRegistry {
  /// Compute (or return the memoized) effective modification time of `id`.
  ///
  /// # Errors
  ///
  /// Returns [`GraphError::Vanished`] when a file of the closure no longer
  /// exists, or the probe's own error.
  pub fn effective_mod_time<P>(&mut self, id: NodeId, probe: &P) -> Result<SystemTime, GraphError>
  where
    P: SourceProbe + ?Sized,
  {
    if let Some(time) = self.node(id).effective_mod_time {
      return Ok(time);
    }

    // Post-order: every dependency is dated before the files that import it.
    let mut walk = DfsPostOrder::new(&self.graph, id.0);
    while let Some(index) = walk.next(&self.graph) {
      let current = NodeId(index);
      let node = self.node(current);
      if node.effective_mod_time.is_some() {
        continue;
      }

      let own = probe
        .modified(node.full_path())?
        .ok_or_else(|| GraphError::Vanished(node.full_path().to_path_buf()))?;
      let newest = self
        .dependencies(current)
        .into_iter()
        .filter_map(|dep| self.node(dep).effective_mod_time)
        .fold(own, SystemTime::max);
      self.node_mut(current).effective_mod_time = Some(newest);
    }

    self
      .node(id)
      .effective_mod_time
      .ok_or_else(|| GraphError::Vanished(self.node(id).full_path().to_path_buf()))
  }
}

/// Whether an output must be regenerated.
///
/// Stale when the output does not exist or is strictly older than the
/// source's effective modification time. Equal times are fresh.
pub fn is_stale(effective: SystemTime, output: Option<SystemTime>) -> bool {
  match output {
    None => true,
    Some(output) => effective > output,
  }
}
