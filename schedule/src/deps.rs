//! Transitive-dependency minimization.

use std::collections::{BTreeSet, HashMap};

use strata_ir::{Block, StmtId};

/// Shrink every statement's deps to the transitively-minimal frontier.
///
/// Scheduling emits conservative edges (and occasional duplicates); a single
/// forward pass accumulates each statement's transitive hull and drops any
/// direct dep already implied by another.
pub fn rebuild_transitive_deps(block: &mut Block) {
    let mut tdeps: HashMap<StmtId, BTreeSet<StmtId>> = HashMap::with_capacity(block.stmts.len());

    let ids: Vec<StmtId> = block.stmts.ids().collect();
    for sid in ids {
        let direct: BTreeSet<StmtId> = block.stmts.get(sid).deps.iter().copied().collect();
        let mut hull = BTreeSet::new();
        for dep in &direct {
            if let Some(reachable) = tdeps.get(dep) {
                hull.extend(reachable.iter().copied());
            }
        }
        block.stmts.get_mut(sid).deps = direct.difference(&hull).copied().collect();
        hull.extend(direct);
        tdeps.insert(sid, hull);
    }
}
