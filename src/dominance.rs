//! Dominance analysis: Cooper-Harvey-Kennedy immediate dominators, the
//! dominator tree, and dominance frontiers (§4.3).
//!
//! This pass has no direct analogue in the teacher's optimizer — it's
//! new machinery mem2reg is built on top of, following the dead-block
//! worklist idiom the teacher's [`crate`]-adjacent dead-code pass uses
//! for graph traversal.

use std::collections::{HashMap, HashSet};

use crate::cfg::Cfg;
use crate::ir::BlockId;

#[derive(Debug, Clone)]
pub struct Dominance {
    pub idom: HashMap<BlockId, BlockId>,
    pub children: HashMap<BlockId, Vec<BlockId>>,
    pub frontier: HashMap<BlockId, HashSet<BlockId>>,
    entry: BlockId,
}

impl Dominance {
    pub fn build(cfg: &Cfg, entry: BlockId) -> Self {
        let idom = compute_idom(cfg, entry);
        let children = dominator_tree_children(&idom, entry);
        let frontier = compute_frontiers(cfg, &idom, entry);
        Dominance { idom, children, frontier, entry }
    }

    pub fn dominance_frontier(&self, block: BlockId) -> HashSet<BlockId> {
        self.frontier.get(&block).cloned().unwrap_or_default()
    }

    pub fn children_of(&self, block: BlockId) -> &[BlockId] {
        self.children.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        if block == self.entry {
            None
        } else {
            self.idom.get(&block).copied()
        }
    }

    /// Pre-order walk of the dominator tree, entry first.
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut order = Vec::new();
        let mut stack = vec![self.entry];
        while let Some(b) = stack.pop() {
            order.push(b);
            // push in reverse so traversal order matches child declaration order
            for &child in self.children_of(b).iter().rev() {
                stack.push(child);
            }
        }
        order
    }
}

fn compute_idom(cfg: &Cfg, entry: BlockId) -> HashMap<BlockId, BlockId> {
    let rpo_index: HashMap<BlockId, usize> =
        cfg.rpo.iter().enumerate().map(|(i, b)| (*b, i)).collect();

    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in cfg.rpo.iter() {
            if b == entry {
                continue;
            }
            let preds = cfg.predecessors(b);
            let mut processed_preds = preds.iter().filter(|p| idom.contains_key(p));
            let Some(&first) = processed_preds.next() else {
                continue;
            };
            let mut new_idom = first;
            for &p in processed_preds {
                new_idom = intersect(new_idom, p, &idom, &rpo_index);
            }
            if idom.get(&b) != Some(&new_idom) {
                idom.insert(b, new_idom);
                changed = true;
            }
        }
    }

    idom
}

fn intersect(
    mut a: BlockId,
    mut b: BlockId,
    idom: &HashMap<BlockId, BlockId>,
    rpo_index: &HashMap<BlockId, usize>,
) -> BlockId {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

fn dominator_tree_children(
    idom: &HashMap<BlockId, BlockId>,
    entry: BlockId,
) -> HashMap<BlockId, Vec<BlockId>> {
    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for (&b, &d) in idom.iter() {
        if b == entry && d == entry {
            continue;
        }
        children.entry(d).or_default().push(b);
    }
    for kids in children.values_mut() {
        kids.sort();
    }
    children
}

fn compute_frontiers(
    cfg: &Cfg,
    idom: &HashMap<BlockId, BlockId>,
    entry: BlockId,
) -> HashMap<BlockId, HashSet<BlockId>> {
    let mut frontier: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();

    for &b in cfg.rpo.iter() {
        let preds = cfg.predecessors(b);
        if preds.len() < 2 {
            continue;
        }
        let Some(&idom_b) = idom.get(&b) else { continue };
        for &p in preds {
            if !idom.contains_key(&p) {
                continue;
            }
            let mut runner = p;
            while runner != idom_b {
                frontier.entry(runner).or_default().insert(b);
                if runner == entry && idom.get(&runner) == Some(&entry) {
                    break;
                }
                let Some(&next) = idom.get(&runner) else { break };
                if next == runner {
                    break;
                }
                runner = next;
            }
        }
    }

    frontier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Block, Function, IrType, Operand, Terminator};

    fn mk_block(id: u32, term: Terminator) -> Block {
        let mut b = Block::new(BlockId(id), format!("bb{id}"));
        b.terminator = term;
        b
    }

    /// entry -> (then | else) -> merge
    fn diamond() -> Function {
        let mut f = Function::new("f", vec![], IrType::Void);
        f.blocks.push(mk_block(0, Terminator::Br {
            cond: Operand::ConstBool(true),
            then_block: BlockId(1),
            else_block: BlockId(2),
        }));
        f.blocks.push(mk_block(1, Terminator::Jump { target: BlockId(3) }));
        f.blocks.push(mk_block(2, Terminator::Jump { target: BlockId(3) }));
        f.blocks.push(mk_block(3, Terminator::RetVoid));
        f
    }

    #[test]
    fn diamond_idom_and_frontier() {
        let f = diamond();
        let cfg = Cfg::build(&f);
        let dom = Dominance::build(&cfg, f.entry());

        assert_eq!(dom.immediate_dominator(BlockId(1)), Some(BlockId(0)));
        assert_eq!(dom.immediate_dominator(BlockId(2)), Some(BlockId(0)));
        assert_eq!(dom.immediate_dominator(BlockId(3)), Some(BlockId(0)));
        assert_eq!(dom.immediate_dominator(BlockId(0)), None);

        assert!(dom.dominance_frontier(BlockId(1)).contains(&BlockId(3)));
        assert!(dom.dominance_frontier(BlockId(2)).contains(&BlockId(3)));
        assert!(dom.dominance_frontier(BlockId(0)).is_empty());
    }

    #[test]
    fn loop_header_is_its_own_frontier() {
        // entry -> header -> body -> header ; header -> end
        let mut f = Function::new("f", vec![], IrType::Void);
        f.blocks.push(mk_block(0, Terminator::Jump { target: BlockId(1) }));
        f.blocks.push(mk_block(1, Terminator::Br {
            cond: Operand::ConstBool(true),
            then_block: BlockId(2),
            else_block: BlockId(3),
        }));
        f.blocks.push(mk_block(2, Terminator::Jump { target: BlockId(1) }));
        f.blocks.push(mk_block(3, Terminator::RetVoid));

        let cfg = Cfg::build(&f);
        let dom = Dominance::build(&cfg, f.entry());

        assert!(dom.dominance_frontier(BlockId(2)).contains(&BlockId(1)));
        assert_eq!(dom.immediate_dominator(BlockId(1)), Some(BlockId(0)));
    }

    #[test]
    fn dominator_tree_children_match_idom() {
        let f = diamond();
        let cfg = Cfg::build(&f);
        let dom = Dominance::build(&cfg, f.entry());
        let mut kids = dom.children_of(BlockId(0)).to_vec();
        kids.sort();
        assert_eq!(kids, vec![BlockId(1), BlockId(2), BlockId(3)]);
    }
}
