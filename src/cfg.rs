//! Control-flow-graph queries over a [`Function`]'s blocks.
//!
//! Nothing here mutates the function; `Cfg::build` snapshots successor
//! and predecessor relations plus a reverse-post-order walk, the shared
//! starting point for the dominance engine and mem2reg.

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, Function};

#[derive(Debug, Clone)]
pub struct Cfg {
    pub succs: HashMap<BlockId, Vec<BlockId>>,
    pub preds: HashMap<BlockId, Vec<BlockId>>,
    /// Reverse post-order from the entry block. Only blocks reachable
    /// from entry appear here.
    pub rpo: Vec<BlockId>,
}

impl Cfg {
    pub fn build(func: &Function) -> Self {
        let mut succs: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();

        for block in &func.blocks {
            preds.entry(block.id).or_default();
            let targets = block.terminator.successors();
            for t in &targets {
                preds.entry(*t).or_default().push(block.id);
            }
            succs.insert(block.id, targets);
        }

        let entry = func.entry();
        let rpo = reverse_post_order(entry, &succs);

        Cfg { succs, preds, rpo }
    }

    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        self.succs.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.preds.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Is this block reachable from the entry block (i.e. does it
    /// appear in `rpo`)?
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.rpo.contains(&block)
    }
}

fn reverse_post_order(entry: BlockId, succs: &HashMap<BlockId, Vec<BlockId>>) -> Vec<BlockId> {
    let mut visited: HashSet<BlockId> = HashSet::new();
    let mut post_order = Vec::new();
    // (block, next successor index to visit) pairs, simulating recursive DFS.
    let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
    visited.insert(entry);

    while let Some(&mut (block, ref mut idx)) = stack.last_mut() {
        let targets = succs.get(&block).map(Vec::as_slice).unwrap_or(&[]);
        if *idx < targets.len() {
            let next = targets[*idx];
            *idx += 1;
            if visited.insert(next) {
                stack.push((next, 0));
            }
        } else {
            post_order.push(block);
            stack.pop();
        }
    }

    post_order.reverse();
    post_order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Block, IrType, Terminator};

    fn block(id: u32, term: Terminator) -> Block {
        let mut b = Block::new(BlockId(id), format!("bb{id}"));
        b.terminator = term;
        b
    }

    #[test]
    fn linear_chain_rpo_is_in_order() {
        let mut f = Function::new("f", vec![], IrType::Void);
        f.blocks.push(block(0, Terminator::Jump { target: BlockId(1) }));
        f.blocks.push(block(1, Terminator::Jump { target: BlockId(2) }));
        f.blocks.push(block(2, Terminator::RetVoid));

        let cfg = Cfg::build(&f);
        assert_eq!(cfg.rpo, vec![BlockId(0), BlockId(1), BlockId(2)]);
        assert_eq!(cfg.predecessors(BlockId(2)), &[BlockId(1)]);
    }

    #[test]
    fn unreachable_block_excluded_from_rpo() {
        let mut f = Function::new("f", vec![], IrType::Void);
        f.blocks.push(block(0, Terminator::RetVoid));
        f.blocks.push(block(1, Terminator::RetVoid)); // never jumped to

        let cfg = Cfg::build(&f);
        assert_eq!(cfg.rpo, vec![BlockId(0)]);
        assert!(!cfg.is_reachable(BlockId(1)));
    }

    #[test]
    fn diamond_preds_and_succs() {
        let mut f = Function::new("f", vec![], IrType::Void);
        f.blocks.push(block(0, Terminator::Br { cond: crate::ir::Operand::ConstBool(true), then_block: BlockId(1), else_block: BlockId(2) }));
        f.blocks.push(block(1, Terminator::Jump { target: BlockId(3) }));
        f.blocks.push(block(2, Terminator::Jump { target: BlockId(3) }));
        f.blocks.push(block(3, Terminator::RetVoid));

        let cfg = Cfg::build(&f);
        let mut preds = cfg.predecessors(BlockId(3)).to_vec();
        preds.sort();
        assert_eq!(preds, vec![BlockId(1), BlockId(2)]);
        assert_eq!(cfg.successors(BlockId(0)).len(), 2);
    }
}
