//! Per-function block-building protocol (§4.1.2-4.1.3).

use std::collections::HashMap;

use crate::ir::{Block, BlockId, Function, IrInst, IrType, Phi, Terminator, VarId};

/// One entry per lifecycle-tracked local: its alloca and the struct type
/// whose destructor applies to it.
#[derive(Debug, Clone)]
pub struct ScopeEntry {
    pub name: String,
    pub alloca: crate::ir::VarId,
    pub struct_name: String,
}

pub struct FunctionBuilder {
    pub func: Function,
    next_block_id: u32,
    block_label_counters: HashMap<&'static str, u32>,
    current_label_for: HashMap<BlockId, String>,
    current_block: Option<BlockId>,
    current_label: String,
    buffer: Vec<IrInst>,
    pending_terminator: Option<Terminator>,
    pending_phis: Vec<Phi>,
    /// Declared type of every `stack_alloc` emitted so far, recorded as
    /// each one is emitted rather than re-derived by scanning sealed
    /// blocks, so a read of a `let` in the same not-yet-sealed block as
    /// its alloca still resolves (`alloca_type`).
    alloca_types: HashMap<VarId, IrType>,
}

impl FunctionBuilder {
    pub fn new(func: Function) -> Self {
        FunctionBuilder {
            func,
            next_block_id: 0,
            block_label_counters: HashMap::new(),
            current_label_for: HashMap::new(),
            current_block: None,
            current_label: String::new(),
            buffer: Vec::new(),
            pending_terminator: None,
            pending_phis: Vec::new(),
            alloca_types: HashMap::new(),
        }
    }

    pub fn fresh_var(&mut self) -> crate::ir::VarId {
        self.func.fresh_var()
    }

    /// A fresh block id whose label is prefixed by `category` (e.g.
    /// `if.then`, `while.header`) and suffixed with a per-category
    /// counter, guaranteeing uniqueness (§3.2).
    pub fn fresh_block_id(&mut self, category: &'static str) -> BlockId {
        let counter = self.block_label_counters.entry(category).or_insert(0);
        let label = format!("{category}.{counter}");
        *counter += 1;
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.current_label_for.insert(id, label);
        id
    }

    pub fn start_block(&mut self, id: BlockId) {
        debug_assert!(self.current_block.is_none(), "previous block not sealed");
        self.current_block = Some(id);
        self.current_label = self.current_label_for.get(&id).cloned().unwrap_or_else(|| id.to_string());
        self.buffer.clear();
        self.pending_terminator = None;
        self.pending_phis.clear();
    }

    pub fn emit(&mut self, inst: IrInst) {
        if let IrInst::StackAlloc { dest, ty } = &inst {
            self.alloca_types.insert(*dest, ty.clone());
        }
        self.buffer.push(inst);
    }

    /// The type a `stack_alloc` declared its destination with, regardless
    /// of whether that alloca's block has been sealed yet.
    pub fn alloca_type(&self, alloca: VarId) -> Option<IrType> {
        self.alloca_types.get(&alloca).cloned()
    }

    pub fn add_phi(&mut self, phi: Phi) {
        self.pending_phis.push(phi);
    }

    /// Idempotent: the first terminator set for a block wins.
    pub fn set_terminator(&mut self, term: Terminator) {
        if self.pending_terminator.is_none() {
            self.pending_terminator = Some(term);
        }
    }

    pub fn has_terminator(&self) -> bool {
        self.pending_terminator.is_some()
    }

    pub fn current_block_id(&self) -> Option<BlockId> {
        self.current_block
    }

    /// Flushes the current buffer and pending terminator (defaulting to
    /// `unreachable`) into a completed `Block`.
    pub fn seal_current_block(&mut self) {
        let Some(id) = self.current_block.take() else {
            return;
        };
        let block = Block {
            id,
            label: std::mem::take(&mut self.current_label),
            phis: std::mem::take(&mut self.pending_phis),
            instructions: std::mem::take(&mut self.buffer),
            terminator: self.pending_terminator.take().unwrap_or(Terminator::Unreachable),
        };
        self.func.blocks.push(block);
    }

    pub fn finish(mut self) -> Function {
        self.seal_current_block();
        self.func
    }
}
