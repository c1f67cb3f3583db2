//! Kei mid-end intermediate representation.
//!
//! A typed, explicit-control-flow instruction set sitting between the
//! typed AST and the (out of scope) C emitter. See the component design
//! notes for the full instruction/terminator catalogue; this module only
//! defines the data model (§3), not the passes that build or rewrite it.

use std::fmt;

/// A closed sum over every type the mid-end knows how to represent.
/// Struct and enum field order is declaration order and is load-bearing:
/// `field_ptr` offsets and tagged-union `data.<Variant>.<field>` paths
/// depend on it.
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    Int { bits: IntBits, signed: bool },
    Float { bits: FloatBits },
    Bool,
    Void,
    /// Opaque to the IR; layout is the runtime's concern.
    String,
    Ptr(Box<IrType>),
    Struct(StructTy),
    Enum(EnumTy),
    Array { element: Box<IrType>, length: u64 },
    Function { params: Vec<IrType>, ret: Box<IrType> },
}

/// Integer bit widths the IR supports. Restricted to this closed set per
/// the data model invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntBits {
    B8 = 8,
    B16 = 16,
    B32 = 32,
    B64 = 64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatBits {
    B32 = 32,
    B64 = 64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructTy {
    pub name: String,
    /// Declaration order; addresses are computed by walking this in
    /// order, so it must never be resorted.
    pub fields: Vec<(String, IrType)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumTy {
    pub name: String,
    pub variants: Vec<EnumVariantTy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariantTy {
    pub name: String,
    pub fields: Vec<(String, IrType)>,
    /// Explicit discriminant if the source gave one; otherwise the
    /// variant's declaration index is used.
    pub discriminant: Option<i64>,
}

impl EnumTy {
    /// A tagged-union enum has at least one variant carrying fields;
    /// otherwise it is a scalar enum represented as a bare `int32`.
    pub fn is_tagged_union(&self) -> bool {
        self.variants.iter().any(|v| !v.fields.is_empty())
    }

    /// The effective discriminant of a variant: its explicit value, or
    /// its declaration index when none was given.
    pub fn discriminant_of(&self, variant: &str) -> Option<i64> {
        self.variants.iter().position(|v| v.name == variant).map(|idx| {
            self.variants[idx].discriminant.unwrap_or(idx as i64)
        })
    }
}

impl IrType {
    pub fn i32() -> Self {
        IrType::Int { bits: IntBits::B32, signed: true }
    }

    pub fn ptr(pointee: IrType) -> Self {
        IrType::Ptr(Box::new(pointee))
    }

    /// The discriminant type of any enum (tagged or scalar) is always
    /// `int32` per the tagged-union layout rule.
    pub fn enum_tag_ty() -> Self {
        IrType::i32()
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Int { bits, signed } => {
                write!(f, "{}{}", if *signed { "i" } else { "u" }, *bits as u32)
            }
            IrType::Float { bits } => write!(f, "f{}", *bits as u32),
            IrType::Bool => write!(f, "bool"),
            IrType::Void => write!(f, "void"),
            IrType::String => write!(f, "string"),
            IrType::Ptr(inner) => write!(f, "ptr<{inner}>"),
            IrType::Struct(s) => write!(f, "{}", s.name),
            IrType::Enum(e) => write!(f, "{}", e.name),
            IrType::Array { element, length } => write!(f, "array<{element},{length}>"),
            IrType::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, "):{ret}")
            }
        }
    }
}

/// An opaque SSA name, unique within its owning function across every
/// pass that produces new values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// An opaque basic-block handle. Blocks additionally carry a human-
/// readable `label` (e.g. `if.then.3`) used only by the printer; `BlockId`
/// equality, not the label, is what graph algorithms key off of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A value operand: either a previously-defined SSA name or a literal
/// constant embedded directly in the instruction stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var(VarId),
    ConstInt(i64),
    ConstFloat(u64), // bit pattern, to keep `Operand: Eq`-friendly
    ConstBool(bool),
    ConstString(String),
    ConstNull,
    /// A direct reference to a module-level global or extern by name,
    /// for identifiers that resolve to neither a local alloca nor a
    /// function parameter.
    Global(String),
    /// Placeholder inserted by mem2reg when a φ edge has no reaching
    /// definition (dead code on a well-typed program, per the design
    /// notes' "undef sentinel").
    Undef,
}

impl Operand {
    pub fn var(self) -> Option<VarId> {
        match self {
            Operand::Var(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{v}"),
            Operand::ConstInt(n) => write!(f, "{n}"),
            Operand::ConstFloat(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Operand::ConstBool(b) => write!(f, "{b}"),
            Operand::ConstString(s) => write!(f, "{s:?}"),
            Operand::ConstNull => write!(f, "null"),
            Operand::Global(name) => write!(f, "@{name}"),
            Operand::Undef => write!(f, "undef"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::Eq => "eq",
            BinOp::Neq => "neq",
            BinOp::Lt => "lt",
            BinOp::Gt => "gt",
            BinOp::Lte => "lte",
            BinOp::Gte => "gte",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::BitAnd => "bit_and",
            BinOp::BitOr => "bit_or",
            BinOp::BitXor => "bit_xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnOp::Neg => "neg",
            UnOp::Not => "not",
            UnOp::BitNot => "bit_not",
        };
        write!(f, "{s}")
    }
}

/// Diagnostic-check kinds; each lowers to its own `IrInst` variant but
/// they share a message/kind vocabulary for the printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverflowOp {
    Add,
    Sub,
    Mul,
    Neg,
}

/// A single non-terminating IR instruction. Every value-producing
/// variant names its destination explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum IrInst {
    // ---- Memory ----
    StackAlloc { dest: VarId, ty: IrType },
    Load { dest: VarId, ptr: Operand, ty: IrType },
    Store { ptr: Operand, value: Operand },
    FieldPtr { dest: VarId, base: Operand, field: String, ty: IrType },
    IndexPtr { dest: VarId, base: Operand, index: Operand, ty: IrType },

    // ---- Arithmetic / comparison / bitwise ----
    BinOp { dest: VarId, op: BinOp, lhs: Operand, rhs: Operand, ty: IrType },
    UnOp { dest: VarId, op: UnOp, value: Operand, ty: IrType },

    // ---- Constants ----
    ConstInt { dest: VarId, ty: IrType, value: i64 },
    ConstFloat { dest: VarId, ty: IrType, value: f64 },
    ConstBool { dest: VarId, value: bool },
    ConstString { dest: VarId, value: String },
    ConstNull { dest: VarId, ty: IrType },

    // ---- Calls ----
    Call { dest: VarId, func: String, args: Vec<Operand>, ty: IrType },
    CallVoid { func: String, args: Vec<Operand> },
    CallExtern { dest: VarId, func: String, args: Vec<Operand>, ty: IrType },
    CallExternVoid { func: String, args: Vec<Operand> },
    /// `dest = tag`; the success value and error value are written
    /// through `out_ptr`/`err_ptr` by the callee, per the throws
    /// protocol (§4.1.6).
    CallThrows {
        dest: VarId,
        func: String,
        args: Vec<Operand>,
        out_ptr: Operand,
        err_ptr: Operand,
        success_type: IrType,
        error_types: Vec<IrType>,
    },

    // ---- Type ops ----
    Cast { dest: VarId, value: Operand, target_ty: IrType },
    SizeOf { dest: VarId, ty: IrType },

    // ---- Checks ----
    BoundsCheck { index: Operand, length: Operand },
    NullCheck { ptr: Operand },
    AssertCheck { cond: Operand, message: String },
    RequireCheck { cond: Operand, message: String },
    OverflowCheck { op: OverflowOp, lhs: Operand, rhs: Option<Operand>, ty: IrType },

    // ---- Lifecycle ----
    Destroy { value: Operand, struct_name: String },
    OnCopy { value: Operand, struct_name: String },
    Move { dest: VarId, source: Operand, ty: IrType },
}

impl IrInst {
    /// The destination this instruction defines, if any. Used by
    /// mem2reg's address-taken scan and by the printer.
    pub fn dest(&self) -> Option<VarId> {
        use IrInst::*;
        match self {
            StackAlloc { dest, .. }
            | Load { dest, .. }
            | FieldPtr { dest, .. }
            | IndexPtr { dest, .. }
            | BinOp { dest, .. }
            | UnOp { dest, .. }
            | ConstInt { dest, .. }
            | ConstFloat { dest, .. }
            | ConstBool { dest, .. }
            | ConstString { dest, .. }
            | ConstNull { dest, .. }
            | Call { dest, .. }
            | CallExtern { dest, .. }
            | CallThrows { dest, .. }
            | Cast { dest, .. }
            | SizeOf { dest, .. }
            | Move { dest, .. } => Some(*dest),
            Store { .. }
            | CallVoid { .. }
            | CallExternVoid { .. }
            | BoundsCheck { .. }
            | NullCheck { .. }
            | AssertCheck { .. }
            | RequireCheck { .. }
            | OverflowCheck { .. }
            | Destroy { .. }
            | OnCopy { .. } => None,
        }
    }
}

/// A φ-node: selects an incoming value based on which predecessor
/// control arrived from. `incoming` is parallel to the owning block's
/// predecessor list; each entry names the source block explicitly so
/// order need not match predecessor-list order.
#[derive(Debug, Clone, PartialEq)]
pub struct Phi {
    pub dest: VarId,
    pub ty: IrType,
    pub incoming: Vec<(Operand, BlockId)>,
}

/// Exactly one terminator per block.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret { value: Option<Operand> },
    RetVoid,
    Jump { target: BlockId },
    Br { cond: Operand, then_block: BlockId, else_block: BlockId },
    Switch { value: Operand, cases: Vec<(i64, BlockId)>, default: BlockId },
    Unreachable,
}

impl Terminator {
    /// The blocks this terminator may transfer control to, in a stable
    /// order (used by CFG successor computation).
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump { target } => vec![*target],
            Terminator::Br { then_block, else_block, .. } => vec![*then_block, *else_block],
            Terminator::Switch { cases, default, .. } => {
                let mut out: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                out.push(*default);
                out
            }
            Terminator::Ret { .. } | Terminator::RetVoid | Terminator::Unreachable => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    /// Cosmetic, human-readable label (e.g. `if.then.3`); not used for
    /// identity.
    pub label: String,
    pub phis: Vec<Phi>,
    pub instructions: Vec<IrInst>,
    pub terminator: Terminator,
}

impl Block {
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        Self { id, label: label.into(), phis: Vec::new(), instructions: Vec::new(), terminator: Terminator::Unreachable }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, IrType)>,
    pub return_type: IrType,
    pub blocks: Vec<Block>,
    /// Upper bound on `VarId`s allocated to this function so far; fresh
    /// ids are drawn from here and the counter is advanced as passes run.
    pub local_count: u32,
    /// `true` for functions rewritten by the throws protocol: their
    /// surface return type became `int32` and two synthetic pointer
    /// params (`__out`, `__err`) were appended.
    pub is_throws: bool,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<(String, IrType)>, return_type: IrType) -> Self {
        Self { name: name.into(), params, return_type, blocks: Vec::new(), local_count: 0, is_throws: false }
    }

    /// The entry block, by convention the first block in `blocks`.
    pub fn entry(&self) -> BlockId {
        self.blocks[0].id
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    pub fn fresh_var(&mut self) -> VarId {
        let id = VarId(self.local_count);
        self.local_count += 1;
        id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extern {
    pub name: String,
    pub params: Vec<IrType>,
    pub ret: IrType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub name: String,
    pub types: Vec<TypeDecl>,
    pub externs: Vec<Extern>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Pure concatenation of globals/functions/types, with externs
    /// deduplicated by name, per the concurrency & resource model's
    /// module-merging rule.
    pub fn merge(mut self, other: Module) -> Module {
        self.types.extend(other.types);
        self.globals.extend(other.globals);
        self.functions.extend(other.functions);
        for ext in other.externs {
            if !self.externs.iter().any(|e| e.name == ext.name) {
                self.externs.push(ext);
            }
        }
        self
    }
}
