//! Expression tree nodes and the arena that owns them.
//!
//! Every expression a function contains lives in that function's
//! [`ExprArena`] and is addressed by [`ExprId`]. Rewriters never free nodes;
//! they overwrite arena slots in place, which is what lets a pass splice a
//! replacement into a tree position without touching the parent. Orphaned
//! slots stay behind as garbage until the function is dropped.

use std::mem;
use std::ops::{Index, IndexMut};

use crate::ir::ops::{BinaryOp, HostOp, UnaryOp};
use crate::ir::ty::{Literal, ValueType};

/// Label or symbol name. Labels are generated (`label$N`); function, import,
/// and export names come from the module.
pub type Name = String;

/// Dense index of a local variable within a function.
pub type LocalIndex = u32;

/// Handle to an expression slot inside an [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(u32);

impl ExprId {
    /// Creates a handle from a raw slot index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw slot index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One expression node: a tagged variant plus its computed value type.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: ValueType,
}

/// The tagged variant set of the expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Nop,
    Unreachable,
    Block {
        name: Option<Name>,
        list: Vec<ExprId>,
    },
    If {
        condition: ExprId,
        if_true: ExprId,
        if_false: Option<ExprId>,
    },
    Loop {
        /// Exit label; breaks to it leave the loop.
        out: Option<Name>,
        /// Entry label; breaks to it continue from the top.
        entry: Option<Name>,
        body: ExprId,
    },
    Break {
        name: Name,
        value: Option<ExprId>,
        condition: Option<ExprId>,
    },
    Switch {
        value: Option<ExprId>,
        condition: ExprId,
        targets: Vec<Name>,
        default: Name,
    },
    Call {
        target: Name,
        operands: Vec<ExprId>,
    },
    CallImport {
        target: Name,
        operands: Vec<ExprId>,
    },
    CallIndirect {
        /// Name of the signature in the module's type list.
        signature: Name,
        operands: Vec<ExprId>,
        target: ExprId,
    },
    GetLocal {
        index: LocalIndex,
    },
    SetLocal {
        index: LocalIndex,
        value: ExprId,
        /// True iff the set's result is consumed by its parent.
        is_tee: bool,
    },
    GetGlobal {
        name: Name,
    },
    SetGlobal {
        name: Name,
        value: ExprId,
    },
    Load {
        bytes: u8,
        signed: bool,
        align: u32,
        offset: u32,
        ptr: ExprId,
    },
    Store {
        bytes: u8,
        align: u32,
        offset: u32,
        ptr: ExprId,
        value: ExprId,
    },
    Const {
        value: Literal,
    },
    Unary {
        op: UnaryOp,
        value: ExprId,
    },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Select {
        if_true: ExprId,
        if_false: ExprId,
        condition: ExprId,
    },
    Drop {
        value: ExprId,
    },
    Return {
        value: Option<ExprId>,
    },
    Host {
        op: HostOp,
        operands: Vec<ExprId>,
    },
}

impl Expr {
    /// Short tag name, used by metrics and diagnostics.
    pub fn tag_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Nop => "nop",
            ExprKind::Unreachable => "unreachable",
            ExprKind::Block { .. } => "block",
            ExprKind::If { .. } => "if",
            ExprKind::Loop { .. } => "loop",
            ExprKind::Break { .. } => "break",
            ExprKind::Switch { .. } => "switch",
            ExprKind::Call { .. } => "call",
            ExprKind::CallImport { .. } => "call_import",
            ExprKind::CallIndirect { .. } => "call_indirect",
            ExprKind::GetLocal { .. } => "get_local",
            ExprKind::SetLocal { .. } => "set_local",
            ExprKind::GetGlobal { .. } => "get_global",
            ExprKind::SetGlobal { .. } => "set_global",
            ExprKind::Load { .. } => "load",
            ExprKind::Store { .. } => "store",
            ExprKind::Const { .. } => "const",
            ExprKind::Unary { .. } => "unary",
            ExprKind::Binary { .. } => "binary",
            ExprKind::Select { .. } => "select",
            ExprKind::Drop { .. } => "drop",
            ExprKind::Return { .. } => "return",
            ExprKind::Host { .. } => "host",
        }
    }

    /// True if this node is a `Nop`.
    pub fn is_nop(&self) -> bool {
        matches!(self.kind, ExprKind::Nop)
    }
}

/// Arena of expression slots for one function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated slots, live and orphaned alike.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no slot has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocates a slot holding `expr` and returns its handle.
    pub fn alloc(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::new(self.nodes.len() as u32);
        self.nodes.push(expr);
        id
    }

    /// Overwrites the slot at `id` with a `Nop`, orphaning its old subtree.
    pub fn nopify(&mut self, id: ExprId) {
        self.nodes[id.index()] = Expr {
            kind: ExprKind::Nop,
            ty: ValueType::None,
        };
    }

    /// Swaps the contents of two slots. The subtrees below each node move
    /// with it, since children are referenced by id.
    pub fn swap(&mut self, a: ExprId, b: ExprId) {
        self.nodes.swap(a.index(), b.index());
    }

    /// Moves the node at `id` into a fresh slot, leaving a `Nop` behind,
    /// and returns the new handle. Used to wrap a tree position in a new
    /// parent: lift the occupant, then write the wrapper into `id`.
    pub fn lift(&mut self, id: ExprId) -> ExprId {
        let expr = mem::replace(
            &mut self.nodes[id.index()],
            Expr {
                kind: ExprKind::Nop,
                ty: ValueType::None,
            },
        );
        self.alloc(expr)
    }

    // -- node builders ------------------------------------------------------

    pub fn nop(&mut self) -> ExprId {
        self.alloc(Expr {
            kind: ExprKind::Nop,
            ty: ValueType::None,
        })
    }

    pub fn unreachable(&mut self) -> ExprId {
        self.alloc(Expr {
            kind: ExprKind::Unreachable,
            ty: ValueType::None,
        })
    }

    pub fn const_(&mut self, value: Literal) -> ExprId {
        self.alloc(Expr {
            ty: value.ty(),
            kind: ExprKind::Const { value },
        })
    }

    pub fn get_local(&mut self, index: LocalIndex, ty: ValueType) -> ExprId {
        self.alloc(Expr {
            kind: ExprKind::GetLocal { index },
            ty,
        })
    }

    pub fn set_local(&mut self, index: LocalIndex, value: ExprId) -> ExprId {
        self.alloc(Expr {
            kind: ExprKind::SetLocal {
                index,
                value,
                is_tee: false,
            },
            ty: ValueType::None,
        })
    }

    pub fn tee_local(&mut self, index: LocalIndex, value: ExprId) -> ExprId {
        let ty = self[value].ty;
        self.alloc(Expr {
            kind: ExprKind::SetLocal {
                index,
                value,
                is_tee: true,
            },
            ty,
        })
    }

    pub fn drop_(&mut self, value: ExprId) -> ExprId {
        self.alloc(Expr {
            kind: ExprKind::Drop { value },
            ty: ValueType::None,
        })
    }

    pub fn block(&mut self, name: Option<Name>, list: Vec<ExprId>) -> ExprId {
        let id = self.alloc(Expr {
            kind: ExprKind::Block { name, list },
            ty: ValueType::None,
        });
        self.finalize(id);
        id
    }

    /// Builds an unnamed two-element block, the canonical statement sequence.
    pub fn sequence(&mut self, first: ExprId, second: ExprId) -> ExprId {
        self.block(None, vec![first, second])
    }

    /// Returns `inner` if it already is a block, otherwise wraps it in an
    /// unnamed single-element block.
    pub fn blockify(&mut self, inner: ExprId) -> ExprId {
        if matches!(self[inner].kind, ExprKind::Block { .. }) {
            inner
        } else {
            self.block(None, vec![inner])
        }
    }

    // -- finalize -----------------------------------------------------------

    /// Recomputes the value type of a composite node from its children.
    /// Leaf and fixed-type nodes are left untouched.
    pub fn finalize(&mut self, id: ExprId) {
        let ty = match &self.nodes[id.index()].kind {
            ExprKind::Block { list, .. } => match list.last() {
                Some(&last) => self[last].ty,
                None => ValueType::None,
            },
            ExprKind::If {
                if_true, if_false, ..
            } => match if_false {
                Some(if_false) => {
                    let t = self[*if_true].ty;
                    if t == self[*if_false].ty {
                        t
                    } else {
                        ValueType::None
                    }
                }
                None => ValueType::None,
            },
            ExprKind::Loop { body, .. } => self[*body].ty,
            ExprKind::Break {
                value, condition, ..
            } => match (value, condition) {
                (Some(value), None) => self[*value].ty,
                _ => ValueType::None,
            },
            ExprKind::SetLocal { value, is_tee, .. } => {
                if *is_tee {
                    self[*value].ty
                } else {
                    ValueType::None
                }
            }
            ExprKind::Select { if_true, .. } => self[*if_true].ty,
            ExprKind::Unary { op, value } => match op {
                UnaryOp::EqZ => ValueType::I32,
                UnaryOp::Clz
                | UnaryOp::Ctz
                | UnaryOp::Popcnt
                | UnaryOp::Neg
                | UnaryOp::Abs
                | UnaryOp::Ceil
                | UnaryOp::Floor
                | UnaryOp::Trunc
                | UnaryOp::Nearest
                | UnaryOp::Sqrt => self[*value].ty,
                // conversions keep their constructed target type
                _ => return,
            },
            ExprKind::Binary { op, left, .. } => {
                if op.is_relational() {
                    ValueType::I32
                } else {
                    self[*left].ty
                }
            }
            ExprKind::Host { op, .. } => match op {
                HostOp::CurrentMemory | HostOp::GrowMemory => ValueType::I32,
            },
            _ => return,
        };
        self.nodes[id.index()].ty = ty;
    }
}

impl Index<ExprId> for ExprArena {
    type Output = Expr;

    fn index(&self, id: ExprId) -> &Expr {
        &self.nodes[id.index()]
    }
}

impl IndexMut<ExprId> for ExprArena {
    fn index_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.nodes[id.index()]
    }
}
