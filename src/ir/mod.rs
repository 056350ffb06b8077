//! Expression-tree IR: data model, analyses, and traversal.

pub mod count;
pub mod effects;
pub mod error;
pub mod expr;
pub mod iteration;
pub mod module;
pub mod ops;
pub mod ty;
pub mod used;
pub mod visit;

pub use count::{GetLocalCounter, LocalAnalyzer};
pub use effects::EffectSummary;
pub use error::{IrError, IrErrorKind};
pub use expr::{Expr, ExprArena, ExprId, ExprKind, LocalIndex, Name};
pub use iteration::{operand, operand_count, operand_mut, Operands};
pub use module::{Export, Function, FunctionType, Import, Memory, Module, Segment};
pub use ops::{BinaryOp, HostOp, UnaryOp};
pub use ty::{Literal, ValueType};
pub use used::is_result_used;
pub use visit::{has_break_targeting, walk, walk_linear, walk_ref, LinearVisitor, Visitor};
