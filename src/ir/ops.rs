//! Operator inventories for unary, binary, and host expressions.

/// Unary operators. Typed operators (counts, float math) apply to one type
/// class; conversions carry their target type on the expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Clz,
    Ctz,
    Popcnt,
    EqZ,
    Neg,
    Abs,
    Ceil,
    Floor,
    Trunc,
    Nearest,
    Sqrt,
    ExtendSInt32,
    ExtendUInt32,
    WrapInt64,
    TruncSFloat32,
    TruncUFloat32,
    TruncSFloat64,
    TruncUFloat64,
    ConvertSInt32,
    ConvertUInt32,
    ConvertSInt64,
    ConvertUInt64,
    PromoteFloat32,
    DemoteFloat64,
    ReinterpretFloat,
    ReinterpretInt,
}

impl UnaryOp {
    /// Float-to-integer truncations trap on NaN and out-of-range inputs.
    pub fn may_trap(self) -> bool {
        matches!(
            self,
            UnaryOp::TruncSFloat32
                | UnaryOp::TruncUFloat32
                | UnaryOp::TruncSFloat64
                | UnaryOp::TruncUFloat64
        )
    }
}

/// Binary operators. The operand type class selects the concrete opcode at
/// emit time; relational operators always produce `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    ShrU,
    RotL,
    RotR,
    Div,
    CopySign,
    Min,
    Max,
    Eq,
    Ne,
    LtS,
    LtU,
    LeS,
    LeU,
    GtS,
    GtU,
    GeS,
    GeU,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Comparison operators produce an `i32` regardless of operand type.
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::LtS
                | BinaryOp::LtU
                | BinaryOp::LeS
                | BinaryOp::LeU
                | BinaryOp::GtS
                | BinaryOp::GtU
                | BinaryOp::GeS
                | BinaryOp::GeU
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }

    /// Integer division and remainder trap on a zero divisor.
    pub fn may_trap(self) -> bool {
        matches!(
            self,
            BinaryOp::DivS | BinaryOp::DivU | BinaryOp::RemS | BinaryOp::RemU
        )
    }
}

/// Host environment operators: linear-memory query and growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    CurrentMemory,
    GrowMemory,
}
