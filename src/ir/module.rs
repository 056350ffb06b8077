//! Module containers: signatures, imports, exports, functions, memory.

use crate::ir::error::IrError;
use crate::ir::expr::{ExprArena, ExprId, LocalIndex, Name};
use crate::ir::ty::ValueType;

/// A function-type signature: parameter types plus an optional single result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionType {
    pub name: Name,
    pub params: Vec<ValueType>,
    pub result: ValueType,
}

/// An import binding an external `module.base` pair to a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub name: Name,
    pub module: Name,
    pub base: Name,
    /// Signature name in the module's type list.
    pub ty: Name,
}

/// An export exposing a function under an external name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: Name,
    /// Name of the exported function.
    pub value: Name,
}

/// One data segment: an absolute byte offset and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub offset: u32,
    pub data: Vec<u8>,
}

/// Linear memory descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Memory {
    pub initial: u32,
    pub max: u32,
    pub export_name: Option<Name>,
    pub segments: Vec<Segment>,
}

/// A function definition. The body lives in the function's own arena, so
/// function-parallel passes mutate disjoint storage by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Name,
    /// Signature name in the module's type list.
    pub ty: Name,
    pub params: Vec<(Name, ValueType)>,
    pub vars: Vec<(Name, ValueType)>,
    pub result: ValueType,
    pub arena: ExprArena,
    pub body: ExprId,
}

impl Function {
    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn num_locals(&self) -> usize {
        self.params.len() + self.vars.len()
    }

    /// Index of the first non-parameter local.
    pub fn var_index_base(&self) -> LocalIndex {
        self.params.len() as LocalIndex
    }

    /// Declared type of a local; params occupy the low indices.
    pub fn local_type(&self, index: LocalIndex) -> ValueType {
        let index = index as usize;
        if index < self.params.len() {
            self.params[index].1
        } else {
            self.vars[index - self.params.len()].1
        }
    }

    /// Appends a fresh local of `ty` and returns its index.
    pub fn add_var(&mut self, ty: ValueType) -> LocalIndex {
        let index = self.num_locals() as LocalIndex;
        self.vars.push((format!("var${}", self.vars.len()), ty));
        index
    }
}

/// A whole module: an ordered function list plus its supporting tables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub function_types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    pub exports: Vec<Export>,
    pub functions: Vec<Function>,
    /// Ordered function table; entries are callable by index.
    pub table: Vec<Name>,
    pub memory: Memory,
    pub start: Option<Name>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function, enforcing name uniqueness.
    pub fn add_function(&mut self, function: Function) -> Result<(), IrError> {
        if self.functions.iter().any(|f| f.name == function.name) {
            return Err(IrError::duplicate_name(
                "function name is already defined",
                function.name,
            ));
        }
        self.functions.push(function);
        Ok(())
    }

    /// Adds an import, enforcing name uniqueness.
    pub fn add_import(&mut self, import: Import) -> Result<(), IrError> {
        if self.imports.iter().any(|i| i.name == import.name) {
            return Err(IrError::duplicate_name(
                "import name is already defined",
                import.name,
            ));
        }
        self.imports.push(import);
        Ok(())
    }

    /// Adds a function type, enforcing name uniqueness.
    pub fn add_function_type(&mut self, ty: FunctionType) -> Result<(), IrError> {
        if self.function_types.iter().any(|t| t.name == ty.name) {
            return Err(IrError::duplicate_name(
                "function type name is already defined",
                ty.name,
            ));
        }
        self.function_types.push(ty);
        Ok(())
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Position of a function in the ordered list.
    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    pub fn get_import(&self, name: &str) -> Option<&Import> {
        self.imports.iter().find(|i| i.name == name)
    }

    /// Position of an import in the ordered list.
    pub fn import_index(&self, name: &str) -> Option<usize> {
        self.imports.iter().position(|i| i.name == name)
    }

    pub fn get_function_type(&self, name: &str) -> Option<&FunctionType> {
        self.function_types.iter().find(|t| t.name == name)
    }

    /// Position of a signature in the ordered type list.
    pub fn function_type_index(&self, name: &str) -> Option<usize> {
        self.function_types.iter().position(|t| t.name == name)
    }
}
