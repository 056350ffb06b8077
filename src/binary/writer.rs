//! Binary writer: emits a module as the sectioned byte format.
//!
//! Sections are emitted in a fixed order, each keyed by an inline name and a
//! 5-byte size placeholder that is backpatched when the section closes.
//! Expression trees are emitted post-order, operands before opcodes, the way
//! a stack machine executes them. The writer also fills in a table of
//! contents of emitted function bodies, which the function-ordering pass
//! uses to learn encoded sizes.

use log::trace;
use rustc_hash::FxHashMap;

use crate::binary::buffer::Buffer;
use crate::binary::constants::{op, section, value_type_code, MAGIC, TYPE_FORM_BASIC, VERSION};
use crate::binary::error::BinaryError;
use crate::binary::opcode_table::{OpcodeEntry, OpcodeInfo, OpcodeTable};
use crate::ir::expr::{ExprId, ExprKind, LocalIndex, Name};
use crate::ir::module::{Function, Module};
use crate::ir::ops::{BinaryOp, HostOp, UnaryOp};
use crate::ir::ty::{Literal, ValueType};
use crate::ir::visit::has_break_targeting;

/// Where one function body landed in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub name: Name,
    pub offset: usize,
    pub size: usize,
}

/// Offsets and sizes of all emitted function bodies.
#[derive(Debug, Clone, Default)]
pub struct TableOfContents {
    pub functions: Vec<TocEntry>,
}

/// Finished output: the bytes plus the body table of contents.
#[derive(Debug, Clone)]
pub struct BinaryOutput {
    pub bytes: Vec<u8>,
    pub toc: TableOfContents,
}

/// Writes a module in plain form, without an opcode table.
pub fn write_module(module: &Module) -> Result<BinaryOutput, BinaryError> {
    let mut writer = Writer::new(module);
    writer.write()?;
    Ok(writer.finish().0)
}

/// Writes a module twice: a recording pass gathers tuple frequencies, an
/// opcode table is built from them, and a second pass emits the compressed
/// form with the table in its own section.
pub fn write_module_optimized(module: &Module) -> Result<BinaryOutput, BinaryError> {
    let mut pre = Writer::recording(module);
    pre.write()?;
    let info = pre
        .finish()
        .1
        .unwrap_or_default();
    let table = OpcodeTable::build(&info);
    let mut post = Writer::compressing(module, &table);
    post.write()?;
    Ok(post.finish().0)
}

/// The writer proper. One instance per emit pass.
pub struct Writer<'m> {
    module: &'m Module,
    o: Buffer,
    /// Set in the preprocessing pass: records emitted tuples.
    record: Option<OpcodeInfo>,
    /// Set in the postprocessing pass: substitutes assigned bytes.
    table: Option<&'m OpcodeTable>,
    mapped_functions: FxHashMap<Name, u32>,
    mapped_imports: FxHashMap<Name, u32>,
    mapped_types: FxHashMap<Name, u32>,
    /// Local index -> index in the compact [params][i32s][i64s][f32s][f64s]
    /// order, rebuilt per function.
    mapped_locals: FxHashMap<LocalIndex, u32>,
    num_locals_by_type: [u32; 4],
    break_stack: Vec<Option<Name>>,
    toc: TableOfContents,
}

fn type_slot(ty: ValueType) -> Option<usize> {
    match ty {
        ValueType::I32 => Some(0),
        ValueType::I64 => Some(1),
        ValueType::F32 => Some(2),
        ValueType::F64 => Some(3),
        ValueType::None => None,
    }
}

const SLOT_TYPES: [ValueType; 4] = [
    ValueType::I32,
    ValueType::I64,
    ValueType::F32,
    ValueType::F64,
];

fn log2_alignment(align: u32, bytes: u8) -> Result<u32, BinaryError> {
    let align = if align == 0 { u32::from(bytes) } else { align };
    if align.is_power_of_two() {
        Ok(align.trailing_zeros())
    } else {
        Err(BinaryError::invalid_module(format!(
            "alignment {align} is not a power of two"
        )))
    }
}

impl<'m> Writer<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self::with_modes(module, None, None)
    }

    /// A preprocessing writer that records tuple frequencies as it emits.
    pub fn recording(module: &'m Module) -> Self {
        Self::with_modes(module, Some(OpcodeInfo::new()), None)
    }

    /// A postprocessing writer that compresses against a built table.
    pub fn compressing(module: &'m Module, table: &'m OpcodeTable) -> Self {
        Self::with_modes(module, None, Some(table))
    }

    fn with_modes(
        module: &'m Module,
        record: Option<OpcodeInfo>,
        table: Option<&'m OpcodeTable>,
    ) -> Self {
        Self {
            module,
            o: Buffer::new(),
            record,
            table,
            mapped_functions: FxHashMap::default(),
            mapped_imports: FxHashMap::default(),
            mapped_types: FxHashMap::default(),
            mapped_locals: FxHashMap::default(),
            num_locals_by_type: [0; 4],
            break_stack: Vec::new(),
            toc: TableOfContents::default(),
        }
    }

    /// Emits the whole module.
    pub fn write(&mut self) -> Result<(), BinaryError> {
        self.prepare()?;
        self.write_header();
        self.write_signatures();
        self.write_imports()?;
        self.write_function_signatures()?;
        self.write_function_table()?;
        self.write_memory();
        self.write_exports()?;
        self.write_start()?;
        if self.table.is_some() {
            self.write_opcode_table();
        }
        self.write_functions()?;
        self.write_data_segments();
        self.write_names();
        Ok(())
    }

    /// Takes the output, and the recorded opcode info when preprocessing.
    pub fn finish(self) -> (BinaryOutput, Option<OpcodeInfo>) {
        (
            BinaryOutput {
                bytes: self.o.into_vec(),
                toc: self.toc,
            },
            self.record,
        )
    }

    fn prepare(&mut self) -> Result<(), BinaryError> {
        for (i, ty) in self.module.function_types.iter().enumerate() {
            self.mapped_types.insert(ty.name.clone(), i as u32);
        }
        for (i, import) in self.module.imports.iter().enumerate() {
            self.mapped_imports.insert(import.name.clone(), i as u32);
        }
        for (i, func) in self.module.functions.iter().enumerate() {
            if !self.mapped_types.contains_key(&func.ty) {
                return Err(BinaryError::invalid_module(format!(
                    "function {} references unknown signature {}",
                    func.name, func.ty
                )));
            }
            self.mapped_functions.insert(func.name.clone(), i as u32);
        }
        Ok(())
    }

    fn write_header(&mut self) {
        trace!("== write_header at {}", self.o.len());
        self.o.write_u32(MAGIC);
        self.o.write_u32(VERSION);
    }

    fn start_section(&mut self, name: &str) -> usize {
        trace!("== section {name} at {}", self.o.len());
        self.o.write_inline_string(name);
        self.o.write_leb_placeholder()
    }

    fn finish_section(&mut self, start: usize) {
        // the size field does not include its own 5 bytes
        let size = self.o.len() - start - 5;
        self.o.backpatch_u32_leb(start, size as u32);
    }

    fn function_index(&self, name: &str) -> Result<u32, BinaryError> {
        self.mapped_functions.get(name).copied().ok_or_else(|| {
            BinaryError::invalid_module(format!("unknown function name {name}"))
        })
    }

    fn import_index(&self, name: &str) -> Result<u32, BinaryError> {
        self.mapped_imports
            .get(name)
            .copied()
            .ok_or_else(|| BinaryError::invalid_module(format!("unknown import name {name}")))
    }

    fn type_index(&self, name: &str) -> Result<u32, BinaryError> {
        self.mapped_types
            .get(name)
            .copied()
            .ok_or_else(|| BinaryError::invalid_module(format!("unknown signature name {name}")))
    }

    fn write_signatures(&mut self) {
        if self.module.function_types.is_empty() {
            return;
        }
        let start = self.start_section(section::SIGNATURES);
        self.o.write_u32_leb(self.module.function_types.len() as u32);
        for ty in &self.module.function_types {
            self.o.write_u8(TYPE_FORM_BASIC);
            self.o.write_u32_leb(ty.params.len() as u32);
            for param in &ty.params {
                self.o.write_u8(value_type_code(*param));
            }
            if ty.result == ValueType::None {
                self.o.write_u32_leb(0);
            } else {
                self.o.write_u32_leb(1);
                self.o.write_u8(value_type_code(ty.result));
            }
        }
        self.finish_section(start);
    }

    fn write_imports(&mut self) -> Result<(), BinaryError> {
        if self.module.imports.is_empty() {
            return Ok(());
        }
        let start = self.start_section(section::IMPORT_TABLE);
        self.o.write_u32_leb(self.module.imports.len() as u32);
        for import in &self.module.imports {
            let type_index = self.type_index(&import.ty)?;
            self.o.write_u32_leb(type_index);
            self.o.write_inline_string(&import.module);
            self.o.write_inline_string(&import.base);
        }
        self.finish_section(start);
        Ok(())
    }

    fn write_function_signatures(&mut self) -> Result<(), BinaryError> {
        if self.module.functions.is_empty() {
            return Ok(());
        }
        let start = self.start_section(section::FUNCTION_SIGNATURES);
        self.o.write_u32_leb(self.module.functions.len() as u32);
        for func in &self.module.functions {
            let type_index = self.type_index(&func.ty)?;
            self.o.write_u32_leb(type_index);
        }
        self.finish_section(start);
        Ok(())
    }

    fn write_function_table(&mut self) -> Result<(), BinaryError> {
        if self.module.table.is_empty() {
            return Ok(());
        }
        let start = self.start_section(section::FUNCTION_TABLE);
        self.o.write_u32_leb(self.module.table.len() as u32);
        for name in &self.module.table {
            let index = self.function_index(name)?;
            self.o.write_u32_leb(index);
        }
        self.finish_section(start);
        Ok(())
    }

    fn write_memory(&mut self) {
        if self.module.memory.max == 0 {
            return;
        }
        let start = self.start_section(section::MEMORY);
        self.o.write_u32_leb(self.module.memory.initial);
        self.o.write_u32_leb(self.module.memory.max);
        self.o
            .write_u8(u8::from(self.module.memory.export_name.is_some()));
        self.finish_section(start);
    }

    fn write_exports(&mut self) -> Result<(), BinaryError> {
        if self.module.exports.is_empty() {
            return Ok(());
        }
        let start = self.start_section(section::EXPORT_TABLE);
        self.o.write_u32_leb(self.module.exports.len() as u32);
        for export in &self.module.exports {
            let index = self.function_index(&export.value)?;
            self.o.write_u32_leb(index);
            self.o.write_inline_string(&export.name);
        }
        self.finish_section(start);
        Ok(())
    }

    fn write_start(&mut self) -> Result<(), BinaryError> {
        let Some(start_name) = &self.module.start else {
            return Ok(());
        };
        let index = self.function_index(start_name)?;
        let start = self.start_section(section::START);
        self.o.write_u32_leb(index);
        self.finish_section(start);
        Ok(())
    }

    fn write_opcode_table(&mut self) {
        let table = self.table.expect("opcode table section requires a table");
        let start = self.start_section(section::OPCODES);
        self.o.write_u8(table.num_entries() as u8);
        for (code, entry) in table.iter() {
            self.o.write_u8(code);
            self.o.write_u8(entry.op);
            self.o.write_u8(entry.imms.len() as u8);
            for imm in &entry.imms {
                self.o.write_u8(value_type_code(imm.ty()));
                match imm {
                    Literal::I32(v) => self.o.write_s32_leb(*v),
                    Literal::I64(v) => self.o.write_s64_leb(*v),
                    Literal::F32(bits) => self.o.write_u32(*bits),
                    Literal::F64(bits) => self.o.write_u64(*bits),
                }
            }
        }
        self.finish_section(start);
    }

    fn map_locals(&mut self, func: &Function) -> Result<(), BinaryError> {
        self.mapped_locals.clear();
        self.num_locals_by_type = [0; 4];
        for i in 0..func.num_params() {
            self.mapped_locals.insert(i as u32, i as u32);
        }
        for (name, ty) in &func.vars {
            let slot = type_slot(*ty).ok_or_else(|| {
                BinaryError::invalid_module(format!("local {name} has no concrete type"))
            })?;
            self.num_locals_by_type[slot] += 1;
        }
        let base = func.var_index_base();
        let mut seen = [0u32; 4];
        for (j, (_, ty)) in func.vars.iter().enumerate() {
            let slot = type_slot(*ty).expect("checked above");
            let group_start: u32 = self.num_locals_by_type[..slot].iter().sum();
            self.mapped_locals
                .insert(base + j as u32, base + group_start + seen[slot]);
            seen[slot] += 1;
        }
        Ok(())
    }

    fn write_functions(&mut self) -> Result<(), BinaryError> {
        if self.module.functions.is_empty() {
            return Ok(());
        }
        let start = self.start_section(section::FUNCTIONS);
        self.o.write_u32_leb(self.module.functions.len() as u32);
        for func in &self.module.functions {
            trace!("writing function {} at {}", func.name, self.o.len());
            let size_pos = self.o.write_leb_placeholder();
            let body_start = self.o.len();
            self.map_locals(func)?;
            let num_runs = self
                .num_locals_by_type
                .iter()
                .filter(|&&count| count > 0)
                .count();
            self.o.write_u32_leb(num_runs as u32);
            for (slot, ty) in SLOT_TYPES.iter().enumerate() {
                let count = self.num_locals_by_type[slot];
                if count > 0 {
                    self.o.write_u32_leb(count);
                    self.o.write_u8(value_type_code(*ty));
                }
            }
            self.emit_expr(func, func.body)?;
            debug_assert!(self.break_stack.is_empty());
            let size = self.o.len() - body_start;
            self.o.backpatch_u32_leb(size_pos, size as u32);
            self.toc.functions.push(TocEntry {
                name: func.name.clone(),
                offset: body_start,
                size,
            });
        }
        self.finish_section(start);
        Ok(())
    }

    fn write_data_segments(&mut self) {
        let segments: Vec<_> = self
            .module
            .memory
            .segments
            .iter()
            .filter(|segment| !segment.data.is_empty())
            .collect();
        if segments.is_empty() {
            return;
        }
        let start = self.start_section(section::DATA_SEGMENTS);
        self.o.write_u32_leb(segments.len() as u32);
        for segment in segments {
            self.o.write_u32_leb(segment.offset);
            self.o.write_inline_buffer(&segment.data);
        }
        self.finish_section(start);
    }

    fn write_names(&mut self) {
        if self.module.functions.is_empty() {
            return;
        }
        let start = self.start_section(section::NAMES);
        self.o.write_u32_leb(self.module.functions.len() as u32);
        for func in &self.module.functions {
            self.o.write_inline_string(&func.name);
            self.o.write_u32_leb(0);
        }
        self.finish_section(start);
    }

    // -- tuple emission, routed through the opcode-table modes --------------

    fn emit_op(&mut self, code: u8) {
        if let Some(info) = self.record.as_mut() {
            info.record(OpcodeEntry::plain(code), 0);
        }
        self.o.write_u8(code);
    }

    fn emit_entry(&mut self, entry: OpcodeEntry, write_imms: impl FnOnce(&mut Buffer)) {
        if let Some(table) = self.table {
            if let Some(compressed) = table.compressed_code(&entry) {
                self.o.write_u8(compressed);
                return;
            }
        }
        self.o.write_u8(entry.op);
        let before = self.o.len();
        write_imms(&mut self.o);
        let imm_size = self.o.len() - before;
        if let Some(info) = self.record.as_mut() {
            info.record(entry, imm_size);
        }
    }

    fn emit_op_u32(&mut self, code: u8, x: u32) {
        self.emit_entry(OpcodeEntry::with_u32(code, x), |o| o.write_u32_leb(x));
    }

    fn emit_op_s32(&mut self, code: u8, x: i32) {
        self.emit_entry(OpcodeEntry::with_s32(code, x), |o| o.write_s32_leb(x));
    }

    fn emit_op_s64(&mut self, code: u8, x: i64) {
        self.emit_entry(OpcodeEntry::with_s64(code, x), |o| o.write_s64_leb(x));
    }

    fn emit_op_f32(&mut self, code: u8, bits: u32) {
        self.emit_entry(OpcodeEntry::with_f32(code, bits), |o| o.write_u32(bits));
    }

    fn emit_op_f64(&mut self, code: u8, bits: u64) {
        self.emit_entry(OpcodeEntry::with_f64(code, bits), |o| o.write_u64(bits));
    }

    fn emit_op_u32_u32(&mut self, code: u8, x: u32, y: u32) {
        self.emit_entry(OpcodeEntry::with_u32_pair(code, x, y), |o| {
            o.write_u32_leb(x);
            o.write_u32_leb(y);
        });
    }

    // -- expression emission ------------------------------------------------

    fn get_break_index(&self, name: &str) -> Result<u32, BinaryError> {
        for (i, entry) in self.break_stack.iter().enumerate().rev() {
            if entry.as_deref() == Some(name) {
                return Ok((self.break_stack.len() - 1 - i) as u32);
            }
        }
        Err(BinaryError::invalid_module(format!(
            "break target {name} is not in scope"
        )))
    }

    /// Emits a node's contents directly when it is a block whose label no
    /// break targets, avoiding a needless nesting level.
    fn emit_possible_block_contents(
        &mut self,
        func: &Function,
        id: ExprId,
    ) -> Result<(), BinaryError> {
        if let ExprKind::Block { name, list } = &func.arena[id].kind {
            let targeted = match name {
                Some(name) => has_break_targeting(&func.arena, id, name),
                None => false,
            };
            if !targeted {
                for &child in list {
                    self.emit_expr(func, child)?;
                }
                return Ok(());
            }
        }
        self.emit_expr(func, id)
    }

    fn emit_expr(&mut self, func: &Function, id: ExprId) -> Result<(), BinaryError> {
        match &func.arena[id].kind {
            ExprKind::Nop => self.emit_op(op::NOP),
            ExprKind::Unreachable => self.emit_op(op::UNREACHABLE),
            ExprKind::Block { name, list } => {
                self.emit_op(op::BLOCK);
                self.break_stack.push(name.clone());
                for &child in list {
                    self.emit_expr(func, child)?;
                }
                self.break_stack.pop();
                self.emit_op(op::END);
            }
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => {
                let (condition, if_true, if_false) = (*condition, *if_true, *if_false);
                self.emit_expr(func, condition)?;
                self.emit_op(op::IF);
                // arm scopes occupy a break-stack slot that nothing targets
                self.break_stack.push(None);
                self.emit_possible_block_contents(func, if_true)?;
                self.break_stack.pop();
                if let Some(if_false) = if_false {
                    self.emit_op(op::ELSE);
                    self.break_stack.push(None);
                    self.emit_possible_block_contents(func, if_false)?;
                    self.break_stack.pop();
                }
                self.emit_op(op::END);
            }
            ExprKind::Loop { out, entry, body } => {
                let (out, entry, body) = (out.clone(), entry.clone(), *body);
                self.emit_op(op::LOOP);
                self.break_stack.push(out);
                self.break_stack.push(entry);
                self.emit_expr(func, body)?;
                self.break_stack.pop();
                self.break_stack.pop();
                self.emit_op(op::END);
            }
            ExprKind::Break {
                name,
                value,
                condition,
            } => {
                let (name, value, condition) = (name.clone(), *value, *condition);
                if let Some(value) = value {
                    self.emit_expr(func, value)?;
                }
                if let Some(condition) = condition {
                    self.emit_expr(func, condition)?;
                }
                let code = if condition.is_some() { op::BR_IF } else { op::BR };
                let arity = u32::from(value.is_some());
                let depth = self.get_break_index(&name)?;
                self.emit_op_u32_u32(code, arity, depth);
            }
            ExprKind::Switch {
                value,
                condition,
                targets,
                default,
            } => {
                let (value, condition) = (*value, *condition);
                let (targets, default) = (targets.clone(), default.clone());
                if let Some(value) = value {
                    self.emit_expr(func, value)?;
                }
                self.emit_expr(func, condition)?;
                let arity = u32::from(value.is_some());
                self.emit_op_u32_u32(op::TABLE_SWITCH, arity, targets.len() as u32);
                for target in &targets {
                    let depth = self.get_break_index(target)?;
                    self.o.write_u32(depth);
                }
                let depth = self.get_break_index(&default)?;
                self.o.write_u32(depth);
            }
            ExprKind::Call { target, operands } => {
                let (target, operands) = (target.clone(), operands.clone());
                for &operand in &operands {
                    self.emit_expr(func, operand)?;
                }
                let index = self.function_index(&target)?;
                self.emit_op_u32_u32(op::CALL_FUNCTION, operands.len() as u32, index);
            }
            ExprKind::CallImport { target, operands } => {
                let (target, operands) = (target.clone(), operands.clone());
                for &operand in &operands {
                    self.emit_expr(func, operand)?;
                }
                let index = self.import_index(&target)?;
                self.emit_op_u32_u32(op::CALL_IMPORT, operands.len() as u32, index);
            }
            ExprKind::CallIndirect {
                signature,
                operands,
                target,
            } => {
                let (signature, operands, target) = (signature.clone(), operands.clone(), *target);
                self.emit_expr(func, target)?;
                for &operand in &operands {
                    self.emit_expr(func, operand)?;
                }
                let index = self.type_index(&signature)?;
                self.emit_op_u32_u32(op::CALL_INDIRECT, operands.len() as u32, index);
            }
            ExprKind::GetLocal { index } => {
                let mapped = self.mapped_locals[index];
                self.emit_op_u32(op::GET_LOCAL, mapped);
            }
            ExprKind::SetLocal { index, value, .. } => {
                let (index, value) = (*index, *value);
                self.emit_expr(func, value)?;
                let mapped = self.mapped_locals[&index];
                self.emit_op_u32(op::SET_LOCAL, mapped);
            }
            ExprKind::GetGlobal { name } | ExprKind::SetGlobal { name, .. } => {
                return Err(BinaryError::invalid_module(format!(
                    "global {name} cannot be encoded in this format"
                )));
            }
            ExprKind::Load {
                bytes,
                signed,
                align,
                offset,
                ptr,
            } => {
                let (bytes, signed, align, offset, ptr) = (*bytes, *signed, *align, *offset, *ptr);
                self.emit_expr(func, ptr)?;
                let code = load_opcode(func.arena[id].ty, bytes, signed)?;
                let log2 = log2_alignment(align, bytes)?;
                self.emit_op_u32_u32(code, log2, offset);
            }
            ExprKind::Store {
                bytes,
                align,
                offset,
                ptr,
                value,
            } => {
                let (bytes, align, offset, ptr, value) = (*bytes, *align, *offset, *ptr, *value);
                self.emit_expr(func, ptr)?;
                self.emit_expr(func, value)?;
                let code = store_opcode(func.arena[value].ty, bytes)?;
                let log2 = log2_alignment(align, bytes)?;
                self.emit_op_u32_u32(code, log2, offset);
            }
            ExprKind::Const { value } => match value {
                Literal::I32(v) => self.emit_op_s32(op::I32_CONST, *v),
                Literal::I64(v) => self.emit_op_s64(op::I64_CONST, *v),
                Literal::F32(bits) => self.emit_op_f32(op::F32_CONST, *bits),
                Literal::F64(bits) => self.emit_op_f64(op::F64_CONST, *bits),
            },
            ExprKind::Unary { op: unary_op, value } => {
                let (unary_op, value) = (*unary_op, *value);
                self.emit_expr(func, value)?;
                let code = unary_opcode(unary_op, func.arena[id].ty, func.arena[value].ty)?;
                self.emit_op(code);
            }
            ExprKind::Binary {
                op: binary_op,
                left,
                right,
            } => {
                let (binary_op, left, right) = (*binary_op, *left, *right);
                self.emit_expr(func, left)?;
                self.emit_expr(func, right)?;
                let class = if func.arena[left].ty.is_concrete() {
                    func.arena[left].ty
                } else {
                    func.arena[right].ty
                };
                let code = binary_opcode(binary_op, class)?;
                self.emit_op(code);
            }
            ExprKind::Select {
                if_true,
                if_false,
                condition,
            } => {
                let (if_true, if_false, condition) = (*if_true, *if_false, *condition);
                self.emit_expr(func, if_true)?;
                self.emit_expr(func, if_false)?;
                self.emit_expr(func, condition)?;
                self.emit_op(op::SELECT);
            }
            ExprKind::Drop { value } => {
                // the format predates an explicit drop: an unconsumed value
                // on the stack is discarded by its enclosing block
                let value = *value;
                self.emit_expr(func, value)?;
            }
            ExprKind::Return { value } => {
                let value = *value;
                if let Some(value) = value {
                    self.emit_expr(func, value)?;
                }
                self.emit_op_u32(op::RETURN, u32::from(value.is_some()));
            }
            ExprKind::Host { op: host_op, operands } => match host_op {
                HostOp::CurrentMemory => self.emit_op(op::CURRENT_MEMORY),
                HostOp::GrowMemory => {
                    let operand = operands[0];
                    self.emit_expr(func, operand)?;
                    self.emit_op(op::GROW_MEMORY);
                }
            },
        }
        Ok(())
    }
}

fn load_opcode(ty: ValueType, bytes: u8, signed: bool) -> Result<u8, BinaryError> {
    let code = match (ty, bytes, signed) {
        (ValueType::I32, 1, true) => op::I32_LOAD_MEM8_S,
        (ValueType::I32, 1, false) => op::I32_LOAD_MEM8_U,
        (ValueType::I32, 2, true) => op::I32_LOAD_MEM16_S,
        (ValueType::I32, 2, false) => op::I32_LOAD_MEM16_U,
        (ValueType::I32, 4, _) => op::I32_LOAD_MEM,
        (ValueType::I64, 1, true) => op::I64_LOAD_MEM8_S,
        (ValueType::I64, 1, false) => op::I64_LOAD_MEM8_U,
        (ValueType::I64, 2, true) => op::I64_LOAD_MEM16_S,
        (ValueType::I64, 2, false) => op::I64_LOAD_MEM16_U,
        (ValueType::I64, 4, true) => op::I64_LOAD_MEM32_S,
        (ValueType::I64, 4, false) => op::I64_LOAD_MEM32_U,
        (ValueType::I64, 8, _) => op::I64_LOAD_MEM,
        (ValueType::F32, 4, _) => op::F32_LOAD_MEM,
        (ValueType::F64, 8, _) => op::F64_LOAD_MEM,
        _ => {
            return Err(BinaryError::invalid_module(format!(
                "load of {bytes} bytes as {ty} is not encodable"
            )))
        }
    };
    Ok(code)
}

fn store_opcode(ty: ValueType, bytes: u8) -> Result<u8, BinaryError> {
    let code = match (ty, bytes) {
        (ValueType::I32, 1) => op::I32_STORE_MEM8,
        (ValueType::I32, 2) => op::I32_STORE_MEM16,
        (ValueType::I32, 4) => op::I32_STORE_MEM,
        (ValueType::I64, 1) => op::I64_STORE_MEM8,
        (ValueType::I64, 2) => op::I64_STORE_MEM16,
        (ValueType::I64, 4) => op::I64_STORE_MEM32,
        (ValueType::I64, 8) => op::I64_STORE_MEM,
        (ValueType::F32, 4) => op::F32_STORE_MEM,
        (ValueType::F64, 8) => op::F64_STORE_MEM,
        _ => {
            return Err(BinaryError::invalid_module(format!(
                "store of {bytes} bytes as {ty} is not encodable"
            )))
        }
    };
    Ok(code)
}

fn unary_opcode(
    unary_op: UnaryOp,
    result: ValueType,
    value: ValueType,
) -> Result<u8, BinaryError> {
    use ValueType::{F32, F64, I32, I64};
    let code = match (unary_op, result, value) {
        (UnaryOp::Clz, I32, _) => op::I32_CLZ,
        (UnaryOp::Clz, I64, _) => op::I64_CLZ,
        (UnaryOp::Ctz, I32, _) => op::I32_CTZ,
        (UnaryOp::Ctz, I64, _) => op::I64_CTZ,
        (UnaryOp::Popcnt, I32, _) => op::I32_POPCNT,
        (UnaryOp::Popcnt, I64, _) => op::I64_POPCNT,
        // eqz produces i32, so the operand type picks the opcode
        (UnaryOp::EqZ, _, I32) => op::I32_EQZ,
        (UnaryOp::EqZ, _, I64) => op::I64_EQZ,
        (UnaryOp::Neg, F32, _) => op::F32_NEG,
        (UnaryOp::Neg, F64, _) => op::F64_NEG,
        (UnaryOp::Abs, F32, _) => op::F32_ABS,
        (UnaryOp::Abs, F64, _) => op::F64_ABS,
        (UnaryOp::Ceil, F32, _) => op::F32_CEIL,
        (UnaryOp::Ceil, F64, _) => op::F64_CEIL,
        (UnaryOp::Floor, F32, _) => op::F32_FLOOR,
        (UnaryOp::Floor, F64, _) => op::F64_FLOOR,
        (UnaryOp::Trunc, F32, _) => op::F32_TRUNC,
        (UnaryOp::Trunc, F64, _) => op::F64_TRUNC,
        (UnaryOp::Nearest, F32, _) => op::F32_NEAREST_INT,
        (UnaryOp::Nearest, F64, _) => op::F64_NEAREST_INT,
        (UnaryOp::Sqrt, F32, _) => op::F32_SQRT,
        (UnaryOp::Sqrt, F64, _) => op::F64_SQRT,
        (UnaryOp::ExtendSInt32, _, _) => op::I64_S_TRUNC_I32,
        (UnaryOp::ExtendUInt32, _, _) => op::I64_U_TRUNC_I32,
        (UnaryOp::WrapInt64, _, _) => op::I32_CONVERT_I64,
        (UnaryOp::TruncSFloat32, I32, _) => op::I32_S_TRUNC_F32,
        (UnaryOp::TruncSFloat32, I64, _) => op::I64_S_TRUNC_F32,
        (UnaryOp::TruncUFloat32, I32, _) => op::I32_U_TRUNC_F32,
        (UnaryOp::TruncUFloat32, I64, _) => op::I64_U_TRUNC_F32,
        (UnaryOp::TruncSFloat64, I32, _) => op::I32_S_TRUNC_F64,
        (UnaryOp::TruncSFloat64, I64, _) => op::I64_S_TRUNC_F64,
        (UnaryOp::TruncUFloat64, I32, _) => op::I32_U_TRUNC_F64,
        (UnaryOp::TruncUFloat64, I64, _) => op::I64_U_TRUNC_F64,
        (UnaryOp::ConvertSInt32, F32, _) => op::F32_S_CONVERT_I32,
        (UnaryOp::ConvertSInt32, F64, _) => op::F64_S_CONVERT_I32,
        (UnaryOp::ConvertUInt32, F32, _) => op::F32_U_CONVERT_I32,
        (UnaryOp::ConvertUInt32, F64, _) => op::F64_U_CONVERT_I32,
        (UnaryOp::ConvertSInt64, F32, _) => op::F32_S_CONVERT_I64,
        (UnaryOp::ConvertSInt64, F64, _) => op::F64_S_CONVERT_I64,
        (UnaryOp::ConvertUInt64, F32, _) => op::F32_U_CONVERT_I64,
        (UnaryOp::ConvertUInt64, F64, _) => op::F64_U_CONVERT_I64,
        (UnaryOp::PromoteFloat32, _, _) => op::F64_CONVERT_F32,
        (UnaryOp::DemoteFloat64, _, _) => op::F32_CONVERT_F64,
        (UnaryOp::ReinterpretFloat, I32, _) => op::I32_REINTERPRET_F32,
        (UnaryOp::ReinterpretFloat, I64, _) => op::I64_REINTERPRET_F64,
        (UnaryOp::ReinterpretInt, F32, _) => op::F32_REINTERPRET_I32,
        (UnaryOp::ReinterpretInt, F64, _) => op::F64_REINTERPRET_I64,
        _ => {
            return Err(BinaryError::invalid_module(format!(
                "unary {unary_op:?} with result {result} is not encodable"
            )))
        }
    };
    Ok(code)
}

fn binary_opcode(binary_op: BinaryOp, class: ValueType) -> Result<u8, BinaryError> {
    use ValueType::{F32, F64, I32, I64};
    let code = match (binary_op, class) {
        (BinaryOp::Add, I32) => op::I32_ADD,
        (BinaryOp::Add, I64) => op::I64_ADD,
        (BinaryOp::Add, F32) => op::F32_ADD,
        (BinaryOp::Add, F64) => op::F64_ADD,
        (BinaryOp::Sub, I32) => op::I32_SUB,
        (BinaryOp::Sub, I64) => op::I64_SUB,
        (BinaryOp::Sub, F32) => op::F32_SUB,
        (BinaryOp::Sub, F64) => op::F64_SUB,
        (BinaryOp::Mul, I32) => op::I32_MUL,
        (BinaryOp::Mul, I64) => op::I64_MUL,
        (BinaryOp::Mul, F32) => op::F32_MUL,
        (BinaryOp::Mul, F64) => op::F64_MUL,
        (BinaryOp::DivS, I32) => op::I32_DIV_S,
        (BinaryOp::DivS, I64) => op::I64_DIV_S,
        (BinaryOp::DivU, I32) => op::I32_DIV_U,
        (BinaryOp::DivU, I64) => op::I64_DIV_U,
        (BinaryOp::RemS, I32) => op::I32_REM_S,
        (BinaryOp::RemS, I64) => op::I64_REM_S,
        (BinaryOp::RemU, I32) => op::I32_REM_U,
        (BinaryOp::RemU, I64) => op::I64_REM_U,
        (BinaryOp::And, I32) => op::I32_AND,
        (BinaryOp::And, I64) => op::I64_AND,
        (BinaryOp::Or, I32) => op::I32_OR,
        (BinaryOp::Or, I64) => op::I64_OR,
        (BinaryOp::Xor, I32) => op::I32_XOR,
        (BinaryOp::Xor, I64) => op::I64_XOR,
        (BinaryOp::Shl, I32) => op::I32_SHL,
        (BinaryOp::Shl, I64) => op::I64_SHL,
        (BinaryOp::ShrS, I32) => op::I32_SHR_S,
        (BinaryOp::ShrS, I64) => op::I64_SHR_S,
        (BinaryOp::ShrU, I32) => op::I32_SHR_U,
        (BinaryOp::ShrU, I64) => op::I64_SHR_U,
        (BinaryOp::RotL, I32) => op::I32_ROT_L,
        (BinaryOp::RotL, I64) => op::I64_ROT_L,
        (BinaryOp::RotR, I32) => op::I32_ROT_R,
        (BinaryOp::RotR, I64) => op::I64_ROT_R,
        (BinaryOp::Div, F32) => op::F32_DIV,
        (BinaryOp::Div, F64) => op::F64_DIV,
        (BinaryOp::CopySign, F32) => op::F32_COPY_SIGN,
        (BinaryOp::CopySign, F64) => op::F64_COPY_SIGN,
        (BinaryOp::Min, F32) => op::F32_MIN,
        (BinaryOp::Min, F64) => op::F64_MIN,
        (BinaryOp::Max, F32) => op::F32_MAX,
        (BinaryOp::Max, F64) => op::F64_MAX,
        (BinaryOp::Eq, I32) => op::I32_EQ,
        (BinaryOp::Eq, I64) => op::I64_EQ,
        (BinaryOp::Eq, F32) => op::F32_EQ,
        (BinaryOp::Eq, F64) => op::F64_EQ,
        (BinaryOp::Ne, I32) => op::I32_NE,
        (BinaryOp::Ne, I64) => op::I64_NE,
        (BinaryOp::Ne, F32) => op::F32_NE,
        (BinaryOp::Ne, F64) => op::F64_NE,
        (BinaryOp::LtS, I32) => op::I32_LT_S,
        (BinaryOp::LtS, I64) => op::I64_LT_S,
        (BinaryOp::LtU, I32) => op::I32_LT_U,
        (BinaryOp::LtU, I64) => op::I64_LT_U,
        (BinaryOp::LeS, I32) => op::I32_LE_S,
        (BinaryOp::LeS, I64) => op::I64_LE_S,
        (BinaryOp::LeU, I32) => op::I32_LE_U,
        (BinaryOp::LeU, I64) => op::I64_LE_U,
        (BinaryOp::GtS, I32) => op::I32_GT_S,
        (BinaryOp::GtS, I64) => op::I64_GT_S,
        (BinaryOp::GtU, I32) => op::I32_GT_U,
        (BinaryOp::GtU, I64) => op::I64_GT_U,
        (BinaryOp::GeS, I32) => op::I32_GE_S,
        (BinaryOp::GeS, I64) => op::I64_GE_S,
        (BinaryOp::GeU, I32) => op::I32_GE_U,
        (BinaryOp::GeU, I64) => op::I64_GE_U,
        (BinaryOp::Lt, F32) => op::F32_LT,
        (BinaryOp::Lt, F64) => op::F64_LT,
        (BinaryOp::Le, F32) => op::F32_LE,
        (BinaryOp::Le, F64) => op::F64_LE,
        (BinaryOp::Gt, F32) => op::F32_GT,
        (BinaryOp::Gt, F64) => op::F64_GT,
        (BinaryOp::Ge, F32) => op::F32_GE,
        (BinaryOp::Ge, F64) => op::F64_GE,
        _ => {
            return Err(BinaryError::invalid_module(format!(
                "binary {binary_op:?} over {class} is not encodable"
            )))
        }
    };
    Ok(code)
}
