//! Binary reader: parses the sectioned byte format back into a module.
//!
//! The reader streams with an explicit cursor and a one-byte unget. Function
//! bodies are rebuilt by stack simulation: expressions accumulate on a
//! scratch stack as their operands are decoded, and structural bytes (End,
//! Else) pop everything since the matching opener. Call targets are carried
//! as numeric indices during parsing and patched to names once the name
//! section has been read. Any malformed byte is fatal.

use log::trace;
use rustc_hash::FxHashMap;

use crate::binary::constants::{op, section, value_type_from_code, MAGIC, TYPE_FORM_BASIC, VERSION};
use crate::binary::error::BinaryError;
use crate::binary::leb;
use crate::binary::opcode_table::{OpcodeEntry, OpcodeTable};
use crate::ir::expr::{Expr, ExprArena, ExprId, ExprKind, Name};
use crate::ir::module::{Export, Function, FunctionType, Import, Module, Segment};
use crate::ir::ops::{BinaryOp, HostOp, UnaryOp};
use crate::ir::ty::{Literal, ValueType};
use crate::passes::drop_return_values::normalize_function;

/// Parses a module from its binary encoding.
pub fn read_module(input: &[u8]) -> Result<Module, BinaryError> {
    Reader::new(input).read()
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    module: Module,
    opcode_table: OpcodeTable,
    /// Per declared function, index into the module's type list.
    function_type_indices: Vec<usize>,
    /// Parsed functions, held here until their names are known.
    functions: Vec<Function>,
    /// Callee function index -> call sites as (function position, node).
    function_calls: FxHashMap<usize, Vec<(usize, ExprId)>>,
    function_table: Vec<usize>,
    /// Export name -> pending function index.
    export_indices: Vec<(Name, usize)>,
    start_index: Option<usize>,
    next_label: usize,
    break_stack: Vec<Name>,
    expression_stack: Vec<ExprId>,
    last_separator: u8,
    end_of_function: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            module: Module::new(),
            opcode_table: OpcodeTable::new(),
            function_type_indices: Vec::new(),
            functions: Vec::new(),
            function_calls: FxHashMap::default(),
            function_table: Vec::new(),
            export_indices: Vec::new(),
            start_index: None,
            next_label: 0,
            break_stack: Vec::new(),
            expression_stack: Vec::new(),
            last_separator: op::END,
            end_of_function: 0,
        }
    }

    fn read(mut self) -> Result<Module, BinaryError> {
        self.read_header()?;
        while self.more() {
            let name_at = self.pos;
            let name = self.get_inline_string()?;
            let size = self.get_u32_leb()? as usize;
            let before = self.pos;
            if before + size > self.input.len() {
                return Err(BinaryError::truncated(self.pos));
            }
            trace!("== section {name} at {before}, {size} bytes");
            let known: &'static str = match name.as_str() {
                section::START => {
                    self.read_start()?;
                    section::START
                }
                section::MEMORY => {
                    self.read_memory()?;
                    section::MEMORY
                }
                section::SIGNATURES => {
                    self.read_signatures()?;
                    section::SIGNATURES
                }
                section::IMPORT_TABLE => {
                    self.read_imports()?;
                    section::IMPORT_TABLE
                }
                section::FUNCTION_SIGNATURES => {
                    self.read_function_signatures()?;
                    section::FUNCTION_SIGNATURES
                }
                section::FUNCTIONS => {
                    self.read_functions()?;
                    section::FUNCTIONS
                }
                section::EXPORT_TABLE => {
                    self.read_exports()?;
                    section::EXPORT_TABLE
                }
                section::DATA_SEGMENTS => {
                    self.read_data_segments()?;
                    section::DATA_SEGMENTS
                }
                section::FUNCTION_TABLE => {
                    self.read_function_table()?;
                    section::FUNCTION_TABLE
                }
                section::OPCODES => {
                    self.read_opcode_table()?;
                    section::OPCODES
                }
                section::NAMES => {
                    self.read_names()?;
                    section::NAMES
                }
                _ => return Err(BinaryError::unknown_section(name, name_at)),
            };
            if self.pos != before + size {
                return Err(BinaryError::size_mismatch(known, size, self.pos - before));
            }
        }
        self.process_functions()?;
        Ok(self.module)
    }

    // -- stream primitives --------------------------------------------------

    fn more(&self) -> bool {
        self.pos < self.input.len()
    }

    fn get_u8(&mut self) -> Result<u8, BinaryError> {
        let byte = *self
            .input
            .get(self.pos)
            .ok_or_else(|| BinaryError::truncated(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn unget_u8(&mut self) {
        debug_assert!(self.pos > 0);
        self.pos -= 1;
    }

    fn get_u32(&mut self) -> Result<u32, BinaryError> {
        let end = self.pos + 4;
        let bytes = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| BinaryError::truncated(self.pos))?;
        self.pos = end;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn get_u64(&mut self) -> Result<u64, BinaryError> {
        let end = self.pos + 8;
        let bytes = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| BinaryError::truncated(self.pos))?;
        self.pos = end;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn get_u32_leb(&mut self) -> Result<u32, BinaryError> {
        leb::read_u32(self.input, &mut self.pos).ok_or_else(|| BinaryError::truncated(self.pos))
    }

    fn get_s32_leb(&mut self) -> Result<i32, BinaryError> {
        leb::read_s32(self.input, &mut self.pos).ok_or_else(|| BinaryError::truncated(self.pos))
    }

    fn get_s64_leb(&mut self) -> Result<i64, BinaryError> {
        leb::read_s64(self.input, &mut self.pos).ok_or_else(|| BinaryError::truncated(self.pos))
    }

    fn get_value_type(&mut self) -> Result<ValueType, BinaryError> {
        let at = self.pos;
        let code = self.get_u8()?;
        value_type_from_code(code).ok_or_else(|| BinaryError::bad_value_type(code, at))
    }

    fn get_inline_string(&mut self) -> Result<String, BinaryError> {
        let len = self.get_u32_leb()? as usize;
        let at = self.pos;
        let end = at + len;
        let bytes = self
            .input
            .get(at..end)
            .ok_or_else(|| BinaryError::truncated(at))?;
        self.pos = end;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| BinaryError::malformed("inline string is not valid UTF-8", at))
    }

    fn verify_u32(&mut self, expected: u32, what: &str) -> Result<(), BinaryError> {
        let at = self.pos;
        let found = self.get_u32()?;
        if found != expected {
            return Err(BinaryError::bad_header(format!(
                "bad {what}: expected 0x{expected:08x}, found 0x{found:08x} at byte {at}"
            )));
        }
        Ok(())
    }

    fn read_header(&mut self) -> Result<(), BinaryError> {
        self.verify_u32(MAGIC, "magic")?;
        self.verify_u32(VERSION, "version")?;
        Ok(())
    }

    fn fresh_label(&mut self) -> Name {
        let label = format!("label${}", self.next_label);
        self.next_label += 1;
        label
    }

    // -- sections -----------------------------------------------------------

    fn read_start(&mut self) -> Result<(), BinaryError> {
        self.start_index = Some(self.get_u32_leb()? as usize);
        Ok(())
    }

    fn read_memory(&mut self) -> Result<(), BinaryError> {
        self.module.memory.initial = self.get_u32_leb()?;
        self.module.memory.max = self.get_u32_leb()?;
        let exported = self.get_u8()?;
        if exported != 0 {
            self.module.memory.export_name = Some("memory".to_string());
        }
        Ok(())
    }

    fn read_signatures(&mut self) -> Result<(), BinaryError> {
        let num = self.get_u32_leb()?;
        for i in 0..num {
            let at = self.pos;
            let form = self.get_u8()?;
            if form != TYPE_FORM_BASIC {
                return Err(BinaryError::malformed(
                    format!("bad signature form byte 0x{form:02x}"),
                    at,
                ));
            }
            let num_params = self.get_u32_leb()?;
            let mut params = Vec::with_capacity(num_params as usize);
            for _ in 0..num_params {
                params.push(self.get_value_type()?);
            }
            let num_results = self.get_u32_leb()?;
            let result = match num_results {
                0 => ValueType::None,
                1 => self.get_value_type()?,
                _ => {
                    return Err(BinaryError::malformed(
                        format!("signature has {num_results} results"),
                        at,
                    ))
                }
            };
            let ty = FunctionType {
                name: format!("sig${i}"),
                params,
                result,
            };
            self.module
                .add_function_type(ty)
                .map_err(|e| BinaryError::invalid_module(e.to_string()))?;
        }
        Ok(())
    }

    fn read_imports(&mut self) -> Result<(), BinaryError> {
        let num = self.get_u32_leb()?;
        for i in 0..num {
            let at = self.pos;
            let type_index = self.get_u32_leb()? as usize;
            let ty = self
                .module
                .function_types
                .get(type_index)
                .ok_or_else(|| {
                    BinaryError::malformed(format!("import references type {type_index}"), at)
                })?
                .name
                .clone();
            let module_name = self.get_inline_string()?;
            let base = self.get_inline_string()?;
            let import = Import {
                name: format!("import${i}"),
                module: module_name,
                base,
                ty,
            };
            self.module
                .add_import(import)
                .map_err(|e| BinaryError::invalid_module(e.to_string()))?;
        }
        Ok(())
    }

    fn read_function_signatures(&mut self) -> Result<(), BinaryError> {
        let num = self.get_u32_leb()?;
        for _ in 0..num {
            let at = self.pos;
            let index = self.get_u32_leb()? as usize;
            if index >= self.module.function_types.len() {
                return Err(BinaryError::malformed(
                    format!("function references type {index}"),
                    at,
                ));
            }
            self.function_type_indices.push(index);
        }
        Ok(())
    }

    fn read_functions(&mut self) -> Result<(), BinaryError> {
        let total = self.get_u32_leb()?;
        for i in 0..total as usize {
            let at = self.pos;
            trace!("reading function {i} at {at}");
            let size = self.get_u32_leb()? as usize;
            if size == 0 {
                return Err(BinaryError::malformed("function body has size 0", at));
            }
            self.end_of_function = self.pos + size;
            if self.end_of_function > self.input.len() {
                return Err(BinaryError::truncated(self.pos));
            }
            let type_index = *self.function_type_indices.get(i).ok_or_else(|| {
                BinaryError::malformed(format!("function {i} has no declared signature"), at)
            })?;
            let ty = self.module.function_types[type_index].clone();
            let mut next_var = 0;
            let mut add_var = move || {
                let name = format!("var${next_var}");
                next_var += 1;
                name
            };
            let params: Vec<(Name, ValueType)> =
                ty.params.iter().map(|&p| (add_var(), p)).collect();
            let mut vars: Vec<(Name, ValueType)> = Vec::new();
            let num_local_types = self.get_u32_leb()?;
            for _ in 0..num_local_types {
                let num = self.get_u32_leb()?;
                let local_type = self.get_value_type()?;
                for _ in 0..num {
                    vars.push((add_var(), local_type));
                }
            }
            let mut func = Function {
                name: format!("func${i}"),
                ty: ty.name.clone(),
                params,
                vars,
                result: ty.result,
                arena: ExprArena::new(),
                body: ExprId::new(0),
            };
            self.next_label = 0;
            debug_assert!(self.break_stack.is_empty());
            debug_assert!(self.expression_stack.is_empty());
            func.body = self.get_maybe_block(&mut func)?;
            if self.pos != self.end_of_function {
                return Err(BinaryError::malformed(
                    "function body did not end at its declared size",
                    self.pos,
                ));
            }
            if !self.break_stack.is_empty() || !self.expression_stack.is_empty() {
                return Err(BinaryError::malformed(
                    "unbalanced expression stream in function body",
                    self.pos,
                ));
            }
            self.functions.push(func);
        }
        Ok(())
    }

    fn read_exports(&mut self) -> Result<(), BinaryError> {
        let num = self.get_u32_leb()?;
        for _ in 0..num {
            let at = self.pos;
            let index = self.get_u32_leb()? as usize;
            if index >= self.function_type_indices.len() {
                return Err(BinaryError::malformed(
                    format!("export references function {index}"),
                    at,
                ));
            }
            let name = self.get_inline_string()?;
            self.export_indices.push((name, index));
        }
        Ok(())
    }

    fn read_data_segments(&mut self) -> Result<(), BinaryError> {
        let num = self.get_u32_leb()?;
        for _ in 0..num {
            let offset = self.get_u32_leb()?;
            let size = self.get_u32_leb()? as usize;
            let at = self.pos;
            let end = at + size;
            let data = self
                .input
                .get(at..end)
                .ok_or_else(|| BinaryError::truncated(at))?
                .to_vec();
            self.pos = end;
            self.module.memory.segments.push(Segment { offset, data });
        }
        Ok(())
    }

    fn read_function_table(&mut self) -> Result<(), BinaryError> {
        let num = self.get_u32_leb()?;
        for _ in 0..num {
            let value = self.get_u32_leb()? as usize;
            self.function_table.push(value);
        }
        Ok(())
    }

    fn read_opcode_table(&mut self) -> Result<(), BinaryError> {
        let num = self.get_u8()?;
        for _ in 0..num {
            let code = self.get_u8()?;
            let real_op = self.get_u8()?;
            let num_imms = self.get_u8()?;
            let mut imms = Vec::with_capacity(num_imms as usize);
            for _ in 0..num_imms {
                let ty = self.get_value_type()?;
                let imm = match ty {
                    ValueType::I32 => Literal::I32(self.get_s32_leb()?),
                    ValueType::I64 => Literal::I64(self.get_s64_leb()?),
                    ValueType::F32 => Literal::F32(self.get_u32()?),
                    ValueType::F64 => Literal::F64(self.get_u64()?),
                    ValueType::None => {
                        return Err(BinaryError::malformed(
                            "opcode table immediate has no type",
                            self.pos,
                        ))
                    }
                };
                imms.push(imm);
            }
            self.opcode_table.install(code, OpcodeEntry { op: real_op, imms });
        }
        Ok(())
    }

    fn read_names(&mut self) -> Result<(), BinaryError> {
        let num = self.get_u32_leb()? as usize;
        if num != self.functions.len() {
            return Err(BinaryError::malformed(
                format!(
                    "name section covers {num} functions, module has {}",
                    self.functions.len()
                ),
                self.pos,
            ));
        }
        for i in 0..num {
            self.functions[i].name = self.get_inline_string()?;
            let num_locals = self.get_u32_leb()?;
            if num_locals != 0 {
                return Err(BinaryError::malformed(
                    "local names are not supported",
                    self.pos,
                ));
            }
        }
        Ok(())
    }

    fn process_functions(&mut self) -> Result<(), BinaryError> {
        // patch call targets now that every function has its final name
        let patches: Vec<(usize, Vec<(usize, ExprId)>)> = self.function_calls.drain().collect();
        for (callee, sites) in patches {
            let name = self
                .functions
                .get(callee)
                .ok_or_else(|| {
                    BinaryError::invalid_module(format!("call references function {callee}"))
                })?
                .name
                .clone();
            for (pos, id) in sites {
                if let ExprKind::Call { target, .. } = &mut self.functions[pos].arena[id].kind {
                    *target = name.clone();
                }
            }
        }
        // the format leaves drops and tee-ness implicit in tree positions;
        // normalize each body so the invariants hold on the way out
        for func in &mut self.functions {
            normalize_function(func);
        }
        for func in self.functions.drain(..) {
            self.module
                .add_function(func)
                .map_err(|e| BinaryError::invalid_module(e.to_string()))?;
        }
        if let Some(index) = self.start_index {
            let func = self.module.functions.get(index).ok_or_else(|| {
                BinaryError::invalid_module(format!("start references function {index}"))
            })?;
            self.module.start = Some(func.name.clone());
        }
        for (name, index) in self.export_indices.drain(..) {
            let value = self.module.functions[index].name.clone();
            self.module.exports.push(Export { name, value });
        }
        for index in self.function_table.drain(..) {
            let func = self.module.functions.get(index).ok_or_else(|| {
                BinaryError::invalid_module(format!("table references function {index}"))
            })?;
            self.module.table.push(func.name.clone());
        }
        Ok(())
    }

    // -- expression parsing -------------------------------------------------

    fn pop_expression(&mut self) -> Result<ExprId, BinaryError> {
        self.expression_stack
            .pop()
            .ok_or_else(|| BinaryError::malformed("expression stack is empty", self.pos))
    }

    /// Reads expressions until an End or Else marker, or the end of the
    /// function, pushing each onto the scratch stack.
    fn process_expressions(&mut self, func: &mut Function) -> Result<(), BinaryError> {
        loop {
            match self.read_expression(func)? {
                Some(id) => self.expression_stack.push(id),
                None => return Ok(()),
            }
        }
    }

    fn read_expression(&mut self, func: &mut Function) -> Result<Option<ExprId>, BinaryError> {
        if self.pos == self.end_of_function {
            self.last_separator = op::END;
            return Ok(None);
        }
        let at = self.pos;
        let mut code = self.get_u8()?;
        let entry = self.opcode_table.lookup(code).cloned();
        if let Some(entry) = &entry {
            code = entry.op;
        }
        trace!("expression opcode 0x{code:02x} at {at}");
        let id = match code {
            op::END | op::ELSE => {
                self.last_separator = code;
                return Ok(None);
            }
            op::BLOCK => {
                self.reject_entry(&entry, at)?;
                self.visit_block(func)?
            }
            op::IF => {
                self.reject_entry(&entry, at)?;
                self.visit_if(func)?
            }
            op::LOOP => {
                self.reject_entry(&entry, at)?;
                self.visit_loop(func)?
            }
            op::BR | op::BR_IF => self.visit_break(func, code, entry.as_ref())?,
            op::TABLE_SWITCH => self.visit_switch(func, entry.as_ref())?,
            op::CALL_FUNCTION => self.visit_call(func, entry.as_ref())?,
            op::CALL_IMPORT => self.visit_call_import(func, entry.as_ref())?,
            op::CALL_INDIRECT => self.visit_call_indirect(func, entry.as_ref())?,
            op::GET_LOCAL => self.visit_get_local(func, entry.as_ref())?,
            op::SET_LOCAL => self.visit_set_local(func, entry.as_ref())?,
            op::SELECT => {
                self.reject_entry(&entry, at)?;
                self.visit_select(func)?
            }
            op::RETURN => self.visit_return(func, entry.as_ref())?,
            op::NOP => {
                self.reject_entry(&entry, at)?;
                func.arena.nop()
            }
            op::UNREACHABLE => {
                self.reject_entry(&entry, at)?;
                func.arena.unreachable()
            }
            _ => {
                if let Some(id) = self.maybe_visit_const(func, code, entry.as_ref())? {
                    id
                } else if let Some(id) = self.maybe_visit_load(func, code, entry.as_ref())? {
                    id
                } else if let Some(id) = self.maybe_visit_store(func, code, entry.as_ref())? {
                    id
                } else if let Some(id) = self.maybe_visit_unary(func, code, &entry, at)? {
                    id
                } else if let Some(id) = self.maybe_visit_binary(func, code, &entry, at)? {
                    id
                } else if let Some(id) = self.maybe_visit_host(func, code, &entry, at)? {
                    id
                } else {
                    return Err(BinaryError::unknown_opcode(code, at));
                }
            }
        };
        Ok(Some(id))
    }

    /// Structural and immediate-free opcodes can never sit in the opcode
    /// table; an entry for one means the table itself is malformed.
    fn reject_entry(&self, entry: &Option<OpcodeEntry>, at: usize) -> Result<(), BinaryError> {
        if entry.is_some() {
            return Err(BinaryError::malformed(
                "opcode table maps an opcode that takes no immediates",
                at,
            ));
        }
        Ok(())
    }

    /// Entry immediate as an unsigned count or index.
    fn entry_u32(entry: &OpcodeEntry, index: usize, at: usize) -> Result<u32, BinaryError> {
        match entry.imms.get(index) {
            Some(Literal::I32(v)) => Ok(*v as u32),
            _ => Err(BinaryError::malformed(
                "opcode table entry has a bad immediate",
                at,
            )),
        }
    }

    /// Parses a chain of blocks iteratively. Blocks nested in first position
    /// are a common pattern and can be deep enough to overflow recursion.
    fn visit_block(&mut self, func: &mut Function) -> Result<ExprId, BinaryError> {
        let mut stack: Vec<ExprId> = Vec::new();
        loop {
            let label = self.fresh_label();
            let curr = func.arena.alloc(Expr {
                kind: ExprKind::Block {
                    name: Some(label.clone()),
                    list: Vec::new(),
                },
                ty: ValueType::None,
            });
            self.break_stack.push(label);
            stack.push(curr);
            if self.pos < self.end_of_function {
                if self.get_u8()? == op::BLOCK {
                    continue;
                }
                self.unget_u8();
            }
            break;
        }
        let outer = stack[0];
        let mut last: Option<ExprId> = None;
        while let Some(curr) = stack.pop() {
            let start = self.expression_stack.len();
            if let Some(last) = last {
                // the inner block is the first element of the enclosing one
                self.expression_stack.push(last);
            }
            last = Some(curr);
            self.process_expressions(func)?;
            if self.last_separator != op::END {
                return Err(BinaryError::malformed(
                    "block was not terminated by End",
                    self.pos,
                ));
            }
            let list: Vec<ExprId> = self.expression_stack.drain(start..).collect();
            if let ExprKind::Block { list: slot, .. } = &mut func.arena[curr].kind {
                *slot = list;
            }
            func.arena.finalize(curr);
            self.break_stack.pop();
        }
        Ok(outer)
    }

    /// Reads expressions to the next separator. A single expression is
    /// returned as-is; anything else is wrapped in an unnamed block.
    fn get_maybe_block(&mut self, func: &mut Function) -> Result<ExprId, BinaryError> {
        let start = self.expression_stack.len();
        self.process_expressions(func)?;
        if self.expression_stack.len() == start + 1 {
            return self.pop_expression();
        }
        let list: Vec<ExprId> = self.expression_stack.drain(start..).collect();
        Ok(func.arena.block(None, list))
    }

    /// Reads an if arm: a labeled scope for breaks that target the arm.
    fn get_block(&mut self, func: &mut Function) -> Result<ExprId, BinaryError> {
        let label = self.fresh_label();
        self.break_stack.push(label.clone());
        let inner = self.get_maybe_block(func)?;
        self.break_stack.pop();
        let inner = func.arena.blockify(inner);
        match &mut func.arena[inner].kind {
            ExprKind::Block { name, .. } if name.is_none() => {
                *name = Some(label);
                Ok(inner)
            }
            // already labeled: keep it, and wrap so the arm scope's own
            // label stays resolvable
            _ => Ok(func.arena.block(Some(label), vec![inner])),
        }
    }

    fn visit_if(&mut self, func: &mut Function) -> Result<ExprId, BinaryError> {
        let condition = self.pop_expression()?;
        let if_true = self.get_block(func)?;
        let if_false = if self.last_separator == op::ELSE {
            Some(self.get_block(func)?)
        } else {
            None
        };
        if self.last_separator != op::END {
            return Err(BinaryError::malformed(
                "if was not terminated by End",
                self.pos,
            ));
        }
        let id = func.arena.alloc(Expr {
            kind: ExprKind::If {
                condition,
                if_true,
                if_false,
            },
            ty: ValueType::None,
        });
        func.arena.finalize(id);
        Ok(id)
    }

    fn visit_loop(&mut self, func: &mut Function) -> Result<ExprId, BinaryError> {
        let out = self.fresh_label();
        let entry = self.fresh_label();
        self.break_stack.push(out.clone());
        self.break_stack.push(entry.clone());
        let body = self.get_maybe_block(func)?;
        self.break_stack.pop();
        self.break_stack.pop();
        let id = func.arena.alloc(Expr {
            kind: ExprKind::Loop {
                out: Some(out),
                entry: Some(entry),
                body,
            },
            ty: ValueType::None,
        });
        func.arena.finalize(id);
        Ok(id)
    }

    fn get_break_name(&self, depth: u32) -> Result<Name, BinaryError> {
        let depth = depth as usize;
        if depth >= self.break_stack.len() {
            return Err(BinaryError::malformed(
                format!("break depth {depth} exceeds scope"),
                self.pos,
            ));
        }
        Ok(self.break_stack[self.break_stack.len() - 1 - depth].clone())
    }

    fn visit_break(
        &mut self,
        func: &mut Function,
        code: u8,
        entry: Option<&OpcodeEntry>,
    ) -> Result<ExprId, BinaryError> {
        let at = self.pos;
        let (arity, depth) = match entry {
            Some(entry) => (
                Self::entry_u32(entry, 0, at)?,
                Self::entry_u32(entry, 1, at)?,
            ),
            None => (self.get_u32_leb()?, self.get_u32_leb()?),
        };
        if arity > 1 {
            return Err(BinaryError::malformed(
                format!("break arity {arity} is invalid"),
                at,
            ));
        }
        let name = self.get_break_name(depth)?;
        let condition = if code == op::BR_IF {
            Some(self.pop_expression()?)
        } else {
            None
        };
        let value = if arity == 1 {
            Some(self.pop_expression()?)
        } else {
            None
        };
        let id = func.arena.alloc(Expr {
            kind: ExprKind::Break {
                name,
                value,
                condition,
            },
            ty: ValueType::None,
        });
        func.arena.finalize(id);
        Ok(id)
    }

    fn visit_switch(
        &mut self,
        func: &mut Function,
        entry: Option<&OpcodeEntry>,
    ) -> Result<ExprId, BinaryError> {
        let at = self.pos;
        let (arity, num_targets) = match entry {
            Some(entry) => (
                Self::entry_u32(entry, 0, at)?,
                Self::entry_u32(entry, 1, at)?,
            ),
            None => (self.get_u32_leb()?, self.get_u32_leb()?),
        };
        if arity > 1 {
            return Err(BinaryError::malformed(
                format!("switch arity {arity} is invalid"),
                at,
            ));
        }
        let condition = self.pop_expression()?;
        let value = if arity == 1 {
            Some(self.pop_expression()?)
        } else {
            None
        };
        let mut targets = Vec::with_capacity(num_targets as usize);
        for _ in 0..num_targets {
            let depth = self.get_u32()?;
            targets.push(self.get_break_name(depth)?);
        }
        let default_depth = self.get_u32()?;
        let default = self.get_break_name(default_depth)?;
        Ok(func.arena.alloc(Expr {
            kind: ExprKind::Switch {
                value,
                condition,
                targets,
                default,
            },
            ty: ValueType::None,
        }))
    }

    fn read_call_immediates(
        &mut self,
        entry: Option<&OpcodeEntry>,
    ) -> Result<(u32, u32), BinaryError> {
        let at = self.pos;
        match entry {
            Some(entry) => Ok((
                Self::entry_u32(entry, 0, at)?,
                Self::entry_u32(entry, 1, at)?,
            )),
            None => Ok((self.get_u32_leb()?, self.get_u32_leb()?)),
        }
    }

    fn pop_operands(&mut self, num: usize) -> Result<Vec<ExprId>, BinaryError> {
        let mut operands = vec![ExprId::new(0); num];
        for i in 0..num {
            operands[num - i - 1] = self.pop_expression()?;
        }
        Ok(operands)
    }

    fn visit_call(
        &mut self,
        func: &mut Function,
        entry: Option<&OpcodeEntry>,
    ) -> Result<ExprId, BinaryError> {
        let at = self.pos;
        let (arity, index) = self.read_call_immediates(entry)?;
        let type_index = *self
            .function_type_indices
            .get(index as usize)
            .ok_or_else(|| BinaryError::malformed(format!("call to function {index}"), at))?;
        let ty = &self.module.function_types[type_index];
        if ty.params.len() != arity as usize {
            return Err(BinaryError::malformed(
                format!(
                    "call arity {arity} does not match signature with {} params",
                    ty.params.len()
                ),
                at,
            ));
        }
        let result = ty.result;
        let operands = self.pop_operands(arity as usize)?;
        let id = func.arena.alloc(Expr {
            kind: ExprKind::Call {
                // patched once names are known
                target: Name::new(),
                operands,
            },
            ty: result,
        });
        self.function_calls
            .entry(index as usize)
            .or_default()
            .push((self.functions.len(), id));
        Ok(id)
    }

    fn visit_call_import(
        &mut self,
        func: &mut Function,
        entry: Option<&OpcodeEntry>,
    ) -> Result<ExprId, BinaryError> {
        let at = self.pos;
        let (arity, index) = self.read_call_immediates(entry)?;
        let import = self
            .module
            .imports
            .get(index as usize)
            .ok_or_else(|| BinaryError::malformed(format!("call to import {index}"), at))?;
        let target = import.name.clone();
        let ty = self
            .module
            .get_function_type(&import.ty)
            .expect("import type was validated on read");
        if ty.params.len() != arity as usize {
            return Err(BinaryError::malformed(
                format!(
                    "call_import arity {arity} does not match signature with {} params",
                    ty.params.len()
                ),
                at,
            ));
        }
        let result = ty.result;
        let operands = self.pop_operands(arity as usize)?;
        Ok(func.arena.alloc(Expr {
            kind: ExprKind::CallImport { target, operands },
            ty: result,
        }))
    }

    fn visit_call_indirect(
        &mut self,
        func: &mut Function,
        entry: Option<&OpcodeEntry>,
    ) -> Result<ExprId, BinaryError> {
        let at = self.pos;
        let (arity, index) = self.read_call_immediates(entry)?;
        let ty = self
            .module
            .function_types
            .get(index as usize)
            .ok_or_else(|| {
                BinaryError::malformed(format!("call_indirect references type {index}"), at)
            })?;
        if ty.params.len() != arity as usize {
            return Err(BinaryError::malformed(
                format!(
                    "call_indirect arity {arity} does not match signature with {} params",
                    ty.params.len()
                ),
                at,
            ));
        }
        let signature = ty.name.clone();
        let result = ty.result;
        let operands = self.pop_operands(arity as usize)?;
        let target = self.pop_expression()?;
        Ok(func.arena.alloc(Expr {
            kind: ExprKind::CallIndirect {
                signature,
                operands,
                target,
            },
            ty: result,
        }))
    }

    fn read_local_index(
        &mut self,
        func: &Function,
        entry: Option<&OpcodeEntry>,
    ) -> Result<u32, BinaryError> {
        let at = self.pos;
        let index = match entry {
            Some(entry) => Self::entry_u32(entry, 0, at)?,
            None => self.get_u32_leb()?,
        };
        if index as usize >= func.num_locals() {
            return Err(BinaryError::malformed(
                format!("local index {index} out of range"),
                at,
            ));
        }
        Ok(index)
    }

    fn visit_get_local(
        &mut self,
        func: &mut Function,
        entry: Option<&OpcodeEntry>,
    ) -> Result<ExprId, BinaryError> {
        let index = self.read_local_index(func, entry)?;
        let ty = func.local_type(index);
        Ok(func.arena.get_local(index, ty))
    }

    fn visit_set_local(
        &mut self,
        func: &mut Function,
        entry: Option<&OpcodeEntry>,
    ) -> Result<ExprId, BinaryError> {
        let index = self.read_local_index(func, entry)?;
        let value = self.pop_expression()?;
        // parsed as a tee; the normalization pass demotes unused ones
        Ok(func.arena.tee_local(index, value))
    }

    fn visit_select(&mut self, func: &mut Function) -> Result<ExprId, BinaryError> {
        let condition = self.pop_expression()?;
        let if_false = self.pop_expression()?;
        let if_true = self.pop_expression()?;
        let id = func.arena.alloc(Expr {
            kind: ExprKind::Select {
                if_true,
                if_false,
                condition,
            },
            ty: ValueType::None,
        });
        func.arena.finalize(id);
        Ok(id)
    }

    fn visit_return(
        &mut self,
        func: &mut Function,
        entry: Option<&OpcodeEntry>,
    ) -> Result<ExprId, BinaryError> {
        let at = self.pos;
        let arity = match entry {
            Some(entry) => Self::entry_u32(entry, 0, at)?,
            None => self.get_u32_leb()?,
        };
        if arity > 1 {
            return Err(BinaryError::malformed(
                format!("return arity {arity} is invalid"),
                at,
            ));
        }
        let value = if arity == 1 {
            Some(self.pop_expression()?)
        } else {
            None
        };
        Ok(func.arena.alloc(Expr {
            kind: ExprKind::Return { value },
            ty: ValueType::None,
        }))
    }

    fn read_memory_access(
        &mut self,
        entry: Option<&OpcodeEntry>,
    ) -> Result<(u32, u32), BinaryError> {
        let at = self.pos;
        let (log2, offset) = match entry {
            Some(entry) => (
                Self::entry_u32(entry, 0, at)?,
                Self::entry_u32(entry, 1, at)?,
            ),
            None => {
                let log2 = self.get_u32_leb()?;
                let offset = self.get_u32_leb()?;
                (log2, offset)
            }
        };
        if log2 > 31 {
            return Err(BinaryError::malformed(
                format!("alignment 2^{log2} is out of range"),
                at,
            ));
        }
        Ok((1u32 << log2, offset))
    }

    fn maybe_visit_const(
        &mut self,
        func: &mut Function,
        code: u8,
        entry: Option<&OpcodeEntry>,
    ) -> Result<Option<ExprId>, BinaryError> {
        let value = match entry {
            Some(entry) => match code {
                op::I32_CONST | op::I64_CONST | op::F32_CONST | op::F64_CONST => {
                    match entry.imms.first() {
                        Some(value) => *value,
                        None => {
                            return Err(BinaryError::malformed(
                                "const opcode table entry is empty",
                                self.pos,
                            ))
                        }
                    }
                }
                _ => return Ok(None),
            },
            None => match code {
                op::I32_CONST => Literal::I32(self.get_s32_leb()?),
                op::I64_CONST => Literal::I64(self.get_s64_leb()?),
                op::F32_CONST => Literal::F32(self.get_u32()?),
                op::F64_CONST => Literal::F64(self.get_u64()?),
                _ => return Ok(None),
            },
        };
        Ok(Some(func.arena.const_(value)))
    }

    fn maybe_visit_load(
        &mut self,
        func: &mut Function,
        code: u8,
        entry: Option<&OpcodeEntry>,
    ) -> Result<Option<ExprId>, BinaryError> {
        let (bytes, ty, signed) = match code {
            op::I32_LOAD_MEM8_S => (1, ValueType::I32, true),
            op::I32_LOAD_MEM8_U => (1, ValueType::I32, false),
            op::I32_LOAD_MEM16_S => (2, ValueType::I32, true),
            op::I32_LOAD_MEM16_U => (2, ValueType::I32, false),
            op::I32_LOAD_MEM => (4, ValueType::I32, false),
            op::I64_LOAD_MEM8_S => (1, ValueType::I64, true),
            op::I64_LOAD_MEM8_U => (1, ValueType::I64, false),
            op::I64_LOAD_MEM16_S => (2, ValueType::I64, true),
            op::I64_LOAD_MEM16_U => (2, ValueType::I64, false),
            op::I64_LOAD_MEM32_S => (4, ValueType::I64, true),
            op::I64_LOAD_MEM32_U => (4, ValueType::I64, false),
            op::I64_LOAD_MEM => (8, ValueType::I64, false),
            op::F32_LOAD_MEM => (4, ValueType::F32, false),
            op::F64_LOAD_MEM => (8, ValueType::F64, false),
            _ => return Ok(None),
        };
        let (align, offset) = self.read_memory_access(entry)?;
        let ptr = self.pop_expression()?;
        Ok(Some(func.arena.alloc(Expr {
            kind: ExprKind::Load {
                bytes,
                signed,
                align,
                offset,
                ptr,
            },
            ty,
        })))
    }

    fn maybe_visit_store(
        &mut self,
        func: &mut Function,
        code: u8,
        entry: Option<&OpcodeEntry>,
    ) -> Result<Option<ExprId>, BinaryError> {
        let bytes = match code {
            op::I32_STORE_MEM8 | op::I64_STORE_MEM8 => 1,
            op::I32_STORE_MEM16 | op::I64_STORE_MEM16 => 2,
            op::I32_STORE_MEM | op::I64_STORE_MEM32 | op::F32_STORE_MEM => 4,
            op::I64_STORE_MEM | op::F64_STORE_MEM => 8,
            _ => return Ok(None),
        };
        let (align, offset) = self.read_memory_access(entry)?;
        let value = self.pop_expression()?;
        let ptr = self.pop_expression()?;
        // a store delivers no value; the stored type lives on the value child
        Ok(Some(func.arena.alloc(Expr {
            kind: ExprKind::Store {
                bytes,
                align,
                offset,
                ptr,
                value,
            },
            ty: ValueType::None,
        })))
    }

    fn maybe_visit_unary(
        &mut self,
        func: &mut Function,
        code: u8,
        entry: &Option<OpcodeEntry>,
        at: usize,
    ) -> Result<Option<ExprId>, BinaryError> {
        use UnaryOp::*;
        use ValueType::{F32, F64, I32, I64};
        let (unary_op, ty) = match code {
            op::I32_CLZ => (Clz, I32),
            op::I64_CLZ => (Clz, I64),
            op::I32_CTZ => (Ctz, I32),
            op::I64_CTZ => (Ctz, I64),
            op::I32_POPCNT => (Popcnt, I32),
            op::I64_POPCNT => (Popcnt, I64),
            // eqz always produces i32; the opcode encodes the operand type
            op::I32_EQZ | op::I64_EQZ => (EqZ, I32),
            op::F32_NEG => (Neg, F32),
            op::F64_NEG => (Neg, F64),
            op::F32_ABS => (Abs, F32),
            op::F64_ABS => (Abs, F64),
            op::F32_CEIL => (Ceil, F32),
            op::F64_CEIL => (Ceil, F64),
            op::F32_FLOOR => (Floor, F32),
            op::F64_FLOOR => (Floor, F64),
            op::F32_TRUNC => (Trunc, F32),
            op::F64_TRUNC => (Trunc, F64),
            op::F32_NEAREST_INT => (Nearest, F32),
            op::F64_NEAREST_INT => (Nearest, F64),
            op::F32_SQRT => (Sqrt, F32),
            op::F64_SQRT => (Sqrt, F64),
            op::I64_S_TRUNC_I32 => (ExtendSInt32, I64),
            op::I64_U_TRUNC_I32 => (ExtendUInt32, I64),
            op::I32_CONVERT_I64 => (WrapInt64, I32),
            op::I32_S_TRUNC_F32 => (TruncSFloat32, I32),
            op::I64_S_TRUNC_F32 => (TruncSFloat32, I64),
            op::I32_U_TRUNC_F32 => (TruncUFloat32, I32),
            op::I64_U_TRUNC_F32 => (TruncUFloat32, I64),
            op::I32_S_TRUNC_F64 => (TruncSFloat64, I32),
            op::I64_S_TRUNC_F64 => (TruncSFloat64, I64),
            op::I32_U_TRUNC_F64 => (TruncUFloat64, I32),
            op::I64_U_TRUNC_F64 => (TruncUFloat64, I64),
            op::F32_S_CONVERT_I32 => (ConvertSInt32, F32),
            op::F64_S_CONVERT_I32 => (ConvertSInt32, F64),
            op::F32_U_CONVERT_I32 => (ConvertUInt32, F32),
            op::F64_U_CONVERT_I32 => (ConvertUInt32, F64),
            op::F32_S_CONVERT_I64 => (ConvertSInt64, F32),
            op::F64_S_CONVERT_I64 => (ConvertSInt64, F64),
            op::F32_U_CONVERT_I64 => (ConvertUInt64, F32),
            op::F64_U_CONVERT_I64 => (ConvertUInt64, F64),
            op::F64_CONVERT_F32 => (PromoteFloat32, F64),
            op::F32_CONVERT_F64 => (DemoteFloat64, F32),
            op::I32_REINTERPRET_F32 => (ReinterpretFloat, I32),
            op::I64_REINTERPRET_F64 => (ReinterpretFloat, I64),
            op::F32_REINTERPRET_I32 => (ReinterpretInt, F32),
            op::F64_REINTERPRET_I64 => (ReinterpretInt, F64),
            _ => return Ok(None),
        };
        self.reject_entry(entry, at)?;
        let value = self.pop_expression()?;
        Ok(Some(func.arena.alloc(Expr {
            kind: ExprKind::Unary {
                op: unary_op,
                value,
            },
            ty,
        })))
    }

    fn maybe_visit_binary(
        &mut self,
        func: &mut Function,
        code: u8,
        entry: &Option<OpcodeEntry>,
        at: usize,
    ) -> Result<Option<ExprId>, BinaryError> {
        use BinaryOp::*;
        let binary_op = match code {
            op::I32_ADD | op::I64_ADD | op::F32_ADD | op::F64_ADD => Add,
            op::I32_SUB | op::I64_SUB | op::F32_SUB | op::F64_SUB => Sub,
            op::I32_MUL | op::I64_MUL | op::F32_MUL | op::F64_MUL => Mul,
            op::I32_DIV_S | op::I64_DIV_S => DivS,
            op::I32_DIV_U | op::I64_DIV_U => DivU,
            op::I32_REM_S | op::I64_REM_S => RemS,
            op::I32_REM_U | op::I64_REM_U => RemU,
            op::I32_AND | op::I64_AND => And,
            op::I32_OR | op::I64_OR => Or,
            op::I32_XOR | op::I64_XOR => Xor,
            op::I32_SHL | op::I64_SHL => Shl,
            op::I32_SHR_S | op::I64_SHR_S => ShrS,
            op::I32_SHR_U | op::I64_SHR_U => ShrU,
            op::I32_ROT_L | op::I64_ROT_L => RotL,
            op::I32_ROT_R | op::I64_ROT_R => RotR,
            op::F32_DIV | op::F64_DIV => Div,
            op::F32_COPY_SIGN | op::F64_COPY_SIGN => CopySign,
            op::F32_MIN | op::F64_MIN => Min,
            op::F32_MAX | op::F64_MAX => Max,
            op::I32_EQ | op::I64_EQ | op::F32_EQ | op::F64_EQ => Eq,
            op::I32_NE | op::I64_NE | op::F32_NE | op::F64_NE => Ne,
            op::I32_LT_S | op::I64_LT_S => LtS,
            op::I32_LT_U | op::I64_LT_U => LtU,
            op::I32_LE_S | op::I64_LE_S => LeS,
            op::I32_LE_U | op::I64_LE_U => LeU,
            op::I32_GT_S | op::I64_GT_S => GtS,
            op::I32_GT_U | op::I64_GT_U => GtU,
            op::I32_GE_S | op::I64_GE_S => GeS,
            op::I32_GE_U | op::I64_GE_U => GeU,
            op::F32_LT | op::F64_LT => Lt,
            op::F32_LE | op::F64_LE => Le,
            op::F32_GT | op::F64_GT => Gt,
            op::F32_GE | op::F64_GE => Ge,
            _ => return Ok(None),
        };
        self.reject_entry(entry, at)?;
        let right = self.pop_expression()?;
        let left = self.pop_expression()?;
        let id = func.arena.alloc(Expr {
            kind: ExprKind::Binary {
                op: binary_op,
                left,
                right,
            },
            ty: ValueType::None,
        });
        func.arena.finalize(id);
        Ok(Some(id))
    }

    fn maybe_visit_host(
        &mut self,
        func: &mut Function,
        code: u8,
        entry: &Option<OpcodeEntry>,
        at: usize,
    ) -> Result<Option<ExprId>, BinaryError> {
        let (host_op, operands) = match code {
            op::CURRENT_MEMORY => (HostOp::CurrentMemory, Vec::new()),
            op::GROW_MEMORY => (HostOp::GrowMemory, vec![self.pop_expression()?]),
            _ => return Ok(None),
        };
        self.reject_entry(entry, at)?;
        let id = func.arena.alloc(Expr {
            kind: ExprKind::Host {
                op: host_op,
                operands,
            },
            ty: ValueType::None,
        });
        func.arena.finalize(id);
        Ok(Some(id))
    }
}
