//! Fixed constants of the binary format: header, section names, value-type
//! bytes, and the closed opcode numbering.

use crate::ir::ty::ValueType;

/// Magic number `\0asm`, little-endian.
pub const MAGIC: u32 = 0x6d73_6100;
/// Format version.
pub const VERSION: u32 = 11;

/// Inline section name literals.
pub mod section {
    pub const MEMORY: &str = "memory";
    pub const SIGNATURES: &str = "type";
    pub const IMPORT_TABLE: &str = "import";
    pub const FUNCTION_SIGNATURES: &str = "function";
    pub const FUNCTIONS: &str = "code";
    pub const EXPORT_TABLE: &str = "export";
    pub const DATA_SEGMENTS: &str = "data";
    pub const FUNCTION_TABLE: &str = "table";
    pub const NAMES: &str = "name";
    pub const START: &str = "start";
    pub const OPCODES: &str = "opcode";
}

/// Signature encodings are prefixed by this form byte.
pub const TYPE_FORM_BASIC: u8 = 0x40;

/// Encodes a value type as its single-byte code.
pub fn value_type_code(ty: ValueType) -> u8 {
    match ty {
        ValueType::None => 0,
        ValueType::I32 => 1,
        ValueType::I64 => 2,
        ValueType::F32 => 3,
        ValueType::F64 => 4,
    }
}

/// Decodes a value-type byte.
pub fn value_type_from_code(code: u8) -> Option<ValueType> {
    match code {
        0 => Some(ValueType::None),
        1 => Some(ValueType::I32),
        2 => Some(ValueType::I64),
        3 => Some(ValueType::F32),
        4 => Some(ValueType::F64),
        _ => None,
    }
}

/// Opcode byte assignments. The numbering is part of the wire format and
/// must not change.
pub mod op {
    pub const NOP: u8 = 0x00;
    pub const BLOCK: u8 = 0x01;
    pub const LOOP: u8 = 0x02;
    pub const IF: u8 = 0x03;
    pub const ELSE: u8 = 0x04;
    pub const SELECT: u8 = 0x05;
    pub const BR: u8 = 0x06;
    pub const BR_IF: u8 = 0x07;
    pub const TABLE_SWITCH: u8 = 0x08;
    pub const RETURN: u8 = 0x09;
    pub const UNREACHABLE: u8 = 0x0a;
    pub const END: u8 = 0x0f;

    pub const I32_CONST: u8 = 0x10;
    pub const I64_CONST: u8 = 0x11;
    pub const F64_CONST: u8 = 0x12;
    pub const F32_CONST: u8 = 0x13;
    pub const GET_LOCAL: u8 = 0x14;
    pub const SET_LOCAL: u8 = 0x15;
    pub const CALL_FUNCTION: u8 = 0x16;
    pub const CALL_INDIRECT: u8 = 0x17;
    pub const CALL_IMPORT: u8 = 0x18;

    pub const I32_LOAD_MEM8_S: u8 = 0x20;
    pub const I32_LOAD_MEM8_U: u8 = 0x21;
    pub const I32_LOAD_MEM16_S: u8 = 0x22;
    pub const I32_LOAD_MEM16_U: u8 = 0x23;
    pub const I64_LOAD_MEM8_S: u8 = 0x24;
    pub const I64_LOAD_MEM8_U: u8 = 0x25;
    pub const I64_LOAD_MEM16_S: u8 = 0x26;
    pub const I64_LOAD_MEM16_U: u8 = 0x27;
    pub const I64_LOAD_MEM32_S: u8 = 0x28;
    pub const I64_LOAD_MEM32_U: u8 = 0x29;
    pub const I32_LOAD_MEM: u8 = 0x2a;
    pub const I64_LOAD_MEM: u8 = 0x2b;
    pub const F32_LOAD_MEM: u8 = 0x2c;
    pub const F64_LOAD_MEM: u8 = 0x2d;
    pub const I32_STORE_MEM8: u8 = 0x2e;
    pub const I32_STORE_MEM16: u8 = 0x2f;
    pub const I64_STORE_MEM8: u8 = 0x30;
    pub const I64_STORE_MEM16: u8 = 0x31;
    pub const I64_STORE_MEM32: u8 = 0x32;
    pub const I32_STORE_MEM: u8 = 0x33;
    pub const I64_STORE_MEM: u8 = 0x34;
    pub const F32_STORE_MEM: u8 = 0x35;
    pub const F64_STORE_MEM: u8 = 0x36;

    pub const GROW_MEMORY: u8 = 0x39;
    pub const CURRENT_MEMORY: u8 = 0x3b;

    pub const I32_ADD: u8 = 0x40;
    pub const I32_SUB: u8 = 0x41;
    pub const I32_MUL: u8 = 0x42;
    pub const I32_DIV_S: u8 = 0x43;
    pub const I32_DIV_U: u8 = 0x44;
    pub const I32_REM_S: u8 = 0x45;
    pub const I32_REM_U: u8 = 0x46;
    pub const I32_AND: u8 = 0x47;
    pub const I32_OR: u8 = 0x48;
    pub const I32_XOR: u8 = 0x49;
    pub const I32_SHL: u8 = 0x4a;
    pub const I32_SHR_U: u8 = 0x4b;
    pub const I32_SHR_S: u8 = 0x4c;
    pub const I32_EQ: u8 = 0x4d;
    pub const I32_NE: u8 = 0x4e;
    pub const I32_LT_S: u8 = 0x4f;
    pub const I32_LE_S: u8 = 0x50;
    pub const I32_LT_U: u8 = 0x51;
    pub const I32_LE_U: u8 = 0x52;
    pub const I32_GT_S: u8 = 0x53;
    pub const I32_GE_S: u8 = 0x54;
    pub const I32_GT_U: u8 = 0x55;
    pub const I32_GE_U: u8 = 0x56;
    pub const I32_CLZ: u8 = 0x57;
    pub const I32_CTZ: u8 = 0x58;
    pub const I32_POPCNT: u8 = 0x59;
    pub const I32_EQZ: u8 = 0x5a;
    pub const I64_ADD: u8 = 0x5b;
    pub const I64_SUB: u8 = 0x5c;
    pub const I64_MUL: u8 = 0x5d;
    pub const I64_DIV_S: u8 = 0x5e;
    pub const I64_DIV_U: u8 = 0x5f;
    pub const I64_REM_S: u8 = 0x60;
    pub const I64_REM_U: u8 = 0x61;
    pub const I64_AND: u8 = 0x62;
    pub const I64_OR: u8 = 0x63;
    pub const I64_XOR: u8 = 0x64;
    pub const I64_SHL: u8 = 0x65;
    pub const I64_SHR_U: u8 = 0x66;
    pub const I64_SHR_S: u8 = 0x67;
    pub const I64_EQ: u8 = 0x68;
    pub const I64_NE: u8 = 0x69;
    pub const I64_LT_S: u8 = 0x6a;
    pub const I64_LE_S: u8 = 0x6b;
    pub const I64_LT_U: u8 = 0x6c;
    pub const I64_LE_U: u8 = 0x6d;
    pub const I64_GT_S: u8 = 0x6e;
    pub const I64_GE_S: u8 = 0x6f;
    pub const I64_GT_U: u8 = 0x70;
    pub const I64_GE_U: u8 = 0x71;
    pub const I64_CLZ: u8 = 0x72;
    pub const I64_CTZ: u8 = 0x73;
    pub const I64_POPCNT: u8 = 0x74;
    pub const F32_ADD: u8 = 0x75;
    pub const F32_SUB: u8 = 0x76;
    pub const F32_MUL: u8 = 0x77;
    pub const F32_DIV: u8 = 0x78;
    pub const F32_MIN: u8 = 0x79;
    pub const F32_MAX: u8 = 0x7a;
    pub const F32_ABS: u8 = 0x7b;
    pub const F32_NEG: u8 = 0x7c;
    pub const F32_COPY_SIGN: u8 = 0x7d;
    pub const F32_CEIL: u8 = 0x7e;
    pub const F32_FLOOR: u8 = 0x7f;
    pub const F32_TRUNC: u8 = 0x80;
    pub const F32_NEAREST_INT: u8 = 0x81;
    pub const F32_SQRT: u8 = 0x82;
    pub const F32_EQ: u8 = 0x83;
    pub const F32_NE: u8 = 0x84;
    pub const F32_LT: u8 = 0x85;
    pub const F32_LE: u8 = 0x86;
    pub const F32_GT: u8 = 0x87;
    pub const F32_GE: u8 = 0x88;
    pub const F64_ADD: u8 = 0x89;
    pub const F64_SUB: u8 = 0x8a;
    pub const F64_MUL: u8 = 0x8b;
    pub const F64_DIV: u8 = 0x8c;
    pub const F64_MIN: u8 = 0x8d;
    pub const F64_MAX: u8 = 0x8e;
    pub const F64_ABS: u8 = 0x8f;
    pub const F64_NEG: u8 = 0x90;
    pub const F64_COPY_SIGN: u8 = 0x91;
    pub const F64_CEIL: u8 = 0x92;
    pub const F64_FLOOR: u8 = 0x93;
    pub const F64_TRUNC: u8 = 0x94;
    pub const F64_NEAREST_INT: u8 = 0x95;
    pub const F64_SQRT: u8 = 0x96;
    pub const F64_EQ: u8 = 0x97;
    pub const F64_NE: u8 = 0x98;
    pub const F64_LT: u8 = 0x99;
    pub const F64_LE: u8 = 0x9a;
    pub const F64_GT: u8 = 0x9b;
    pub const F64_GE: u8 = 0x9c;

    pub const I32_S_TRUNC_F32: u8 = 0x9d;
    pub const I32_S_TRUNC_F64: u8 = 0x9e;
    pub const I32_U_TRUNC_F32: u8 = 0x9f;
    pub const I32_U_TRUNC_F64: u8 = 0xa0;
    pub const I32_CONVERT_I64: u8 = 0xa1;
    pub const I64_S_TRUNC_F32: u8 = 0xa2;
    pub const I64_S_TRUNC_F64: u8 = 0xa3;
    pub const I64_U_TRUNC_F32: u8 = 0xa4;
    pub const I64_U_TRUNC_F64: u8 = 0xa5;
    pub const I64_S_TRUNC_I32: u8 = 0xa6;
    pub const I64_U_TRUNC_I32: u8 = 0xa7;
    pub const F32_S_CONVERT_I32: u8 = 0xa8;
    pub const F32_U_CONVERT_I32: u8 = 0xa9;
    pub const F32_S_CONVERT_I64: u8 = 0xaa;
    pub const F32_U_CONVERT_I64: u8 = 0xab;
    pub const F32_CONVERT_F64: u8 = 0xac;
    pub const F32_REINTERPRET_I32: u8 = 0xad;
    pub const F64_S_CONVERT_I32: u8 = 0xae;
    pub const F64_U_CONVERT_I32: u8 = 0xaf;
    pub const F64_S_CONVERT_I64: u8 = 0xb0;
    pub const F64_U_CONVERT_I64: u8 = 0xb1;
    pub const F64_CONVERT_F32: u8 = 0xb2;
    pub const F64_REINTERPRET_I64: u8 = 0xb3;
    pub const I32_REINTERPRET_F32: u8 = 0xb4;
    pub const I64_REINTERPRET_F64: u8 = 0xb5;
    pub const I32_ROT_R: u8 = 0xb6;
    pub const I32_ROT_L: u8 = 0xb7;
    pub const I64_ROT_R: u8 = 0xb8;
    pub const I64_ROT_L: u8 = 0xb9;
    pub const I64_EQZ: u8 = 0xba;
}
