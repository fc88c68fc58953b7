//! SPIR-V kernels assembled in-process for tests.
//!
//! `scale_kernel(n, k)` is equivalent to:
//!
//! ```glsl
//! #version 450
//! layout(local_size_x = n) in;
//! layout(set = 0, binding = 0) buffer Data { float values[]; };
//! void main() { values[gl_GlobalInvocationID.x] *= k; }
//! ```
//!
//! With `k = 1.0` it is an identity kernel that still reads and writes
//! every element.

use crate::pipeline::SPIRV_MAGIC;

// Opcodes
const OP_MEMORY_MODEL: u32 = 14;
const OP_ENTRY_POINT: u32 = 15;
const OP_EXECUTION_MODE: u32 = 16;
const OP_CAPABILITY: u32 = 17;
const OP_TYPE_VOID: u32 = 19;
const OP_TYPE_INT: u32 = 21;
const OP_TYPE_FLOAT: u32 = 22;
const OP_TYPE_VECTOR: u32 = 23;
const OP_TYPE_RUNTIME_ARRAY: u32 = 29;
const OP_TYPE_STRUCT: u32 = 30;
const OP_TYPE_POINTER: u32 = 32;
const OP_TYPE_FUNCTION: u32 = 33;
const OP_CONSTANT: u32 = 43;
const OP_FUNCTION: u32 = 54;
const OP_FUNCTION_END: u32 = 56;
const OP_VARIABLE: u32 = 59;
const OP_LOAD: u32 = 61;
const OP_STORE: u32 = 62;
const OP_ACCESS_CHAIN: u32 = 65;
const OP_DECORATE: u32 = 71;
const OP_MEMBER_DECORATE: u32 = 72;
const OP_COMPOSITE_EXTRACT: u32 = 81;
const OP_FMUL: u32 = 133;
const OP_LABEL: u32 = 248;
const OP_RETURN: u32 = 253;

// Operands
const CAPABILITY_SHADER: u32 = 1;
const ADDRESSING_LOGICAL: u32 = 0;
const MEMORY_GLSL450: u32 = 1;
const EXECUTION_MODEL_GLCOMPUTE: u32 = 5;
const EXECUTION_MODE_LOCAL_SIZE: u32 = 17;
const DECORATION_BUFFER_BLOCK: u32 = 3;
const DECORATION_ARRAY_STRIDE: u32 = 6;
const DECORATION_BUILTIN: u32 = 11;
const DECORATION_BINDING: u32 = 33;
const DECORATION_DESCRIPTOR_SET: u32 = 34;
const DECORATION_OFFSET: u32 = 35;
const BUILTIN_GLOBAL_INVOCATION_ID: u32 = 28;
const STORAGE_INPUT: u32 = 1;
const STORAGE_UNIFORM: u32 = 2;

// Result ids
const MAIN: u32 = 1;
const GID: u32 = 2;
const VOID: u32 = 3;
const FN_VOID: u32 = 4;
const UINT: u32 = 5;
const FLOAT: u32 = 6;
const UVEC3: u32 = 7;
const PTR_INPUT_UVEC3: u32 = 8;
const RUNTIME_ARRAY: u32 = 9;
const DATA: u32 = 10;
const PTR_UNIFORM_DATA: u32 = 11;
const VALUES: u32 = 12;
const INT: u32 = 13;
const INT_0: u32 = 14;
const PTR_UNIFORM_FLOAT: u32 = 15;
const FACTOR: u32 = 16;
const LABEL: u32 = 17;
const GID_VALUE: u32 = 18;
const INDEX: u32 = 19;
const ELEMENT_PTR: u32 = 20;
const ELEMENT: u32 = 21;
const SCALED: u32 = 22;
const ID_BOUND: u32 = 23;

struct Assembler {
    words: Vec<u32>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            // magic, version 1.0, generator, bound, schema
            words: vec![SPIRV_MAGIC, 0x0001_0000, 0, ID_BOUND, 0],
        }
    }

    fn op(&mut self, opcode: u32, operands: &[u32]) {
        let count = operands.len() as u32 + 1;
        self.words.push((count << 16) | opcode);
        self.words.extend_from_slice(operands);
    }
}

/// Nul-terminated string packed into little-endian words.
fn string_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Kernel multiplying each element of binding 0 by `factor`.
pub fn scale_kernel(local_size_x: u32, factor: f32) -> Vec<u32> {
    let mut a = Assembler::new();

    a.op(OP_CAPABILITY, &[CAPABILITY_SHADER]);
    a.op(OP_MEMORY_MODEL, &[ADDRESSING_LOGICAL, MEMORY_GLSL450]);
    let mut entry = vec![EXECUTION_MODEL_GLCOMPUTE, MAIN];
    entry.extend(string_words("main"));
    entry.push(GID);
    a.op(OP_ENTRY_POINT, &entry);
    a.op(OP_EXECUTION_MODE, &[MAIN, EXECUTION_MODE_LOCAL_SIZE, local_size_x, 1, 1]);

    a.op(OP_DECORATE, &[GID, DECORATION_BUILTIN, BUILTIN_GLOBAL_INVOCATION_ID]);
    a.op(OP_DECORATE, &[RUNTIME_ARRAY, DECORATION_ARRAY_STRIDE, 4]);
    a.op(OP_MEMBER_DECORATE, &[DATA, 0, DECORATION_OFFSET, 0]);
    a.op(OP_DECORATE, &[DATA, DECORATION_BUFFER_BLOCK]);
    a.op(OP_DECORATE, &[VALUES, DECORATION_DESCRIPTOR_SET, 0]);
    a.op(OP_DECORATE, &[VALUES, DECORATION_BINDING, 0]);

    a.op(OP_TYPE_VOID, &[VOID]);
    a.op(OP_TYPE_FUNCTION, &[FN_VOID, VOID]);
    a.op(OP_TYPE_INT, &[UINT, 32, 0]);
    a.op(OP_TYPE_FLOAT, &[FLOAT, 32]);
    a.op(OP_TYPE_VECTOR, &[UVEC3, UINT, 3]);
    a.op(OP_TYPE_POINTER, &[PTR_INPUT_UVEC3, STORAGE_INPUT, UVEC3]);
    a.op(OP_VARIABLE, &[PTR_INPUT_UVEC3, GID, STORAGE_INPUT]);
    a.op(OP_TYPE_RUNTIME_ARRAY, &[RUNTIME_ARRAY, FLOAT]);
    a.op(OP_TYPE_STRUCT, &[DATA, RUNTIME_ARRAY]);
    a.op(OP_TYPE_POINTER, &[PTR_UNIFORM_DATA, STORAGE_UNIFORM, DATA]);
    a.op(OP_VARIABLE, &[PTR_UNIFORM_DATA, VALUES, STORAGE_UNIFORM]);
    a.op(OP_TYPE_INT, &[INT, 32, 1]);
    a.op(OP_CONSTANT, &[INT, INT_0, 0]);
    a.op(OP_TYPE_POINTER, &[PTR_UNIFORM_FLOAT, STORAGE_UNIFORM, FLOAT]);
    a.op(OP_CONSTANT, &[FLOAT, FACTOR, factor.to_bits()]);

    a.op(OP_FUNCTION, &[VOID, MAIN, 0, FN_VOID]);
    a.op(OP_LABEL, &[LABEL]);
    a.op(OP_LOAD, &[UVEC3, GID_VALUE, GID]);
    a.op(OP_COMPOSITE_EXTRACT, &[UINT, INDEX, GID_VALUE, 0]);
    a.op(OP_ACCESS_CHAIN, &[PTR_UNIFORM_FLOAT, ELEMENT_PTR, VALUES, INT_0, INDEX]);
    a.op(OP_LOAD, &[FLOAT, ELEMENT, ELEMENT_PTR]);
    a.op(OP_FMUL, &[FLOAT, SCALED, ELEMENT, FACTOR]);
    a.op(OP_STORE, &[ELEMENT_PTR, SCALED]);
    a.op(OP_RETURN, &[]);
    a.op(OP_FUNCTION_END, &[]);

    a.words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_padding() {
        // "main" + nul needs a second word
        assert_eq!(string_words("main"), vec![u32::from_le_bytes(*b"main"), 0]);
        assert_eq!(string_words("abc"), vec![u32::from_le_bytes(*b"abc\0")]);
    }

    #[test]
    fn test_instruction_word_counts_cover_module() {
        let words = scale_kernel(8, 2.0);
        assert_eq!(words[0], SPIRV_MAGIC);
        assert_eq!(words[3], ID_BOUND);

        // Walking the instruction stream must land exactly on the end.
        let mut at = 5;
        let mut last_opcode = 0;
        while at < words.len() {
            let count = (words[at] >> 16) as usize;
            assert!(count > 0, "zero-length instruction at word {at}");
            last_opcode = words[at] & 0xffff;
            at += count;
        }
        assert_eq!(at, words.len());
        assert_eq!(last_opcode, OP_FUNCTION_END);
    }

    #[test]
    fn test_local_size_and_factor_are_encoded() {
        let words = scale_kernel(16, 2.0);
        let mode = words
            .windows(6)
            .find(|w| w[0] == (6 << 16 | OP_EXECUTION_MODE))
            .unwrap();
        assert_eq!(&mode[1..], &[MAIN, EXECUTION_MODE_LOCAL_SIZE, 16, 1, 1]);
        assert!(words.windows(4).any(|w| w == [4 << 16 | OP_CONSTANT, FLOAT, FACTOR, 2.0f32.to_bits()]));
    }
}
