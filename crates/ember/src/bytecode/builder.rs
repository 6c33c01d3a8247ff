//! Assembler for bytecode blocks.
//!
//! The compiler emits [`Instruction`]s whose jump operands are [`JumpLabel`]s and whose
//! sub-blocks are already-assembled byte vectors. [`CodeBuilder::assemble`] resolves labels
//! into relative offsets. Because integer operands are variable-width, the size of a jump
//! depends on its offset, which depends on the size of every instruction in between; the
//! assembler starts from the widest encoding and re-encodes until no offset changes.

use super::code::{Code, Instruction};
use crate::bytecode::op::Opcode;

/// Upper bound on relaxation passes. Widths only shrink, so real code settles in a few.
const MAX_PASSES: usize = 64;

/// A forward or backward jump target inside one [`CodeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JumpLabel(u32);

/// An instruction as emitted by the compiler, before label resolution.
pub type Pending = Instruction<JumpLabel, Vec<u8>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    #[error("jump label {0} was never bound")]
    UnboundLabel(u32),
    #[error("jump label {0} was bound twice")]
    DuplicateLabel(u32),
    #[error("jump offsets did not settle after {MAX_PASSES} passes")]
    NoFixpoint,
}

#[derive(Debug)]
enum Item {
    Label(JumpLabel),
    Op(Pending),
}

/// Accumulates the instructions of one block.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    items: Vec<Item>,
    labels: u32,
    bound: Vec<bool>,
    duplicate: Option<JumpLabel>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a label that can be bound later.
    pub fn new_label(&mut self) -> JumpLabel {
        let label = JumpLabel(self.labels);
        self.labels += 1;
        self.bound.push(false);
        label
    }

    /// Binds `label` to the position of the next emitted instruction.
    pub fn bind(&mut self, label: JumpLabel) {
        let slot = &mut self.bound[label.0 as usize];
        if *slot {
            self.duplicate.get_or_insert(label);
        }
        *slot = true;
        self.items.push(Item::Label(label));
    }

    /// Appends an instruction, returning its index for [`Self::patch`].
    pub fn emit(&mut self, instr: Pending) -> usize {
        self.items.push(Item::Op(instr));
        self.items.len() - 1
    }

    /// Replaces a previously emitted instruction.
    pub fn patch(&mut self, index: usize, instr: Pending) {
        if let Some(item @ Item::Op(_)) = self.items.get_mut(index) {
            *item = Item::Op(instr);
        }
    }

    /// Opcode of the last emitted instruction, ignoring labels.
    pub fn last_opcode(&self) -> Option<Opcode> {
        self.items.iter().rev().find_map(|item| match item {
            Item::Op(instr) => Some(instr.opcode()),
            Item::Label(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        !self.items.iter().any(|item| matches!(item, Item::Op(_)))
    }

    /// Assembles into raw bytes, for embedding as a sub-block of an enclosing instruction.
    pub fn assemble_bytes(mut self) -> Result<Vec<u8>, AssembleError> {
        if let Some(JumpLabel(id)) = self.duplicate {
            return Err(AssembleError::DuplicateLabel(id));
        }
        if let Some(id) = self.bound.iter().position(|bound| !bound) {
            return Err(AssembleError::UnboundLabel(u32::try_from(id).unwrap_or(u32::MAX)));
        }
        // every jump target must land on an instruction inside the block
        if matches!(self.items.last(), Some(Item::Label(_))) {
            self.items.push(Item::Op(Instruction::Nop));
        }

        let mut offsets: Vec<Vec<i64>> = self
            .items
            .iter()
            .map(|item| match item {
                Item::Op(instr) => vec![i64::MAX; instr.targets().len()],
                Item::Label(_) => Vec::new(),
            })
            .collect();
        let mut positions = vec![0usize; self.labels as usize];
        let mut ends = vec![0usize; self.items.len()];
        let mut out = Vec::new();

        for _ in 0..MAX_PASSES {
            out.clear();
            for (index, item) in self.items.iter().enumerate() {
                match item {
                    Item::Label(label) => positions[label.0 as usize] = out.len(),
                    Item::Op(instr) => instr.encode(&mut out, &offsets[index]),
                }
                ends[index] = out.len();
            }

            let mut settled = true;
            for (index, item) in self.items.iter().enumerate() {
                let Item::Op(instr) = item else { continue };
                for (slot, label) in instr.targets().into_iter().enumerate() {
                    let offset = as_i64(positions[label.0 as usize]) - as_i64(ends[index]);
                    if offsets[index][slot] != offset {
                        offsets[index][slot] = offset;
                        settled = false;
                    }
                }
            }
            if settled {
                return Ok(out);
            }
        }
        Err(AssembleError::NoFixpoint)
    }

    /// Assembles into a top-level [`Code`] block.
    pub fn assemble(self) -> Result<Code, AssembleError> {
        self.assemble_bytes().map(Code::from_trusted)
    }
}

fn as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::code::Instruction;

    #[test]
    fn forward_jump_over_short_body() {
        let mut builder = CodeBuilder::new();
        let end = builder.new_label();
        builder.emit(Instruction::Jump(end));
        builder.emit(Instruction::NewInt(1));
        builder.bind(end);
        builder.emit(Instruction::NewInt(2));
        let code = builder.assemble().unwrap();
        code.validate().unwrap();
        let (jump, next) = code.decode_at(0).unwrap();
        // NewInt(1) is opcode + tag + payload
        assert_eq!(jump, Instruction::Jump(3));
        assert_eq!(next, 3);
    }

    #[test]
    fn backward_jump() {
        let mut builder = CodeBuilder::new();
        let top = builder.new_label();
        builder.bind(top);
        builder.emit(Instruction::NewTrue);
        builder.emit(Instruction::JumpIfTrue(top));
        let code = builder.assemble().unwrap();
        let (_, next) = code.decode_at(0).unwrap();
        let (jump, end) = code.decode_at(next).unwrap();
        assert_eq!(jump, Instruction::JumpIfTrue(-(end as isize)));
    }

    #[test]
    fn label_at_end_gets_nop() {
        let mut builder = CodeBuilder::new();
        let end = builder.new_label();
        builder.emit(Instruction::JumpIfFalse(end));
        builder.emit(Instruction::NewNone);
        builder.bind(end);
        let code = builder.assemble().unwrap();
        assert!(code.validate().is_ok());
        let (last, _) = code.decode_at(code.len() - 1).unwrap();
        assert_eq!(last, Instruction::Nop);
    }

    #[test]
    fn long_jump_widens() {
        let mut builder = CodeBuilder::new();
        let end = builder.new_label();
        builder.emit(Instruction::Jump(end));
        for i in 0..200 {
            builder.emit(Instruction::NewInt(i));
        }
        builder.bind(end);
        builder.emit(Instruction::Pop);
        let code = builder.assemble().unwrap();
        code.validate().unwrap();
        let (jump, next) = code.decode_at(0).unwrap();
        let Instruction::Jump(offset) = jump else { panic!("expected jump") };
        assert_eq!(next as isize + offset, code.len() as isize - 1);
        // i16 operand: opcode, tag, 2 payload bytes
        assert_eq!(next, 4);
    }

    #[test]
    fn resume_table_patched() {
        let mut builder = CodeBuilder::new();
        let table = builder.emit(Instruction::ResumeTable(Vec::new()));
        let start = builder.new_label();
        let resume = builder.new_label();
        builder.bind(start);
        builder.emit(Instruction::NewInt(1));
        builder.emit(Instruction::Yield(1));
        builder.bind(resume);
        builder.emit(Instruction::NewNone);
        builder.patch(table, Instruction::ResumeTable(vec![start, resume]));
        let code = builder.assemble().unwrap();
        code.validate().unwrap();
        let (Instruction::ResumeTable(offsets), next) = code.decode_at(0).unwrap() else {
            panic!("expected resume table");
        };
        assert_eq!(offsets[0], 0);
        let (_, after_int) = code.decode_at(next).unwrap();
        let (_, after_yield) = code.decode_at(after_int).unwrap();
        assert_eq!(next as isize + offsets[1], after_yield as isize);
    }

    #[test]
    fn unbound_label_is_an_error() {
        let mut builder = CodeBuilder::new();
        let label = builder.new_label();
        builder.emit(Instruction::Jump(label));
        assert_eq!(builder.assemble().unwrap_err(), AssembleError::UnboundLabel(0));
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let mut builder = CodeBuilder::new();
        let label = builder.new_label();
        builder.bind(label);
        builder.emit(Instruction::Nop);
        builder.bind(label);
        builder.emit(Instruction::Nop);
        assert_eq!(builder.assemble().unwrap_err(), AssembleError::DuplicateLabel(0));
    }
}
