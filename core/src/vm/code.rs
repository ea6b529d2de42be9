use core::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::{Instruction, LimitExceeded};
use crate::{Vec, ast::Span};

/// An instruction sequence plus a parallel source map.
///
/// Jump destinations are absolute indexes into `instructions`. Sub-expressions
/// are compiled into their own `Code` before their final position is known,
/// so the `write*` methods take care of moving those destinations when one
/// block is appended to another.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Code {
    instructions: Vec<Instruction>,
    /// `nodes[i]` is the source of `instructions[i]`.
    nodes: Vec<Span>,
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, instruction: Instruction, span: &Span) {
        self.instructions.push(instruction);
        self.nodes.push(span.clone());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[inline]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<Instruction> {
        self.instructions.get(index).copied()
    }

    pub fn nodes(&self) -> &[Span] {
        &self.nodes
    }

    pub fn span_at(&self, index: usize) -> Option<&Span> {
        self.nodes.get(index)
    }

    pub(crate) fn instructions_mut(&mut self) -> &mut [Instruction] {
        &mut self.instructions
    }

    /// Appends `code`, shifting its jump destinations by the current length.
    pub fn write(&mut self, code: Code) -> Result<(), LimitExceeded> {
        let base = self.len();
        self.append(code, |dest, _| base + dest)
    }

    /// Appends `code` as is: its destinations are already final.
    pub fn write_absolute(&mut self, code: Code) {
        self.instructions.extend(code.instructions);
        self.nodes.extend(code.nodes);
    }

    /// Like [`write`](Self::write), but a jump to the end of `code` (its
    /// implicit fallthrough) is sent to `tail` instead.
    pub fn write_branch(&mut self, code: Code, tail: usize) -> Result<(), LimitExceeded> {
        let base = self.len();
        self.append(code, |dest, end| if dest == end { tail } else { base + dest })
    }

    fn append(
        &mut self,
        code: Code,
        relocate: impl Fn(usize, usize) -> usize,
    ) -> Result<(), LimitExceeded> {
        let end = code.len();
        self.instructions.reserve(end);
        for instruction in code.instructions {
            let instruction = if instruction.is_jump() {
                instruction.with_dest(relocate(instruction.dest(), end))?
            } else {
                instruction
            };
            self.instructions.push(instruction);
        }
        self.nodes.extend(code.nodes);
        Ok(())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Label every jump target, numbered in address order.
        let mut targets: Vec<usize> = self
            .instructions
            .iter()
            .filter(|inst| inst.is_jump())
            .map(|inst| inst.dest())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        let labels: HashMap<usize, usize> = targets
            .into_iter()
            .enumerate()
            .map(|(i, addr)| (addr, i))
            .collect();

        writeln!(f, "Code {{")?;
        for (addr, inst) in self.instructions.iter().enumerate() {
            let label = labels
                .get(&addr)
                .map(|l| alloc::format!("L{}:", l))
                .unwrap_or_default();
            if inst.is_jump() {
                let target = labels
                    .get(&inst.dest())
                    .map(|l| alloc::format!("L{}", l))
                    .unwrap_or_default();
                let target = if inst.dest() == self.len() {
                    alloc::format!("{} (end)", target)
                } else {
                    target
                };
                writeln!(f, "    {:4} {:>4}  {:?}  ; {}", addr, label, inst, target)?;
            } else {
                writeln!(f, "    {:4} {:>4}  {:?}", addr, label, inst)?;
            }
        }
        if let Some(l) = labels.get(&self.len()) {
            writeln!(f, "    {:4} {:>4}", self.len(), alloc::format!("L{}:", l))?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::OpCode;

    fn span() -> Span {
        Span::new(0, 1)
    }

    fn block(instructions: &[Instruction]) -> Code {
        let mut code = Code::new();
        for inst in instructions {
            code.emit(*inst, &span());
        }
        code
    }

    #[test]
    fn write_shifts_internal_jumps() {
        let mut code = block(&[Instruction::nil(), Instruction::nil()]);
        code.write(block(&[Instruction::jmp(1).unwrap(), Instruction::pop()]))
            .unwrap();
        assert_eq!(code.len(), 4);
        assert_eq!(code.instructions()[2].dest(), 3);
        assert_eq!(code.nodes().len(), 4);
    }

    #[test]
    fn write_absolute_keeps_destinations() {
        let mut code = block(&[Instruction::nil()]);
        code.write_absolute(block(&[Instruction::jif(0, 7).unwrap()]));
        assert_eq!(code.instructions()[1].dest(), 7);
    }

    #[test]
    fn write_branch_redirects_fallthrough() {
        let mut code = block(&[Instruction::nil(), Instruction::nil()]);
        // An inner jump to the body's start, then its fallthrough jump.
        let body = block(&[
            Instruction::jmp(0).unwrap(),
            Instruction::jmp(2).unwrap(),
        ]);
        code.write_branch(body, 9).unwrap();
        assert_eq!(code.instructions()[2].dest(), 2);
        assert_eq!(code.instructions()[3].dest(), 9);
    }

    #[test]
    fn write_fails_when_destination_overflows() {
        let mut code = Code::new();
        for _ in 0..u16::MAX {
            code.emit(Instruction::nop(), &span());
        }
        let err = code.write(block(&[Instruction::jmp(1).unwrap()]));
        assert!(err.is_err());
    }

    #[test]
    fn disassembly_labels_targets() {
        let code = block(&[
            Instruction::jif(1, 2).unwrap(),
            Instruction::jmp(3).unwrap(),
            Instruction::nop(),
        ]);
        let text = alloc::format!("{:?}", code);
        assert!(text.contains("L0:"), "{}", text);
        assert!(text.contains("JIF 1 -> 2  ; L0"), "{}", text);
        assert!(text.contains("JMP -> 3  ; L1 (end)"), "{}", text);
        assert_eq!(code.get(2).map(|i| i.op()), Some(OpCode::Nop));
    }
}
