//! Loading and validation of rule byte-code programs.
//!
//! A rule body arrives as a raw byte stream: one opcode byte followed by
//! that opcode's immediate operands. [`Code::new`] decodes the stream into
//! an instruction list with the immediates split off into a data segment,
//! and rejects malformed programs before they can ever run: unknown or
//! reserved opcodes, truncated immediates, skips past the end of the
//! program, a missing terminator, and any program whose statically computed
//! stack depth would leave `[0, STACK_MAX]`.

use crate::error::CodeError;
use crate::machine::STACK_MAX;

/// The opcode set, numbered as the font compiler emits them.
///
/// The `*Obs` forms are the obsolete one-byte-class spellings retained for
/// older fonts. `NextN`, `PushIGlyphAttr`, `PutSubs2` and `PutSubs3` are
/// reserved: assigned numbers no compiler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    PushByte = 1,
    PushByteU = 2,
    PushShort = 3,
    PushShortU = 4,
    PushLong = 5,
    Add = 6,
    Sub = 7,
    Mul = 8,
    Div = 9,
    Min = 10,
    Max = 11,
    Neg = 12,
    Trunc8 = 13,
    Trunc16 = 14,
    Cond = 15,
    And = 16,
    Or = 17,
    Not = 18,
    Equal = 19,
    NotEq = 20,
    Less = 21,
    Gtr = 22,
    LessEq = 23,
    GtrEq = 24,
    Next = 25,
    NextN = 26,
    CopyNext = 27,
    PutGlyph8bitObs = 28,
    PutSubs8bitObs = 29,
    PutCopy = 30,
    Insert = 31,
    Delete = 32,
    Assoc = 33,
    CntxtItem = 34,
    AttrSet = 35,
    AttrAdd = 36,
    AttrSub = 37,
    AttrSetSlot = 38,
    IAttrSetSlot = 39,
    PushSlotAttr = 40,
    PushGlyphAttrObs = 41,
    PushGlyphMetric = 42,
    PushFeat = 43,
    PushAttToGattrObs = 44,
    PushAttToGlyphMetric = 45,
    PushISlotAttr = 46,
    PushIGlyphAttr = 47,
    PopRet = 48,
    IAttrSet = 49,
    IAttrAdd = 50,
    IAttrSub = 51,
    PushProcState = 52,
    PushVersion = 53,
    PutSubs = 54,
    PutSubs2 = 55,
    PutSubs3 = 56,
    PutGlyph = 57,
    PushGlyphAttr = 58,
    PushAttToGlyphAttr = 59,
}

pub const MAX_OPCODE: u8 = Opcode::PushAttToGlyphAttr as u8;

/// Immediate operand count: a fixed byte count, or counted operands led by
/// a count byte (`Assoc`).
#[derive(Clone, Copy)]
enum Params {
    Fixed(u8),
    Counted,
}

/// Static properties of one opcode.
struct OpProps {
    params: Params,
    pops: u8,
    pushes: u8,
    /// Usable in constraint programs.
    in_constraint: bool,
    /// Usable in action programs.
    in_action: bool,
    reserved: bool,
}

impl Opcode {
    fn from_byte(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        const TABLE: [Opcode; 60] = [
            Nop,
            PushByte,
            PushByteU,
            PushShort,
            PushShortU,
            PushLong,
            Add,
            Sub,
            Mul,
            Div,
            Min,
            Max,
            Neg,
            Trunc8,
            Trunc16,
            Cond,
            And,
            Or,
            Not,
            Equal,
            NotEq,
            Less,
            Gtr,
            LessEq,
            GtrEq,
            Next,
            NextN,
            CopyNext,
            PutGlyph8bitObs,
            PutSubs8bitObs,
            PutCopy,
            Insert,
            Delete,
            Assoc,
            CntxtItem,
            AttrSet,
            AttrAdd,
            AttrSub,
            AttrSetSlot,
            IAttrSetSlot,
            PushSlotAttr,
            PushGlyphAttrObs,
            PushGlyphMetric,
            PushFeat,
            PushAttToGattrObs,
            PushAttToGlyphMetric,
            PushISlotAttr,
            PushIGlyphAttr,
            PopRet,
            IAttrSet,
            IAttrAdd,
            IAttrSub,
            PushProcState,
            PushVersion,
            PutSubs,
            PutSubs2,
            PutSubs3,
            PutGlyph,
            PushGlyphAttr,
            PushAttToGlyphAttr,
        ];
        TABLE.get(usize::from(byte)).copied()
    }

    fn props(self) -> OpProps {
        use Opcode::*;
        let fixed = |params, pops, pushes, in_constraint, in_action| OpProps {
            params: Params::Fixed(params),
            pops,
            pushes,
            in_constraint,
            in_action,
            reserved: false,
        };
        match self {
            Nop => fixed(0, 0, 0, true, true),
            PushByte | PushByteU => fixed(1, 0, 1, true, true),
            PushShort | PushShortU => fixed(2, 0, 1, true, true),
            PushLong => fixed(4, 0, 1, true, true),
            Add | Sub | Mul | Div | Min | Max | And | Or | Equal | NotEq | Less | Gtr
            | LessEq | GtrEq => fixed(0, 2, 1, true, true),
            Neg | Trunc8 | Trunc16 | Not => fixed(0, 1, 1, true, true),
            Cond => fixed(0, 3, 1, true, true),
            Next | CopyNext => fixed(0, 0, 0, false, true),
            PutGlyph8bitObs => fixed(1, 0, 0, false, true),
            PutSubs8bitObs => fixed(3, 0, 0, false, true),
            PutCopy => fixed(1, 0, 0, false, true),
            Insert | Delete => fixed(0, 0, 0, false, true),
            Assoc => OpProps {
                params: Params::Counted,
                pops: 0,
                pushes: 0,
                in_constraint: false,
                in_action: true,
                reserved: false,
            },
            CntxtItem => fixed(2, 0, 0, true, false),
            AttrSet | AttrAdd | AttrSub | AttrSetSlot => fixed(1, 1, 0, false, true),
            IAttrSetSlot => fixed(2, 1, 0, false, true),
            PushSlotAttr => fixed(2, 0, 1, true, true),
            PushGlyphAttrObs => fixed(2, 0, 1, true, true),
            PushGlyphMetric => fixed(3, 0, 1, true, true),
            PushFeat => fixed(2, 0, 1, true, true),
            PushAttToGattrObs => fixed(2, 0, 1, true, true),
            PushAttToGlyphMetric => fixed(3, 0, 1, true, true),
            PushISlotAttr => fixed(3, 0, 1, true, true),
            PopRet => fixed(0, 1, 0, true, true),
            IAttrSet | IAttrAdd | IAttrSub => fixed(2, 1, 0, false, true),
            PushProcState => fixed(1, 0, 1, true, true),
            PushVersion => fixed(0, 0, 1, true, true),
            PutSubs => fixed(5, 0, 0, false, true),
            PutGlyph => fixed(2, 0, 0, false, true),
            PushGlyphAttr => fixed(3, 0, 1, true, true),
            PushAttToGlyphAttr => fixed(3, 0, 1, true, true),
            NextN | PushIGlyphAttr | PutSubs2 | PutSubs3 => OpProps {
                params: Params::Fixed(match self {
                    NextN => 1,
                    _ => 3,
                }),
                pops: 0,
                pushes: 0,
                in_constraint: false,
                in_action: false,
                reserved: true,
            },
        }
    }
}

/// One decoded instruction: its opcode and the span of its immediate
/// operands within the program's data segment.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Instr {
    pub op: Opcode,
    data_offset: u32,
    data_len: u8,
}

/// A validated, executable rule program.
#[derive(Debug)]
pub struct Code {
    instrs: Vec<Instr>,
    data: Vec<u8>,
    constraint: bool,
}

impl Code {
    /// Decode and validate `bytes`.
    ///
    /// `constraint` selects which half of the opcode set is legal: slot
    /// edits are action-only, the context-item skip is constraint-only.
    pub fn new(constraint: bool, bytes: &[u8]) -> Result<Code, CodeError> {
        let mut instrs = Vec::new();
        let mut data = Vec::new();
        // Byte offset at which each decoded instruction started, plus a
        // final entry for the end of the program. CntxtItem skip targets
        // must land on one of these boundaries.
        let mut boundaries = Vec::new();

        let mut offset = 0;
        while offset < bytes.len() {
            boundaries.push(offset);
            let op = Opcode::from_byte(bytes[offset]).ok_or(CodeError::InvalidOpcode)?;
            offset += 1;
            let props = op.props();
            if props.reserved {
                return Err(CodeError::UnimplementedOpcodeUsed);
            }
            let allowed = if constraint {
                props.in_constraint
            } else {
                props.in_action
            };
            if !allowed {
                return Err(CodeError::UnimplementedOpcodeUsed);
            }

            let param_len = match props.params {
                Params::Fixed(n) => usize::from(n),
                Params::Counted => {
                    let count = *bytes.get(offset).ok_or(CodeError::ArgumentsExhausted)?;
                    1 + usize::from(count)
                }
            };
            let params = bytes
                .get(offset..offset + param_len)
                .ok_or(CodeError::ArgumentsExhausted)?;
            offset += param_len;

            let data_offset = u32::try_from(data.len()).map_err(|_| CodeError::AllocFailed)?;
            let data_len = u8::try_from(param_len).map_err(|_| CodeError::ArgumentsExhausted)?;
            data.extend_from_slice(params);
            instrs.push(Instr {
                op,
                data_offset,
                data_len,
            });
        }
        boundaries.push(bytes.len());

        match instrs.last() {
            Some(last) if last.op == Opcode::PopRet => {}
            _ => return Err(CodeError::MissingReturn),
        }

        let mut code = Code {
            instrs,
            data,
            constraint,
        };
        code.resolve_skips(&boundaries)?;
        code.analyse_stack()?;
        Ok(code)
    }

    /// Rewrite each `CntxtItem` byte-skip into an instruction-skip, checking
    /// it lands on an instruction boundary inside the program.
    fn resolve_skips(&mut self, boundaries: &[usize]) -> Result<(), CodeError> {
        for index in 0..self.instrs.len() {
            let instr = self.instrs[index];
            if instr.op != Opcode::CntxtItem {
                continue;
            }
            let skip_bytes = usize::from(self.data[instr.data_offset as usize + 1]);
            // The skip is relative to the instruction that follows.
            let from = boundaries[index + 1];
            let target = from + skip_bytes;
            let landing = boundaries[index + 1..]
                .binary_search(&target)
                .map_err(|_| CodeError::JumpPastEnd)?;
            let skip_instrs = u8::try_from(landing).map_err(|_| CodeError::JumpPastEnd)?;
            self.data[instr.data_offset as usize + 1] = skip_instrs;
        }
        Ok(())
    }

    /// Walk the instruction list accumulating stack-depth deltas, rejecting
    /// programs whose depth would leave `[0, STACK_MAX]`.
    ///
    /// The terminating pop is exempt from the low-water check: at run time
    /// it reads the guard region and returns zero on an empty stack.
    fn analyse_stack(&self) -> Result<(), CodeError> {
        let mut depth: i32 = 0;
        for instr in &self.instrs {
            let props = instr.op.props();
            if instr.op != Opcode::PopRet {
                depth -= i32::from(props.pops);
                if depth < 0 {
                    return Err(CodeError::StackUnderflow);
                }
            }
            depth += i32::from(props.pushes);
            if depth > STACK_MAX as i32 {
                return Err(CodeError::StackOverflow);
            }
        }
        Ok(())
    }

    pub fn instruction_count(&self) -> usize {
        self.instrs.len()
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    pub fn is_constraint(&self) -> bool {
        self.constraint
    }

    pub(crate) fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    pub(crate) fn args(&self, instr: &Instr) -> &[u8] {
        let start = instr.data_offset as usize;
        &self.data[start..start + usize::from(instr.data_len)]
    }
}
