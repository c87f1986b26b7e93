//! Lua 5.3 opcodes and metamethod events
//!
//! The numbering follows `lopcodes.h` exactly; instructions are decoded by
//! indexing [`OPCODE_TABLE`] with the low six bits of the instruction word.

use std::fmt;

/// Lua 5.3 register machine opcode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // === Loads and moves ===
    /// R(A) := R(B)
    Move = 0,
    /// R(A) := Kst(Bx)
    LoadK = 1,
    /// R(A) := Kst(extra arg)
    LoadKx = 2,
    /// R(A) := (Bool)B; if (C) pc++
    LoadBool = 3,
    /// R(A), R(A+1), ..., R(A+B) := nil
    LoadNil = 4,

    // === Upvalues and tables ===
    /// R(A) := UpValue[B]
    GetUpval = 5,
    /// R(A) := UpValue[B][RK(C)]
    GetTabUp = 6,
    /// R(A) := R(B)[RK(C)]
    GetTable = 7,
    /// UpValue[A][RK(B)] := RK(C)
    SetTabUp = 8,
    /// UpValue[B] := R(A)
    SetUpval = 9,
    /// R(A)[RK(B)] := RK(C)
    SetTable = 10,
    /// R(A) := {} (size = B,C)
    NewTable = 11,
    /// R(A+1) := R(B); R(A) := R(B)[RK(C)]
    SelfOp = 12,

    // === Arithmetic ===
    Add = 13,
    Sub = 14,
    Mul = 15,
    Mod = 16,
    Pow = 17,
    Div = 18,
    IDiv = 19,

    // === Bitwise ===
    BAnd = 20,
    BOr = 21,
    BXor = 22,
    Shl = 23,
    Shr = 24,

    // === Unary ===
    Unm = 25,
    BNot = 26,
    Not = 27,
    Len = 28,

    /// R(A) := R(B).. ... ..R(C)
    Concat = 29,

    // === Control flow ===
    /// pc += sBx; if (A) close all upvalues >= R(A - 1)
    Jmp = 30,
    /// if ((RK(B) == RK(C)) ~= A) then pc++
    Eq = 31,
    /// if ((RK(B) <  RK(C)) ~= A) then pc++
    Lt = 32,
    /// if ((RK(B) <= RK(C)) ~= A) then pc++
    Le = 33,
    /// if not (R(A) <=> C) then pc++
    Test = 34,
    /// if (R(B) <=> C) then R(A) := R(B) else pc++
    TestSet = 35,

    // === Calls ===
    /// R(A), ... ,R(A+C-2) := R(A)(R(A+1), ... ,R(A+B-1))
    Call = 36,
    /// return R(A)(R(A+1), ... ,R(A+B-1))
    TailCall = 37,
    /// return R(A), ... ,R(A+B-2)
    Return = 38,

    // === Loops ===
    ForLoop = 39,
    ForPrep = 40,
    TForCall = 41,
    TForLoop = 42,

    /// R(A)[(C-1)*FPF+i] := R(A+i), 1 <= i <= B
    SetList = 43,
    /// R(A) := closure(KPROTO[Bx])
    Closure = 44,
    /// R(A), R(A+1), ..., R(A+B-2) = vararg
    VarArg = 45,
    /// Extra (larger) argument for the previous opcode
    ExtraArg = 46,
}

/// Number of opcodes in the instruction set
pub const NUM_OPCODES: usize = 47;

impl OpCode {
    /// Decode the six-bit opcode field, returns None if out of range
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        OPCODE_TABLE.get(byte as usize).copied().flatten()
    }

    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Upper-case name as printed by `luac -l`
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Move => "MOVE",
            Self::LoadK => "LOADK",
            Self::LoadKx => "LOADKX",
            Self::LoadBool => "LOADBOOL",
            Self::LoadNil => "LOADNIL",
            Self::GetUpval => "GETUPVAL",
            Self::GetTabUp => "GETTABUP",
            Self::GetTable => "GETTABLE",
            Self::SetTabUp => "SETTABUP",
            Self::SetUpval => "SETUPVAL",
            Self::SetTable => "SETTABLE",
            Self::NewTable => "NEWTABLE",
            Self::SelfOp => "SELF",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Mod => "MOD",
            Self::Pow => "POW",
            Self::Div => "DIV",
            Self::IDiv => "IDIV",
            Self::BAnd => "BAND",
            Self::BOr => "BOR",
            Self::BXor => "BXOR",
            Self::Shl => "SHL",
            Self::Shr => "SHR",
            Self::Unm => "UNM",
            Self::BNot => "BNOT",
            Self::Not => "NOT",
            Self::Len => "LEN",
            Self::Concat => "CONCAT",
            Self::Jmp => "JMP",
            Self::Eq => "EQ",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Test => "TEST",
            Self::TestSet => "TESTSET",
            Self::Call => "CALL",
            Self::TailCall => "TAILCALL",
            Self::Return => "RETURN",
            Self::ForLoop => "FORLOOP",
            Self::ForPrep => "FORPREP",
            Self::TForCall => "TFORCALL",
            Self::TForLoop => "TFORLOOP",
            Self::SetList => "SETLIST",
            Self::Closure => "CLOSURE",
            Self::VarArg => "VARARG",
            Self::ExtraArg => "EXTRAARG",
        }
    }

    /// Binary arithmetic opcodes lowered by the arithmetic translator
    #[inline]
    pub fn is_arith(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Sub | Self::Mul | Self::Mod | Self::Pow | Self::Div | Self::IDiv
        )
    }

    /// Binary bitwise opcodes lowered by the bitwise translator
    #[inline]
    pub fn is_bitwise(self) -> bool {
        matches!(self, Self::BAnd | Self::BOr | Self::BXor | Self::Shl | Self::Shr)
    }

    /// Opcodes whose result is always a float when both operands are numbers
    #[inline]
    pub fn is_float_only(self) -> bool {
        matches!(self, Self::Pow | Self::Div)
    }

    /// Opcodes that carry a signed jump displacement in sBx
    #[inline]
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jmp | Self::ForLoop | Self::ForPrep | Self::TForLoop
        )
    }

    /// Opcodes whose next instruction may be skipped (`pc++`)
    #[inline]
    pub fn is_test(self) -> bool {
        matches!(self, Self::Eq | Self::Lt | Self::Le | Self::Test | Self::TestSet)
    }

    /// Opcodes that leave the function
    #[inline]
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::Return | Self::TailCall)
    }

    /// Metamethod event consulted when a binary operator falls back
    pub fn metamethod(self) -> Option<TagMethod> {
        Some(match self {
            Self::Add => TagMethod::Add,
            Self::Sub => TagMethod::Sub,
            Self::Mul => TagMethod::Mul,
            Self::Mod => TagMethod::Mod,
            Self::Pow => TagMethod::Pow,
            Self::Div => TagMethod::Div,
            Self::IDiv => TagMethod::IDiv,
            Self::BAnd => TagMethod::BAnd,
            Self::BOr => TagMethod::BOr,
            Self::BXor => TagMethod::BXor,
            Self::Shl => TagMethod::Shl,
            Self::Shr => TagMethod::Shr,
            Self::Unm => TagMethod::Unm,
            Self::BNot => TagMethod::BNot,
            Self::Len => TagMethod::Len,
            Self::Concat => TagMethod::Concat,
            Self::Eq => TagMethod::Eq,
            Self::Lt => TagMethod::Lt,
            Self::Le => TagMethod::Le,
            _ => return None,
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Metamethod events, numbered as `TMS` in `ltm.h`
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagMethod {
    Index = 0,
    NewIndex = 1,
    Gc = 2,
    Mode = 3,
    Len = 4,
    Eq = 5,
    Add = 6,
    Sub = 7,
    Mul = 8,
    Mod = 9,
    Pow = 10,
    Div = 11,
    IDiv = 12,
    BAnd = 13,
    BOr = 14,
    BXor = 15,
    Shl = 16,
    Shr = 17,
    Unm = 18,
    BNot = 19,
    Lt = 20,
    Le = 21,
    Concat = 22,
    Call = 23,
}

impl TagMethod {
    /// Event name without the leading underscores
    pub fn name(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::NewIndex => "newindex",
            Self::Gc => "gc",
            Self::Mode => "mode",
            Self::Len => "len",
            Self::Eq => "eq",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Mod => "mod",
            Self::Pow => "pow",
            Self::Div => "div",
            Self::IDiv => "idiv",
            Self::BAnd => "band",
            Self::BOr => "bor",
            Self::BXor => "bxor",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Unm => "unm",
            Self::BNot => "bnot",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Concat => "concat",
            Self::Call => "call",
        }
    }

    /// Decode an event number received from generated code
    pub fn from_i32(event: i32) -> Option<Self> {
        use TagMethod::*;
        const ALL: [TagMethod; 24] = [
            Index, NewIndex, Gc, Mode, Len, Eq, Add, Sub, Mul, Mod, Pow, Div, IDiv, BAnd, BOr,
            BXor, Shl, Shr, Unm, BNot, Lt, Le, Concat, Call,
        ];
        usize::try_from(event).ok().and_then(|i| ALL.get(i).copied())
    }
}

impl fmt::Display for TagMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "__{}", self.name())
    }
}

/// Lookup table for six-bit field -> OpCode conversion
static OPCODE_TABLE: [Option<OpCode>; 64] = {
    let mut table = [None; 64];

    table[0] = Some(OpCode::Move);
    table[1] = Some(OpCode::LoadK);
    table[2] = Some(OpCode::LoadKx);
    table[3] = Some(OpCode::LoadBool);
    table[4] = Some(OpCode::LoadNil);
    table[5] = Some(OpCode::GetUpval);
    table[6] = Some(OpCode::GetTabUp);
    table[7] = Some(OpCode::GetTable);
    table[8] = Some(OpCode::SetTabUp);
    table[9] = Some(OpCode::SetUpval);
    table[10] = Some(OpCode::SetTable);
    table[11] = Some(OpCode::NewTable);
    table[12] = Some(OpCode::SelfOp);
    table[13] = Some(OpCode::Add);
    table[14] = Some(OpCode::Sub);
    table[15] = Some(OpCode::Mul);
    table[16] = Some(OpCode::Mod);
    table[17] = Some(OpCode::Pow);
    table[18] = Some(OpCode::Div);
    table[19] = Some(OpCode::IDiv);
    table[20] = Some(OpCode::BAnd);
    table[21] = Some(OpCode::BOr);
    table[22] = Some(OpCode::BXor);
    table[23] = Some(OpCode::Shl);
    table[24] = Some(OpCode::Shr);
    table[25] = Some(OpCode::Unm);
    table[26] = Some(OpCode::BNot);
    table[27] = Some(OpCode::Not);
    table[28] = Some(OpCode::Len);
    table[29] = Some(OpCode::Concat);
    table[30] = Some(OpCode::Jmp);
    table[31] = Some(OpCode::Eq);
    table[32] = Some(OpCode::Lt);
    table[33] = Some(OpCode::Le);
    table[34] = Some(OpCode::Test);
    table[35] = Some(OpCode::TestSet);
    table[36] = Some(OpCode::Call);
    table[37] = Some(OpCode::TailCall);
    table[38] = Some(OpCode::Return);
    table[39] = Some(OpCode::ForLoop);
    table[40] = Some(OpCode::ForPrep);
    table[41] = Some(OpCode::TForCall);
    table[42] = Some(OpCode::TForLoop);
    table[43] = Some(OpCode::SetList);
    table[44] = Some(OpCode::Closure);
    table[45] = Some(OpCode::VarArg);
    table[46] = Some(OpCode::ExtraArg);

    table
};
