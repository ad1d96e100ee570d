#![allow(dead_code)]

/// Intermediate representation for parsed JVM classes and methods.
#[derive(Clone, Debug)]
pub(crate) struct Class {
    pub(crate) name: String,
    pub(crate) major_version: u16,
    pub(crate) bootstrap_methods: Vec<BootstrapMethod>,
    pub(crate) methods: Vec<Method>,
    pub(crate) artifact_index: i64,
    pub(crate) is_target: bool,
}

/// Intermediate representation for a method and its decoded bytecode.
/// Methods without a Code attribute keep an empty instruction list.
#[derive(Clone, Debug)]
pub(crate) struct Method {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access: MethodAccess,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) line_numbers: Vec<LineNumber>,
}

/// Method access flags used for rule filtering.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MethodAccess {
    pub(crate) is_public: bool,
    pub(crate) is_static: bool,
    pub(crate) is_synthetic: bool,
}

/// LineNumberTable entry, sorted by start_pc.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LineNumber {
    pub(crate) start_pc: u32,
    pub(crate) line: u32,
}

/// Bytecode instruction captured for analysis.
#[derive(Clone, Debug)]
pub(crate) struct Instruction {
    pub(crate) offset: u32,
    pub(crate) opcode: u8,
    pub(crate) kind: InstructionKind,
}

/// Instruction kinds the rules need to see decoded; everything else is
/// carried as the raw opcode.
#[derive(Clone, Debug)]
pub(crate) enum InstructionKind {
    Invoke(CallSite),
    InvokeDynamic {
        bootstrap_index: u16,
        descriptor: String,
    },
    LoadLocal {
        slot: u16,
        reference: bool,
    },
    FieldGet {
        is_static: bool,
        descriptor: String,
    },
    ConstInt(i64),
    Other(u8),
}

/// Call site extracted from bytecode.
#[derive(Clone, Debug)]
pub(crate) struct CallSite {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) kind: CallKind,
}

/// Call opcode classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum CallKind {
    Virtual,
    Interface,
    Special,
    Static,
}

/// One entry of the class's BootstrapMethods attribute.
#[derive(Clone, Debug)]
pub(crate) struct BootstrapMethod {
    pub(crate) arguments: Vec<BootstrapArgument>,
}

/// Bootstrap argument, resolved to a method handle where possible.
#[derive(Clone, Debug)]
pub(crate) enum BootstrapArgument {
    MethodHandle(MethodHandleRef),
    Other,
}

/// Method handle constant referenced from a bootstrap argument.
#[derive(Clone, Debug)]
pub(crate) struct MethodHandleRef {
    pub(crate) kind: u8,
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
}

pub(crate) const REF_INVOKE_STATIC: u8 = 6;

impl MethodHandleRef {
    pub(crate) fn is_invoke_static(&self) -> bool {
        self.kind == REF_INVOKE_STATIC
    }
}
