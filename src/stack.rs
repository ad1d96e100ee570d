use crate::descriptor::{method_param_count, return_signature};
use crate::ir::{CallKind, Instruction, InstructionKind};
use crate::opcodes;

/// One simulated operand stack slot. Long and double values are modeled
/// as a single slot, mirroring how the rules reason about items rather
/// than raw stack words.
#[derive(Clone, Debug)]
pub(crate) struct SimValue<T> {
    /// Type signature of the value, when the producing instruction names one.
    pub(crate) signature: Option<String>,
    /// Local variable slot the value was loaded from, if any.
    pub(crate) register: Option<u16>,
    /// Small integer constant pushed by the producing instruction.
    pub(crate) const_int: Option<i64>,
    /// Provenance tag attached by a rule after the producing instruction.
    pub(crate) tag: Option<T>,
}

impl<T> SimValue<T> {
    fn unknown() -> Self {
        SimValue {
            signature: None,
            register: None,
            const_int: None,
            tag: None,
        }
    }
}

/// Abstract operand stack, advanced one instruction at a time in program
/// order. Conservative: any transfer of control clears the stack, so
/// simulated values never survive across basic-block boundaries.
#[derive(Debug)]
pub(crate) struct SimStack<T> {
    values: Vec<SimValue<T>>,
}

impl<T: Clone> SimStack<T> {
    pub(crate) fn new() -> Self {
        SimStack { values: Vec::new() }
    }

    pub(crate) fn depth(&self) -> usize {
        self.values.len()
    }

    /// Slot counted from the top of the stack; `value(0)` is the top.
    pub(crate) fn value(&self, from_top: usize) -> Option<&SimValue<T>> {
        let len = self.values.len();
        if from_top >= len {
            return None;
        }
        self.values.get(len - 1 - from_top)
    }

    /// Tag the most recently pushed slot, overwriting any previous tag.
    pub(crate) fn set_top_tag(&mut self, tag: T) {
        if let Some(top) = self.values.last_mut() {
            top.tag = Some(tag);
        }
    }

    pub(crate) fn step(&mut self, instruction: &Instruction) {
        match &instruction.kind {
            InstructionKind::LoadLocal { slot, .. } => {
                self.values.push(SimValue {
                    register: Some(*slot),
                    ..SimValue::unknown()
                });
            }
            InstructionKind::FieldGet {
                is_static,
                descriptor,
            } => {
                if !is_static {
                    self.pop(1);
                }
                self.values.push(SimValue {
                    signature: Some(descriptor.clone()),
                    ..SimValue::unknown()
                });
            }
            InstructionKind::ConstInt(value) => {
                self.values.push(SimValue {
                    const_int: Some(*value),
                    ..SimValue::unknown()
                });
            }
            InstructionKind::Invoke(call) => {
                let Ok(params) = method_param_count(&call.descriptor) else {
                    self.values.clear();
                    return;
                };
                let receiver = usize::from(call.kind != CallKind::Static);
                self.pop(params + receiver);
                let return_sig = return_signature(&call.descriptor);
                if return_sig != "V" {
                    self.values.push(SimValue {
                        signature: Some(return_sig.to_string()),
                        ..SimValue::unknown()
                    });
                }
            }
            InstructionKind::InvokeDynamic { descriptor, .. } => {
                let Ok(params) = method_param_count(descriptor) else {
                    self.values.clear();
                    return;
                };
                self.pop(params);
                self.values.push(SimValue {
                    signature: Some(return_signature(descriptor).to_string()),
                    ..SimValue::unknown()
                });
            }
            InstructionKind::Other(opcode) => self.step_other(*opcode),
        }
    }

    fn step_other(&mut self, opcode: u8) {
        match opcode {
            opcodes::NOP | opcodes::IINC => {}
            opcodes::ACONST_NULL | 0x09..=0x0f | opcodes::NEW => {
                self.values.push(SimValue::unknown());
            }
            opcodes::LDC | opcodes::LDC_W | opcodes::LDC2_W => {
                self.values.push(SimValue::unknown());
            }
            // array loads
            0x2e..=0x35 => self.pop_push(2),
            // stores
            0x36..=0x4e => self.pop(1),
            // array stores
            0x4f..=0x56 => self.pop(3),
            opcodes::POP => self.pop(1),
            opcodes::POP2 => self.pop(2),
            opcodes::DUP => {
                if let Some(top) = self.values.last().cloned() {
                    self.values.push(top);
                }
            }
            // remaining dup variants and swap are rare mid-chain
            0x5a..=0x5f => self.values.clear(),
            // binary arithmetic, shifts, and logic
            0x60..=0x73 | 0x78..=0x83 => self.pop_push(2),
            // negation and primitive conversions
            0x74..=0x77 | 0x85..=0x93 => self.pop_push(1),
            // comparisons
            0x94..=0x98 => self.pop_push(2),
            opcodes::PUTSTATIC => self.pop(1),
            opcodes::PUTFIELD => self.pop(2),
            opcodes::NEWARRAY | opcodes::ANEWARRAY | opcodes::ARRAYLENGTH => self.pop_push(1),
            opcodes::CHECKCAST => {}
            opcodes::INSTANCEOF => self.pop_push(1),
            opcodes::MONITORENTER | opcodes::MONITOREXIT => self.pop(1),
            // branches, switches, returns, throws, and anything unmodeled
            _ => self.values.clear(),
        }
    }

    fn pop(&mut self, count: usize) {
        let remaining = self.values.len().saturating_sub(count);
        self.values.truncate(remaining);
    }

    fn pop_push(&mut self, count: usize) {
        self.pop(count);
        self.values.push(SimValue::unknown());
    }
}
