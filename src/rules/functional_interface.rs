use std::collections::BTreeMap;

use anyhow::Result;
use serde_sarif::sarif::Result as SarifResult;

use crate::descriptor::{method_param_count, return_signature};
use crate::engine::AnalysisContext;
use crate::ir::{
    BootstrapArgument, CallKind, CallSite, Class, Instruction, InstructionKind, Method,
    MethodHandleRef,
};
use crate::opcodes;
use crate::rules::{method_location_with_line, result_message, Rule, RuleMetadata};
use crate::stack::SimStack;

/// Lambda bodies only appear in class files compiled for Java 8 or later.
const JAVA_8_MAJOR_VERSION: u16 = 52;

const STREAM: &str = "java/util/stream/Stream";
const LIST: &str = "java/util/List";
const OPTIONAL: &str = "java/util/Optional";
const COLLECT_DESCRIPTOR: &str = "(Ljava/util/stream/Collector;)Ljava/lang/Object;";
const FILTER_DESCRIPTOR: &str = "(Ljava/util/function/Predicate;)Ljava/util/stream/Stream;";
const FINDFIRST_DESCRIPTOR: &str = "()Ljava/util/Optional;";
const OBJECT_TO_BOOLEAN: &str = "(Ljava/lang/Object;)Z";
const VOID_TO_BOOLEAN: &str = "()Z";
const VOID_TO_INT: &str = "()I";
const INT_TO_OBJECT: &str = "(I)Ljava/lang/Object;";

/// Rule that detects misuse of functional interfaces and stream chains.
pub(crate) struct FunctionalInterfaceRule;

impl Rule for FunctionalInterfaceRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "FUNCTIONAL_INTERFACE",
            name: "Functional interface issues",
            description: "Misuse of lambdas, method references, and stream call chains",
        }
    }

    fn run(&self, context: &AnalysisContext) -> Result<Vec<SarifResult>> {
        let mut results = Vec::new();
        for class in context.analysis_target_classes() {
            let artifact_uri = context.class_artifact_uri(class);
            for finding in analyze_class(class) {
                let message = result_message(format!(
                    "{}: {}.{}{}",
                    finding.kind.message(),
                    class.name,
                    finding.method_name,
                    finding.method_descriptor
                ));
                let location = method_location_with_line(
                    &class.name,
                    &finding.method_name,
                    &finding.method_descriptor,
                    artifact_uri,
                    finding.line,
                );
                results.push(
                    SarifResult::builder()
                        .rule_id(finding.kind.id())
                        .message(message)
                        .locations(vec![location])
                        .build(),
                );
            }
        }
        Ok(results)
    }
}

/// Provenance label for values produced by stream call chains.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum StreamTag {
    CollectItem,
    FilterItem,
    FindFirstItem,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FindingKind {
    UseFunctionIdentity,
    UseMethodReference,
    CombineFilters,
    UseAnyMatch,
    UseFindFirst,
    AvoidContainsOnCollectedStream,
    AvoidSizeOnCollectedStream,
}

impl FindingKind {
    fn id(self) -> &'static str {
        match self {
            FindingKind::UseFunctionIdentity => "FII_USE_FUNCTION_IDENTITY",
            FindingKind::UseMethodReference => "FII_USE_METHOD_REFERENCE",
            FindingKind::CombineFilters => "FII_COMBINE_FILTERS",
            FindingKind::UseAnyMatch => "FII_USE_ANY_MATCH",
            FindingKind::UseFindFirst => "FII_USE_FIND_FIRST",
            FindingKind::AvoidContainsOnCollectedStream => {
                "FII_AVOID_CONTAINS_ON_COLLECTED_STREAM"
            }
            FindingKind::AvoidSizeOnCollectedStream => "FII_AVOID_SIZE_ON_COLLECTED_STREAM",
        }
    }

    fn message(self) -> &'static str {
        match self {
            FindingKind::UseFunctionIdentity => {
                "Use Function.identity() instead of a pass-through lambda"
            }
            FindingKind::UseMethodReference => {
                "Use a method reference instead of wrapping the call in a lambda"
            }
            FindingKind::CombineFilters => {
                "Combine consecutive filter predicates into a single filter"
            }
            FindingKind::UseAnyMatch => {
                "Use anyMatch instead of filter().findFirst().isPresent()"
            }
            FindingKind::UseFindFirst => {
                "Use findFirst instead of collecting and indexing the first element"
            }
            FindingKind::AvoidContainsOnCollectedStream => {
                "Avoid contains on a freshly collected stream; match on the stream directly"
            }
            FindingKind::AvoidSizeOnCollectedStream => {
                "Avoid size on a freshly collected stream; count on the stream directly"
            }
        }
    }
}

/// One confirmed issue, attributed to the enclosing method.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Finding {
    pub(crate) kind: FindingKind,
    pub(crate) method_name: String,
    pub(crate) method_descriptor: String,
    pub(crate) line: Option<i64>,
}

/// Pending functional-interface use recorded at an invokedynamic site,
/// keyed by the synthetic method it references.
#[derive(Clone, Debug)]
struct FiUse {
    method_name: String,
    method_descriptor: String,
    method_is_static: bool,
    line: Option<i64>,
    preceded_by_explicit_load: bool,
}

type PendingUses = BTreeMap<String, Vec<FiUse>>;

/// Run the whole two-phase analysis for one class. Classes below the
/// required bytecode level or without a bootstrap-method table cannot
/// contain lambda call sites and produce no findings.
pub(crate) fn analyze_class(class: &Class) -> Vec<Finding> {
    if class.major_version < JAVA_8_MAJOR_VERSION || class.bootstrap_methods.is_empty() {
        return Vec::new();
    }

    let mut findings = Vec::new();
    let mut pending = discover(class, &mut findings);
    let classified = classify(class, &mut pending);
    for (name, uses) in &pending {
        let Some(kind) = classified.get(name) else {
            continue;
        };
        for fi_use in uses {
            findings.push(Finding {
                kind: *kind,
                method_name: fi_use.method_name.clone(),
                method_descriptor: fi_use.method_descriptor.clone(),
                line: fi_use.line,
            });
        }
    }
    findings
}

/// Phase 1: walk every non-synthetic method, recording pending uses for
/// each accepted invokedynamic site and reporting stream-chain issues
/// found along the way.
fn discover(class: &Class, findings: &mut Vec<Finding>) -> PendingUses {
    let mut pending = PendingUses::new();
    for method in &class.methods {
        if method.access.is_synthetic {
            continue;
        }
        scan_normal_method(class, method, &mut pending, findings);
    }
    pending
}

fn scan_normal_method(
    class: &Class,
    method: &Method,
    pending: &mut PendingUses,
    findings: &mut Vec<Finding>,
) {
    let mut stack: SimStack<StreamTag> = SimStack::new();
    let mut previous: Option<&Instruction> = None;
    for instruction in &method.instructions {
        let mut produced_tag = None;
        match &instruction.kind {
            InstructionKind::InvokeDynamic {
                bootstrap_index, ..
            } => {
                if let Some(name) = synthetic_target_name(class, *bootstrap_index) {
                    let preceded = previous.is_some_and(is_explicit_load);
                    pending.entry(name.to_string()).or_default().push(FiUse {
                        method_name: method.name.clone(),
                        method_descriptor: method.descriptor.clone(),
                        method_is_static: method.access.is_static,
                        line: line_for_offset(method, instruction.offset),
                        preceded_by_explicit_load: preceded,
                    });
                }
            }
            InstructionKind::Invoke(call) => {
                produced_tag =
                    check_stream_chain(method, call, &stack, instruction.offset, findings);
            }
            _ => {}
        }
        stack.step(instruction);
        if let Some(tag) = produced_tag {
            stack.set_top_tag(tag);
        }
        previous = Some(instruction);
    }
}

/// Resolve the synthetic method an invokedynamic site targets, or `None`
/// when the site does not match the lambda shapes this rule reports.
fn synthetic_target_name(class: &Class, bootstrap_index: u16) -> Option<&str> {
    let handle = resolve_bootstrap_handle(class, bootstrap_index)?;
    if !handle.is_invoke_static() || handle.owner != class.name {
        return None;
    }
    let params = method_param_count(&handle.descriptor).ok()?;
    let returns_void = handle.descriptor.ends_with('V');
    // 1-parameter-void and 2-parameter-non-void targets are constructor
    // references or other synthetic idioms, not lambda bodies.
    if (params == 1 && returns_void) || (params == 2 && !returns_void) {
        return None;
    }
    let target = class
        .methods
        .iter()
        .find(|method| method.name == handle.name && method.descriptor == handle.descriptor)?;
    if !target.access.is_synthetic {
        return None;
    }
    Some(handle.name.as_str())
}

/// First bootstrap argument that is a method-handle constant.
fn resolve_bootstrap_handle(class: &Class, bootstrap_index: u16) -> Option<&MethodHandleRef> {
    let bootstrap = class.bootstrap_methods.get(bootstrap_index as usize)?;
    bootstrap.arguments.iter().find_map(|argument| match argument {
        BootstrapArgument::MethodHandle(handle) => Some(handle),
        BootstrapArgument::Other => None,
    })
}

fn is_explicit_load(instruction: &Instruction) -> bool {
    matches!(
        instruction.kind,
        InstructionKind::FieldGet { .. }
            | InstructionKind::LoadLocal {
                reference: true,
                ..
            }
    )
}

fn line_for_offset(method: &Method, offset: u32) -> Option<i64> {
    method
        .line_numbers
        .iter()
        .take_while(|entry| entry.start_pc <= offset)
        .last()
        .map(|entry| i64::from(entry.line))
}

fn check_stream_chain(
    method: &Method,
    call: &CallSite,
    stack: &SimStack<StreamTag>,
    offset: u32,
    findings: &mut Vec<Finding>,
) -> Option<StreamTag> {
    match call.kind {
        CallKind::Interface => {
            if call.name == "contains" && call.descriptor == OBJECT_TO_BOOLEAN {
                if let Some(receiver) = stack.value(1) {
                    if receiver.register.is_none()
                        && receiver.tag == Some(StreamTag::CollectItem)
                    {
                        findings.push(chain_finding(
                            FindingKind::AvoidContainsOnCollectedStream,
                            method,
                            offset,
                        ));
                    }
                }
                None
            } else if call.name == "size" && call.descriptor == VOID_TO_INT {
                if let Some(receiver) = stack.value(0) {
                    if receiver.register.is_none()
                        && receiver.tag == Some(StreamTag::CollectItem)
                    {
                        findings.push(chain_finding(
                            FindingKind::AvoidSizeOnCollectedStream,
                            method,
                            offset,
                        ));
                    }
                }
                None
            } else if is_call(call, STREAM, "collect", COLLECT_DESCRIPTOR) {
                Some(StreamTag::CollectItem)
            } else if is_call(call, STREAM, "filter", FILTER_DESCRIPTOR) {
                if let Some(receiver) = stack.value(1) {
                    if receiver.tag == Some(StreamTag::FilterItem) && receiver.register.is_none()
                    {
                        findings.push(chain_finding(FindingKind::CombineFilters, method, offset));
                    }
                }
                Some(StreamTag::FilterItem)
            } else if is_call(call, STREAM, "findFirst", FINDFIRST_DESCRIPTOR) {
                match stack.value(0) {
                    Some(receiver) if receiver.tag == Some(StreamTag::FilterItem) => {
                        Some(StreamTag::FindFirstItem)
                    }
                    _ => None,
                }
            } else if is_call(call, LIST, "get", INT_TO_OBJECT) {
                if let (Some(index), Some(receiver)) = (stack.value(0), stack.value(1)) {
                    if index.const_int == Some(0)
                        && receiver.tag == Some(StreamTag::CollectItem)
                        && receiver.register.is_none()
                    {
                        findings.push(chain_finding(FindingKind::UseFindFirst, method, offset));
                    }
                }
                None
            } else {
                None
            }
        }
        CallKind::Virtual => {
            if is_call(call, OPTIONAL, "isPresent", VOID_TO_BOOLEAN) {
                if let Some(receiver) = stack.value(0) {
                    if receiver.tag == Some(StreamTag::FindFirstItem)
                        && receiver.register.is_none()
                    {
                        findings.push(chain_finding(FindingKind::UseAnyMatch, method, offset));
                    }
                }
            }
            None
        }
        _ => None,
    }
}

fn is_call(call: &CallSite, owner: &str, name: &str, descriptor: &str) -> bool {
    call.owner == owner && call.name == name && call.descriptor == descriptor
}

fn chain_finding(kind: FindingKind, method: &Method, offset: u32) -> Finding {
    Finding {
        kind,
        method_name: method.name.clone(),
        method_descriptor: method.descriptor.clone(),
        line: line_for_offset(method, offset),
    }
}

/// Phase 2: classify every synthetic method that phase 1 recorded uses
/// for, pruning pending entries that turn out not to match.
fn classify(class: &Class, pending: &mut PendingUses) -> BTreeMap<String, FindingKind> {
    let mut classified = BTreeMap::new();
    for method in &class.methods {
        if !method.access.is_synthetic || !pending.contains_key(&method.name) {
            continue;
        }
        classify_synthetic_method(method, pending, &mut classified);
    }
    classified
}

fn classify_synthetic_method(
    method: &Method,
    pending: &mut PendingUses,
    classified: &mut BTreeMap<String, FindingKind>,
) {
    let Ok(params) = method_param_count(&method.descriptor) else {
        pending.remove(&method.name);
        return;
    };
    // javac never emits lambda bridges outside the 1..=2 parameter shape.
    if params < 1 || params > 2 {
        pending.remove(&method.name);
        return;
    }
    // Primitive and array returns are (un)boxing helpers, not user lambdas.
    if !return_signature(&method.descriptor).starts_with('L') {
        pending.remove(&method.name);
        return;
    }
    let two_parameters = params == 2;
    if two_parameters {
        if let Some(uses) = pending.get_mut(&method.name) {
            uses.retain(|fi_use| fi_use.method_is_static);
            if uses.is_empty() {
                pending.remove(&method.name);
                return;
            }
        }
    }

    match run_body_machine(method, two_parameters) {
        Outcome::Identity => {
            if let Some(uses) = pending.get_mut(&method.name) {
                // Values loaded from an existing field or local are
                // pass-through references, not identity misuse.
                uses.retain(|fi_use| !fi_use.preceded_by_explicit_load);
                if uses.is_empty() {
                    pending.remove(&method.name);
                    return;
                }
            }
            classified
                .entry(method.name.clone())
                .or_insert(FindingKind::UseFunctionIdentity);
        }
        Outcome::MethodReference => {
            classified
                .entry(method.name.clone())
                .or_insert(FindingKind::UseMethodReference);
        }
        Outcome::Disqualified => {
            pending.remove(&method.name);
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BodyState {
    SeenNothing,
    SeenAload0,
    SeenAload1,
    SeenInvoke,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Outcome {
    Identity,
    MethodReference,
    Disqualified,
}

enum Step {
    Continue(BodyState),
    Terminal(Outcome),
}

/// Drive the body state machine to a terminal outcome. A body that runs
/// out of instructions without reaching one is disqualified.
fn run_body_machine(method: &Method, two_parameters: bool) -> Outcome {
    let mut stack: SimStack<()> = SimStack::new();
    let mut state = BodyState::SeenNothing;
    let return_sig = return_signature(&method.descriptor);
    for instruction in &method.instructions {
        let step = body_step(state, instruction, two_parameters, &stack, return_sig);
        stack.step(instruction);
        match step {
            Step::Continue(next) => state = next,
            Step::Terminal(outcome) => return outcome,
        }
    }
    Outcome::Disqualified
}

fn body_step(
    state: BodyState,
    instruction: &Instruction,
    two_parameters: bool,
    stack: &SimStack<()>,
    return_sig: &str,
) -> Step {
    match state {
        BodyState::SeenNothing => match instruction.kind {
            InstructionKind::LoadLocal {
                slot: 0,
                reference: true,
            } => Step::Continue(BodyState::SeenAload0),
            _ => Step::Terminal(Outcome::Disqualified),
        },
        BodyState::SeenAload0 => match &instruction.kind {
            InstructionKind::Invoke(call)
                if matches!(call.kind, CallKind::Virtual | CallKind::Interface) =>
            {
                if call.descriptor.starts_with("()") {
                    Step::Continue(BodyState::SeenInvoke)
                } else {
                    Step::Terminal(Outcome::Disqualified)
                }
            }
            InstructionKind::LoadLocal {
                slot: 1,
                reference: true,
            } => {
                if two_parameters {
                    Step::Continue(BodyState::SeenAload1)
                } else {
                    Step::Terminal(Outcome::Disqualified)
                }
            }
            _ if instruction.opcode == opcodes::ARETURN && instruction.offset == 1 => {
                Step::Terminal(Outcome::Identity)
            }
            _ => Step::Terminal(Outcome::Disqualified),
        },
        BodyState::SeenAload1 => match &instruction.kind {
            InstructionKind::Invoke(call)
                if matches!(call.kind, CallKind::Virtual | CallKind::Interface) =>
            {
                // Compiler-inserted boxing helpers sit between the argument
                // load and the real call; skip them without a state change.
                if call.owner.starts_with("java/lang/")
                    && (call.name.ends_with("Value") || call.name == "valueOf")
                {
                    Step::Continue(BodyState::SeenAload1)
                } else if method_param_count(&call.descriptor).ok() == Some(1) {
                    Step::Continue(BodyState::SeenInvoke)
                } else {
                    Step::Terminal(Outcome::Disqualified)
                }
            }
            _ => Step::Terminal(Outcome::Disqualified),
        },
        BodyState::SeenInvoke => {
            if !opcodes::is_return(instruction.opcode) {
                return Step::Terminal(Outcome::Disqualified);
            }
            if let Some(top) = stack.value(0) {
                if let Some(signature) = &top.signature {
                    if signature != return_sig {
                        return Step::Terminal(Outcome::Disqualified);
                    }
                }
            }
            Step::Terminal(Outcome::MethodReference)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BootstrapMethod, LineNumber, MethodAccess};

    const CLASS: &str = "com/example/Chains";

    fn other(offset: u32, opcode: u8) -> Instruction {
        Instruction {
            offset,
            opcode,
            kind: InstructionKind::Other(opcode),
        }
    }

    fn aload(offset: u32, slot: u16) -> Instruction {
        Instruction {
            offset,
            opcode: opcodes::ALOAD_0 + slot as u8,
            kind: InstructionKind::LoadLocal {
                slot,
                reference: true,
            },
        }
    }

    fn areturn(offset: u32) -> Instruction {
        other(offset, opcodes::ARETURN)
    }

    fn iconst_0(offset: u32) -> Instruction {
        Instruction {
            offset,
            opcode: opcodes::ICONST_0,
            kind: InstructionKind::ConstInt(0),
        }
    }

    fn getstatic(offset: u32, descriptor: &str) -> Instruction {
        Instruction {
            offset,
            opcode: opcodes::GETSTATIC,
            kind: InstructionKind::FieldGet {
                is_static: true,
                descriptor: descriptor.to_string(),
            },
        }
    }

    fn getfield(offset: u32, descriptor: &str) -> Instruction {
        Instruction {
            offset,
            opcode: opcodes::GETFIELD,
            kind: InstructionKind::FieldGet {
                is_static: false,
                descriptor: descriptor.to_string(),
            },
        }
    }

    fn invoke(
        offset: u32,
        kind: CallKind,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Instruction {
        let opcode = match kind {
            CallKind::Virtual => opcodes::INVOKEVIRTUAL,
            CallKind::Interface => opcodes::INVOKEINTERFACE,
            CallKind::Special => opcodes::INVOKESPECIAL,
            CallKind::Static => opcodes::INVOKESTATIC,
        };
        Instruction {
            offset,
            opcode,
            kind: InstructionKind::Invoke(CallSite {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                kind,
            }),
        }
    }

    fn indy(offset: u32, bootstrap_index: u16) -> Instruction {
        Instruction {
            offset,
            opcode: opcodes::INVOKEDYNAMIC,
            kind: InstructionKind::InvokeDynamic {
                bootstrap_index,
                descriptor: "()Ljava/util/function/Function;".to_string(),
            },
        }
    }

    fn method_with(
        name: &str,
        descriptor: &str,
        is_static: bool,
        is_synthetic: bool,
        instructions: Vec<Instruction>,
    ) -> Method {
        Method {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: MethodAccess {
                is_public: !is_synthetic,
                is_static,
                is_synthetic,
            },
            instructions,
            line_numbers: Vec::new(),
        }
    }

    fn caller_with(instructions: Vec<Instruction>) -> Method {
        method_with("caller", "()V", true, false, instructions)
    }

    fn lambda_handle(name: &str, descriptor: &str) -> BootstrapMethod {
        BootstrapMethod {
            arguments: vec![
                BootstrapArgument::Other,
                BootstrapArgument::MethodHandle(MethodHandleRef {
                    kind: crate::ir::REF_INVOKE_STATIC,
                    owner: CLASS.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }),
            ],
        }
    }

    fn class_with(methods: Vec<Method>, bootstrap_methods: Vec<BootstrapMethod>) -> Class {
        Class {
            name: CLASS.to_string(),
            major_version: 52,
            bootstrap_methods,
            methods,
            artifact_index: 0,
            is_target: true,
        }
    }

    fn finding_kinds(class: &Class) -> Vec<FindingKind> {
        analyze_class(class)
            .into_iter()
            .map(|finding| finding.kind)
            .collect()
    }

    const IDENTITY_DESCRIPTOR: &str = "(Ljava/lang/Object;)Ljava/lang/Object;";

    fn identity_lambda() -> Method {
        method_with(
            "lambda$caller$0",
            IDENTITY_DESCRIPTOR,
            true,
            true,
            vec![aload(0, 0), areturn(1)],
        )
    }

    #[test]
    fn identity_lambda_is_reported() {
        let class = class_with(
            vec![caller_with(vec![indy(0, 0)]), identity_lambda()],
            vec![lambda_handle("lambda$caller$0", IDENTITY_DESCRIPTOR)],
        );

        assert_eq!(vec![FindingKind::UseFunctionIdentity], finding_kinds(&class));
    }

    #[test]
    fn old_class_files_produce_no_findings() {
        let mut class = class_with(
            vec![caller_with(vec![indy(0, 0)]), identity_lambda()],
            vec![lambda_handle("lambda$caller$0", IDENTITY_DESCRIPTOR)],
        );
        class.major_version = 51;

        assert!(finding_kinds(&class).is_empty());
    }

    #[test]
    fn missing_bootstrap_table_produces_no_findings() {
        let class = class_with(
            vec![caller_with(vec![indy(0, 0)]), identity_lambda()],
            Vec::new(),
        );

        assert!(finding_kinds(&class).is_empty());
    }

    #[test]
    fn identity_from_explicit_load_is_pruned() {
        let class = class_with(
            vec![
                caller_with(vec![
                    getfield(0, "Ljava/util/function/Function;"),
                    indy(3, 0),
                ]),
                identity_lambda(),
            ],
            vec![lambda_handle("lambda$caller$0", IDENTITY_DESCRIPTOR)],
        );

        assert!(finding_kinds(&class).is_empty());
    }

    #[test]
    fn identity_pruning_keeps_fresh_call_sites() {
        let class = class_with(
            vec![
                method_with(
                    "loaded",
                    "()V",
                    true,
                    false,
                    vec![getfield(0, "Ljava/util/function/Function;"), indy(3, 0)],
                ),
                method_with("fresh", "()V", true, false, vec![indy(0, 0)]),
                identity_lambda(),
            ],
            vec![lambda_handle("lambda$caller$0", IDENTITY_DESCRIPTOR)],
        );

        let findings = analyze_class(&class);

        assert_eq!(1, findings.len());
        assert_eq!(FindingKind::UseFunctionIdentity, findings[0].kind);
        assert_eq!("fresh", findings[0].method_name);
    }

    #[test]
    fn method_reference_body_is_reported() {
        let descriptor = "(Ljava/lang/String;)Ljava/lang/String;";
        let class = class_with(
            vec![
                caller_with(vec![indy(0, 0)]),
                method_with(
                    "lambda$caller$0",
                    descriptor,
                    true,
                    true,
                    vec![
                        aload(0, 0),
                        invoke(
                            1,
                            CallKind::Virtual,
                            "java/lang/String",
                            "trim",
                            "()Ljava/lang/String;",
                        ),
                        areturn(4),
                    ],
                ),
            ],
            vec![lambda_handle("lambda$caller$0", descriptor)],
        );

        assert_eq!(vec![FindingKind::UseMethodReference], finding_kinds(&class));
    }

    #[test]
    fn return_type_mismatch_disqualifies_method_reference() {
        let descriptor = "(Ljava/lang/String;)Ljava/lang/String;";
        let class = class_with(
            vec![
                caller_with(vec![indy(0, 0)]),
                method_with(
                    "lambda$caller$0",
                    descriptor,
                    true,
                    true,
                    vec![
                        aload(0, 0),
                        invoke(
                            1,
                            CallKind::Virtual,
                            "java/lang/String",
                            "length",
                            "()Ljava/lang/Integer;",
                        ),
                        areturn(4),
                    ],
                ),
            ],
            vec![lambda_handle("lambda$caller$0", descriptor)],
        );

        assert!(finding_kinds(&class).is_empty());
    }

    #[test]
    fn argument_call_body_is_reported_for_static_call_sites() {
        let descriptor = "(Lcom/example/Chains;Ljava/lang/String;)Ljava/lang/String;";
        let class = class_with(
            vec![
                caller_with(vec![indy(0, 0)]),
                method_with(
                    "lambda$caller$0",
                    descriptor,
                    true,
                    true,
                    vec![
                        aload(0, 0),
                        aload(1, 1),
                        invoke(
                            2,
                            CallKind::Virtual,
                            "java/lang/String",
                            "concat",
                            "(Ljava/lang/String;)Ljava/lang/String;",
                        ),
                        areturn(5),
                    ],
                ),
            ],
            vec![lambda_handle("lambda$caller$0", descriptor)],
        );

        assert_eq!(vec![FindingKind::UseMethodReference], finding_kinds(&class));
    }

    #[test]
    fn two_parameter_lambda_from_instance_call_site_is_never_reported() {
        let descriptor = "(Lcom/example/Chains;Ljava/lang/String;)Ljava/lang/String;";
        let instance_caller = method_with("caller", "()V", false, false, vec![indy(0, 0)]);
        let class = class_with(
            vec![
                instance_caller,
                method_with(
                    "lambda$caller$0",
                    descriptor,
                    true,
                    true,
                    vec![
                        aload(0, 0),
                        aload(1, 1),
                        invoke(
                            2,
                            CallKind::Virtual,
                            "java/lang/String",
                            "concat",
                            "(Ljava/lang/String;)Ljava/lang/String;",
                        ),
                        areturn(5),
                    ],
                ),
            ],
            vec![lambda_handle("lambda$caller$0", descriptor)],
        );

        assert!(finding_kinds(&class).is_empty());
    }

    #[test]
    fn boxing_helper_calls_are_skipped_in_place() {
        let descriptor = "(Ljava/lang/StringBuilder;Ljava/lang/Integer;)Ljava/lang/StringBuilder;";
        let class = class_with(
            vec![
                caller_with(vec![indy(0, 0)]),
                method_with(
                    "lambda$caller$0",
                    descriptor,
                    true,
                    true,
                    vec![
                        aload(0, 0),
                        aload(1, 1),
                        invoke(2, CallKind::Virtual, "java/lang/Integer", "intValue", "()I"),
                        invoke(
                            5,
                            CallKind::Virtual,
                            "java/lang/StringBuilder",
                            "append",
                            "(I)Ljava/lang/StringBuilder;",
                        ),
                        areturn(8),
                    ],
                ),
            ],
            vec![lambda_handle("lambda$caller$0", descriptor)],
        );

        assert_eq!(vec![FindingKind::UseMethodReference], finding_kinds(&class));
    }

    #[test]
    fn parameterless_synthetic_methods_are_pruned() {
        let descriptor = "()Ljava/lang/Object;";
        let class = class_with(
            vec![
                caller_with(vec![indy(0, 0)]),
                method_with(
                    "lambda$caller$0",
                    descriptor,
                    true,
                    true,
                    vec![aload(0, 0), areturn(1)],
                ),
            ],
            vec![lambda_handle("lambda$caller$0", descriptor)],
        );

        assert!(finding_kinds(&class).is_empty());
    }

    #[test]
    fn three_parameter_synthetic_methods_are_pruned() {
        let descriptor =
            "(Ljava/lang/Object;Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;";
        let class = class_with(
            vec![
                caller_with(vec![indy(0, 0)]),
                method_with(
                    "lambda$caller$0",
                    descriptor,
                    true,
                    true,
                    vec![aload(0, 0), areturn(1)],
                ),
            ],
            vec![lambda_handle("lambda$caller$0", descriptor)],
        );

        assert!(finding_kinds(&class).is_empty());
    }

    #[test]
    fn primitive_returning_synthetic_methods_are_pruned() {
        let descriptor = "(Ljava/lang/Object;)I";
        let class = class_with(
            vec![
                caller_with(vec![indy(0, 0)]),
                method_with(
                    "lambda$caller$0",
                    descriptor,
                    true,
                    true,
                    vec![aload(0, 0), areturn(1)],
                ),
            ],
            vec![lambda_handle("lambda$caller$0", descriptor)],
        );

        assert!(finding_kinds(&class).is_empty());
    }

    #[test]
    fn handle_owned_by_another_class_is_ignored() {
        let mut bootstrap = lambda_handle("lambda$caller$0", IDENTITY_DESCRIPTOR);
        if let BootstrapArgument::MethodHandle(handle) = &mut bootstrap.arguments[1] {
            handle.owner = "com/example/Other".to_string();
        }
        let class = class_with(
            vec![caller_with(vec![indy(0, 0)]), identity_lambda()],
            vec![bootstrap],
        );

        assert!(finding_kinds(&class).is_empty());
    }

    #[test]
    fn non_synthetic_target_is_ignored() {
        let mut target = identity_lambda();
        target.access.is_synthetic = false;
        let class = class_with(
            vec![caller_with(vec![indy(0, 0)]), target],
            vec![lambda_handle("lambda$caller$0", IDENTITY_DESCRIPTOR)],
        );

        assert!(finding_kinds(&class).is_empty());
    }

    fn stream_local() -> Instruction {
        aload(0, 1)
    }

    fn filter_at(offset: u32) -> Instruction {
        invoke(offset, CallKind::Interface, STREAM, "filter", FILTER_DESCRIPTOR)
    }

    fn collect_at(offset: u32) -> Instruction {
        invoke(offset, CallKind::Interface, STREAM, "collect", COLLECT_DESCRIPTOR)
    }

    fn predicate_at(offset: u32) -> Instruction {
        getstatic(offset, "Ljava/util/function/Predicate;")
    }

    fn chain_class(instructions: Vec<Instruction>) -> Class {
        class_with(
            vec![method_with("chain", "()V", false, false, instructions)],
            vec![BootstrapMethod {
                arguments: Vec::new(),
            }],
        )
    }

    #[test]
    fn chained_filters_are_reported() {
        let class = chain_class(vec![
            stream_local(),
            predicate_at(1),
            filter_at(4),
            predicate_at(9),
            filter_at(12),
        ]);

        assert_eq!(vec![FindingKind::CombineFilters], finding_kinds(&class));
    }

    #[test]
    fn filter_find_first_is_present_is_reported() {
        let class = chain_class(vec![
            stream_local(),
            predicate_at(1),
            filter_at(4),
            invoke(9, CallKind::Interface, STREAM, "findFirst", FINDFIRST_DESCRIPTOR),
            invoke(14, CallKind::Virtual, OPTIONAL, "isPresent", VOID_TO_BOOLEAN),
        ]);

        assert_eq!(vec![FindingKind::UseAnyMatch], finding_kinds(&class));
    }

    #[test]
    fn collect_then_get_zero_is_reported() {
        let class = chain_class(vec![
            stream_local(),
            getstatic(1, "Ljava/util/stream/Collector;"),
            collect_at(4),
            iconst_0(9),
            invoke(10, CallKind::Interface, LIST, "get", INT_TO_OBJECT),
        ]);

        assert_eq!(vec![FindingKind::UseFindFirst], finding_kinds(&class));
    }

    #[test]
    fn collect_then_size_is_reported() {
        let class = chain_class(vec![
            stream_local(),
            getstatic(1, "Ljava/util/stream/Collector;"),
            collect_at(4),
            invoke(9, CallKind::Interface, "java/util/Collection", "size", VOID_TO_INT),
        ]);

        assert_eq!(
            vec![FindingKind::AvoidSizeOnCollectedStream],
            finding_kinds(&class)
        );
    }

    #[test]
    fn collect_then_contains_is_reported() {
        let class = chain_class(vec![
            stream_local(),
            getstatic(1, "Ljava/util/stream/Collector;"),
            collect_at(4),
            aload(9, 2),
            invoke(
                10,
                CallKind::Interface,
                "java/util/Collection",
                "contains",
                OBJECT_TO_BOOLEAN,
            ),
        ]);

        assert_eq!(
            vec![FindingKind::AvoidContainsOnCollectedStream],
            finding_kinds(&class)
        );
    }

    #[test]
    fn collected_value_bound_to_a_local_is_not_reported() {
        let class = chain_class(vec![
            stream_local(),
            getstatic(1, "Ljava/util/stream/Collector;"),
            collect_at(4),
            other(9, 0x4d), // astore_2
            aload(10, 2),
            invoke(11, CallKind::Interface, "java/util/Collection", "size", VOID_TO_INT),
        ]);

        assert!(finding_kinds(&class).is_empty());
    }

    #[test]
    fn chain_findings_carry_source_lines() {
        let mut class = chain_class(vec![
            stream_local(),
            predicate_at(1),
            filter_at(4),
            predicate_at(9),
            filter_at(12),
        ]);
        class.methods[0].line_numbers = vec![
            LineNumber {
                start_pc: 0,
                line: 30,
            },
            LineNumber {
                start_pc: 12,
                line: 31,
            },
        ];

        let findings = analyze_class(&class);

        assert_eq!(1, findings.len());
        assert_eq!(Some(31), findings[0].line);
    }

    #[test]
    fn analysis_is_idempotent() {
        let class = class_with(
            vec![caller_with(vec![indy(0, 0)]), identity_lambda()],
            vec![lambda_handle("lambda$caller$0", IDENTITY_DESCRIPTOR)],
        );

        let first = analyze_class(&class);
        let second = analyze_class(&class);

        assert_eq!(first, second);
    }
}
