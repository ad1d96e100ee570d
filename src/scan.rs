use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool;
use jclassfile::methods::MethodFlags;
use serde_json::Value;
use serde_sarif::sarif::{Artifact, ArtifactLocation, ArtifactRoles};
use zip::ZipArchive;

use crate::ir::{
    BootstrapArgument, BootstrapMethod, CallKind, CallSite, Class, Instruction, InstructionKind,
    LineNumber, Method, MethodAccess, MethodHandleRef,
};
use crate::opcodes;

/// Snapshot of parsed artifacts, classes, and counts for a scan.
pub(crate) struct ScanOutput {
    pub(crate) artifacts: Vec<Artifact>,
    pub(crate) class_count: usize,
    pub(crate) classes: Vec<Class>,
}

pub(crate) fn scan_inputs(input: &Path, classpath: &[PathBuf]) -> Result<ScanOutput> {
    let mut artifacts = Vec::new();
    let mut class_count = 0;
    let mut classes = Vec::new();

    scan_path(input, true, true, &mut artifacts, &mut class_count, &mut classes)?;

    // Keep deterministic ordering by sorting classpath entries and directory listings.
    let mut classpath_entries = classpath.to_vec();
    classpath_entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in classpath_entries {
        scan_path(&entry, false, true, &mut artifacts, &mut class_count, &mut classes)?;
    }

    Ok(ScanOutput {
        artifacts,
        class_count,
        classes,
    })
}

fn scan_path(
    path: &Path,
    is_input: bool,
    strict: bool,
    artifacts: &mut Vec<Artifact>,
    class_count: &mut usize,
    classes: &mut Vec<Class>,
) -> Result<()> {
    if path.is_dir() {
        scan_dir(path, is_input, artifacts, class_count, classes)?;
        return Ok(());
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    let roles = if is_input {
        Some(vec![
            serde_json::to_value(ArtifactRoles::AnalysisTarget).expect("serialize artifact role"),
        ])
    } else {
        None
    };

    match extension {
        "class" => scan_class_file(path, is_input, roles, artifacts, class_count, classes),
        "jar" => scan_jar_file(path, is_input, roles, artifacts, class_count, classes),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn scan_dir(
    path: &Path,
    is_input: bool,
    artifacts: &mut Vec<Artifact>,
    class_count: &mut usize,
    classes: &mut Vec<Class>,
) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        if entry.is_dir() {
            scan_dir(&entry, is_input, artifacts, class_count, classes)?;
        } else {
            scan_path(&entry, is_input, false, artifacts, class_count, classes)?;
        }
    }

    Ok(())
}

fn scan_class_file(
    path: &Path,
    is_target: bool,
    roles: Option<Vec<Value>>,
    artifacts: &mut Vec<Artifact>,
    class_count: &mut usize,
    classes: &mut Vec<Class>,
) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed =
        parse_class_bytes(&data).with_context(|| format!("failed to parse {}", path.display()))?;
    *class_count += 1;

    let artifact_index = push_path_artifact(path, roles, data.len() as u64, None, artifacts)?;
    classes.push(Class {
        name: parsed.name,
        major_version: parsed.major_version,
        bootstrap_methods: parsed.bootstrap_methods,
        methods: parsed.methods,
        artifact_index,
        is_target,
    });
    Ok(())
}

fn scan_jar_file(
    path: &Path,
    is_target: bool,
    roles: Option<Vec<Value>>,
    artifacts: &mut Vec<Artifact>,
    class_count: &mut usize,
    classes: &mut Vec<Class>,
) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let jar_len = fs::metadata(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .len();
    let jar_index = push_path_artifact(path, roles, jar_len, None, artifacts)?;

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class") && !name.ends_with("module-info.class") {
            entry_names.push(name);
        }
    }

    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let parsed = parse_class_bytes(&data)
            .with_context(|| format!("failed to parse {}:{}", path.display(), name))?;
        *class_count += 1;

        let entry_uri = jar_entry_uri(path, &name);
        let artifact_index = push_artifact(entry_uri, entry.size(), Some(jar_index), None, artifacts);
        classes.push(Class {
            name: parsed.name,
            major_version: parsed.major_version,
            bootstrap_methods: parsed.bootstrap_methods,
            methods: parsed.methods,
            artifact_index,
            is_target,
        });
    }

    Ok(())
}

/// Push a path-based artifact and return its index for parent linkage (e.g., JAR entries).
fn push_path_artifact(
    path: &Path,
    roles: Option<Vec<Value>>,
    len: u64,
    parent_index: Option<i64>,
    artifacts: &mut Vec<Artifact>,
) -> Result<i64> {
    let uri = path_to_uri(path);
    Ok(push_artifact(uri, len, parent_index, roles, artifacts))
}

fn push_artifact(
    uri: String,
    len: u64,
    parent_index: Option<i64>,
    roles: Option<Vec<Value>>,
    artifacts: &mut Vec<Artifact>,
) -> i64 {
    let location = ArtifactLocation::builder().uri(uri).build();
    let artifact = match (parent_index, roles) {
        (Some(parent_index), Some(roles)) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .roles(roles)
            .build(),
        (Some(parent_index), None) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .build(),
        (None, Some(roles)) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .roles(roles)
            .build(),
        (None, None) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .build(),
    };
    let index = artifacts.len() as i64;
    artifacts.push(artifact);
    index
}

fn path_to_uri(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn jar_entry_uri(jar_path: &Path, entry_name: &str) -> String {
    format!("jar:{}!/{}", jar_path.to_string_lossy(), entry_name)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Parsed class data extracted from class file bytes.
struct ParsedClass {
    name: String,
    major_version: u16,
    bootstrap_methods: Vec<BootstrapMethod>,
    methods: Vec<Method>,
}

fn parse_class_bytes(data: &[u8]) -> Result<ParsedClass> {
    let class_file = class_file::parse(data).context("failed to parse class file bytes")?;
    let constant_pool = class_file.constant_pool();
    let name =
        resolve_class_name(constant_pool, class_file.this_class()).context("resolve class name")?;
    let bootstrap_methods = parse_bootstrap_methods(constant_pool, class_file.attributes())
        .context("parse bootstrap methods")?;
    let methods =
        parse_methods(constant_pool, class_file.methods()).context("parse method bytecode")?;

    Ok(ParsedClass {
        name,
        major_version: class_file.major_version(),
        bootstrap_methods,
        methods,
    })
}

fn resolve_class_name(constant_pool: &[ConstantPool], class_index: u16) -> Result<String> {
    let entry = constant_pool
        .get(class_index as usize)
        .context("missing class entry")?;
    match entry {
        ConstantPool::Class { name_index } => resolve_utf8(constant_pool, *name_index),
        _ => anyhow::bail!("unexpected class entry"),
    }
}

fn resolve_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<String> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing utf8 entry")?;
    match entry {
        ConstantPool::Utf8 { value } => Ok(value.clone()),
        _ => anyhow::bail!("unexpected utf8 entry"),
    }
}

fn resolve_name_and_type(constant_pool: &[ConstantPool], index: u16) -> Result<(u16, u16)> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing name and type entry")?;
    match entry {
        ConstantPool::NameAndType {
            name_index,
            descriptor_index,
        } => Ok((*name_index, *descriptor_index)),
        _ => anyhow::bail!("unexpected name and type entry"),
    }
}

/// Resolved constant pool member reference.
struct MemberRef {
    owner: String,
    name: String,
    descriptor: String,
}

fn resolve_method_ref(constant_pool: &[ConstantPool], index: u16) -> Result<MemberRef> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing method ref entry")?;
    let (class_index, name_and_type_index) = match entry {
        ConstantPool::Methodref {
            class_index,
            name_and_type_index,
        } => (*class_index, *name_and_type_index),
        ConstantPool::InterfaceMethodref {
            class_index,
            name_and_type_index,
        } => (*class_index, *name_and_type_index),
        _ => anyhow::bail!("unexpected method ref entry"),
    };
    resolve_member(constant_pool, class_index, name_and_type_index)
}

fn resolve_field_ref(constant_pool: &[ConstantPool], index: u16) -> Result<MemberRef> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing field ref entry")?;
    let ConstantPool::Fieldref {
        class_index,
        name_and_type_index,
    } = entry
    else {
        anyhow::bail!("unexpected field ref entry");
    };
    resolve_member(constant_pool, *class_index, *name_and_type_index)
}

fn resolve_member(
    constant_pool: &[ConstantPool],
    class_index: u16,
    name_and_type_index: u16,
) -> Result<MemberRef> {
    let owner = resolve_class_name(constant_pool, class_index).context("resolve owner")?;
    let (name_index, descriptor_index) = resolve_name_and_type(constant_pool, name_and_type_index)?;
    let name = resolve_utf8(constant_pool, name_index).context("resolve member name")?;
    let descriptor =
        resolve_utf8(constant_pool, descriptor_index).context("resolve member descriptor")?;
    Ok(MemberRef {
        owner,
        name,
        descriptor,
    })
}

fn parse_bootstrap_methods(
    constant_pool: &[ConstantPool],
    attributes: &[jclassfile::attributes::Attribute],
) -> Result<Vec<BootstrapMethod>> {
    let mut parsed = Vec::new();
    for attribute in attributes {
        let jclassfile::attributes::Attribute::BootstrapMethods { bootstrap_methods } = attribute
        else {
            continue;
        };
        for record in bootstrap_methods {
            let mut arguments = Vec::new();
            for argument_index in record.bootstrap_arguments() {
                arguments.push(resolve_bootstrap_argument(constant_pool, *argument_index));
            }
            parsed.push(BootstrapMethod { arguments });
        }
    }
    Ok(parsed)
}

fn resolve_bootstrap_argument(constant_pool: &[ConstantPool], index: u16) -> BootstrapArgument {
    let Some(ConstantPool::MethodHandle {
        reference_kind,
        reference_index,
    }) = constant_pool.get(index as usize)
    else {
        return BootstrapArgument::Other;
    };
    // Field-handle kinds reference a Fieldref and are not lambda targets.
    match resolve_method_ref(constant_pool, *reference_index) {
        Ok(reference) => BootstrapArgument::MethodHandle(MethodHandleRef {
            kind: *reference_kind,
            owner: reference.owner,
            name: reference.name,
            descriptor: reference.descriptor,
        }),
        Err(_) => BootstrapArgument::Other,
    }
}

fn parse_methods(
    constant_pool: &[ConstantPool],
    methods: &[jclassfile::methods::MethodInfo],
) -> Result<Vec<Method>> {
    let mut parsed = Vec::new();
    for method in methods {
        let name =
            resolve_utf8(constant_pool, method.name_index()).context("resolve method name")?;
        let descriptor = resolve_utf8(constant_pool, method.descriptor_index())
            .context("resolve method descriptor")?;
        let access_flags = method.access_flags();
        let access = MethodAccess {
            is_public: access_flags.contains(MethodFlags::ACC_PUBLIC),
            is_static: access_flags.contains(MethodFlags::ACC_STATIC),
            is_synthetic: access_flags.contains(MethodFlags::ACC_SYNTHETIC),
        };
        let code = method
            .attributes()
            .iter()
            .find_map(|attribute| match attribute {
                jclassfile::attributes::Attribute::Code {
                    code, attributes, ..
                } => Some((code, attributes)),
                _ => None,
            });
        let (instructions, line_numbers) = match code {
            Some((code, code_attributes)) => (
                decode_instructions(code, constant_pool).context("decode bytecode")?,
                parse_line_numbers(code_attributes),
            ),
            None => (Vec::new(), Vec::new()),
        };
        parsed.push(Method {
            name,
            descriptor,
            access,
            instructions,
            line_numbers,
        });
    }
    Ok(parsed)
}

fn parse_line_numbers(attributes: &[jclassfile::attributes::Attribute]) -> Vec<LineNumber> {
    let mut entries = Vec::new();
    for attribute in attributes {
        let jclassfile::attributes::Attribute::LineNumberTable { line_number_table } = attribute
        else {
            continue;
        };
        for record in line_number_table {
            entries.push(LineNumber {
                start_pc: record.start_pc() as u32,
                line: record.line_number() as u32,
            });
        }
    }
    entries.sort_by_key(|entry| entry.start_pc);
    entries
}

fn decode_instructions(code: &[u8], constant_pool: &[ConstantPool]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let opcode = code[offset];
        let start_offset = offset as u32;
        let length = opcode_length(code, offset)?;
        if length == 0 || offset + length > code.len() {
            anyhow::bail!("invalid bytecode length at offset {}", offset);
        }
        let kind = match opcode {
            opcodes::INVOKEVIRTUAL
            | opcodes::INVOKESPECIAL
            | opcodes::INVOKESTATIC
            | opcodes::INVOKEINTERFACE => {
                let method_index = read_u16(code, offset + 1)?;
                let method_ref = resolve_method_ref(constant_pool, method_index)
                    .context("resolve method ref")?;
                let call_kind = match opcode {
                    opcodes::INVOKESPECIAL => CallKind::Special,
                    opcodes::INVOKESTATIC => CallKind::Static,
                    opcodes::INVOKEINTERFACE => CallKind::Interface,
                    _ => CallKind::Virtual,
                };
                InstructionKind::Invoke(CallSite {
                    owner: method_ref.owner,
                    name: method_ref.name,
                    descriptor: method_ref.descriptor,
                    kind: call_kind,
                })
            }
            opcodes::INVOKEDYNAMIC => {
                let entry_index = read_u16(code, offset + 1)?;
                let (bootstrap_index, descriptor) =
                    resolve_invoke_dynamic(constant_pool, entry_index)
                        .context("resolve invokedynamic")?;
                InstructionKind::InvokeDynamic {
                    bootstrap_index,
                    descriptor,
                }
            }
            opcodes::GETSTATIC | opcodes::GETFIELD => {
                let field_index = read_u16(code, offset + 1)?;
                let field_ref =
                    resolve_field_ref(constant_pool, field_index).context("resolve field ref")?;
                InstructionKind::FieldGet {
                    is_static: opcode == opcodes::GETSTATIC,
                    descriptor: field_ref.descriptor,
                }
            }
            opcodes::ILOAD..=opcodes::DLOAD => InstructionKind::LoadLocal {
                slot: operand_u8(code, offset)? as u16,
                reference: false,
            },
            opcodes::ALOAD => InstructionKind::LoadLocal {
                slot: operand_u8(code, offset)? as u16,
                reference: true,
            },
            opcodes::ILOAD_0..=0x29 => InstructionKind::LoadLocal {
                slot: u16::from((opcode - opcodes::ILOAD_0) % 4),
                reference: false,
            },
            opcodes::ALOAD_0..=opcodes::ALOAD_3 => InstructionKind::LoadLocal {
                slot: u16::from(opcode - opcodes::ALOAD_0),
                reference: true,
            },
            opcodes::ICONST_M1..=opcodes::ICONST_5 => {
                InstructionKind::ConstInt(i64::from(opcode) - i64::from(opcodes::ICONST_0))
            }
            opcodes::BIPUSH => InstructionKind::ConstInt(i64::from(operand_u8(code, offset)? as i8)),
            opcodes::SIPUSH => {
                InstructionKind::ConstInt(i64::from(read_u16(code, offset + 1)? as i16))
            }
            _ => InstructionKind::Other(opcode),
        };

        instructions.push(Instruction {
            offset: start_offset,
            opcode,
            kind,
        });
        offset += length;
    }
    Ok(instructions)
}

fn resolve_invoke_dynamic(constant_pool: &[ConstantPool], index: u16) -> Result<(u16, String)> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing invokedynamic entry")?;
    let ConstantPool::InvokeDynamic {
        bootstrap_method_attr_index,
        name_and_type_index,
    } = entry
    else {
        anyhow::bail!("unexpected invokedynamic entry");
    };
    let (_, descriptor_index) = resolve_name_and_type(constant_pool, *name_and_type_index)?;
    let descriptor = resolve_utf8(constant_pool, descriptor_index)?;
    Ok((*bootstrap_method_attr_index, descriptor))
}

fn operand_u8(code: &[u8], offset: usize) -> Result<u8> {
    code.get(offset + 1)
        .copied()
        .context("bytecode operand out of bounds")
}

fn opcode_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code[offset];
    let length = match opcode {
        0x00..=0x0f => 1,
        opcodes::BIPUSH => 2,
        opcodes::SIPUSH => 3,
        opcodes::LDC => 2,
        opcodes::LDC_W | opcodes::LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x4e => 1,
        0x4f..=0x56 => 1,
        0x57..=0x5f => 1,
        0x60..=0x83 => 1,
        opcodes::IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa6 => 3,
        opcodes::GOTO | opcodes::JSR => 3,
        opcodes::RET => 2,
        opcodes::TABLESWITCH => tableswitch_length(code, offset)?,
        opcodes::LOOKUPSWITCH => lookupswitch_length(code, offset)?,
        0xac..=0xb1 => 1,
        0xb2..=0xb5 => 3,
        opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKESTATIC => 3,
        opcodes::INVOKEINTERFACE | opcodes::INVOKEDYNAMIC => 5,
        opcodes::NEW => 3,
        opcodes::NEWARRAY => 2,
        opcodes::ANEWARRAY => 3,
        opcodes::ARRAYLENGTH | opcodes::ATHROW => 1,
        opcodes::CHECKCAST | opcodes::INSTANCEOF => 3,
        opcodes::MONITORENTER | opcodes::MONITOREXIT => 1,
        opcodes::WIDE => wide_length(code, offset)?,
        opcodes::MULTIANEWARRAY => 4,
        opcodes::IFNULL | opcodes::IFNONNULL => 3,
        opcodes::GOTO_W | opcodes::JSR_W => 5,
        0xca => 1,
        0xfe | 0xff => 1,
        _ => anyhow::bail!("unsupported opcode 0x{:02x}", opcode),
    };
    Ok(length)
}

fn tableswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|v| v.checked_add(1))
        .context("invalid tableswitch range")?;
    if count < 0 {
        anyhow::bail!("invalid tableswitch range");
    }
    Ok(1 + padding + 12 + (count as usize) * 4)
}

fn lookupswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let npairs = read_i32(code, base + 4)?;
    if npairs < 0 {
        anyhow::bail!("invalid lookupswitch pairs");
    }
    Ok(1 + padding + 8 + (npairs as usize) * 8)
}

fn wide_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code
        .get(offset + 1)
        .copied()
        .context("missing wide opcode")?;
    if opcode == opcodes::IINC { Ok(6) } else { Ok(4) }
}

fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let slice = code
        .get(offset..offset + 2)
        .context("bytecode u16 out of bounds")?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    let slice = code
        .get(offset..offset + 4)
        .context("bytecode u32 out of bounds")?;
    Ok(i32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
