//! Static inspection of artifact binaries.
//!
//! Extracts imports and exported functions with their core signatures
//! without compiling or instantiating anything.

use glbridge_abi::bindings::CoreType;
use glbridge_abi::{BindingDescriptor, BINDINGS};
use std::fmt;
use thiserror::Error;
use wasmparser::{
    ExportSectionReader, FunctionSectionReader, ImportSectionReader, Parser, Payload,
    TypeSectionReader,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Not a binary WebAssembly module")]
    NotBinary,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Function {index} refers to missing type {type_index}")]
    MissingType { index: u32, type_index: u32 },
}

/// A core function signature with only numeric value types.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FuncSignature {
    /// `None` marks a value type the bridge cannot carry (vectors, references).
    pub params: Vec<Option<&'static str>>,
    pub results: Vec<Option<&'static str>>,
}

impl FuncSignature {
    fn from_wasm(ty: &wasmparser::FuncType) -> Self {
        Self {
            params: ty.params().iter().map(core_name).collect(),
            results: ty.results().iter().map(core_name).collect(),
        }
    }

    /// Whether this signature equals the lowered form of `descriptor`.
    pub fn matches(&self, descriptor: &BindingDescriptor) -> bool {
        let params: Vec<_> = descriptor.core_params().map(|t| Some(t.name())).collect();
        let results: Vec<_> = descriptor
            .core_results()
            .iter()
            .map(|t| Some(t.name()))
            .collect();
        self.params == params && self.results == results
    }
}

impl fmt::Display for FuncSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |types: &[Option<&'static str>]| {
            types
                .iter()
                .map(|t| t.unwrap_or("?"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "({}) -> ({})", join(&self.params), join(&self.results))
    }
}

fn core_name(ty: &wasmparser::ValType) -> Option<&'static str> {
    let core = match ty {
        wasmparser::ValType::I32 => CoreType::I32,
        wasmparser::ValType::I64 => CoreType::I64,
        wasmparser::ValType::F32 => CoreType::F32,
        wasmparser::ValType::F64 => CoreType::F64,
        wasmparser::ValType::V128 | wasmparser::ValType::Ref(_) => return None,
    };
    Some(core.name())
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ManifestImport {
    pub module: String,
    pub name: String,
    /// `None` for non-function imports.
    pub signature: Option<FuncSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ManifestExport {
    pub name: String,
    /// `None` for memories, tables and globals.
    pub signature: Option<FuncSignature>,
}

/// Imports and exports of an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Manifest {
    pub imports: Vec<ManifestImport>,
    pub exports: Vec<ManifestExport>,
}

/// Raw section data collected while walking the binary.
#[derive(Default)]
struct Sections {
    types: Vec<Option<wasmparser::FuncType>>,
    functions: Vec<u32>,
    imported_functions: u32,
    imports: Vec<(String, String, Option<u32>)>,
    exports: Vec<(String, wasmparser::ExternalKind, u32)>,
}

impl Manifest {
    pub fn parse(wasm: &[u8]) -> Result<Self, ManifestError> {
        if !wasm.starts_with(b"\0asm") {
            return Err(ManifestError::NotBinary);
        }

        let mut sections = Sections::default();
        for payload in Parser::new(0).parse_all(wasm) {
            match payload.map_err(parse_error)? {
                Payload::TypeSection(reader) => sections.parse_types(reader)?,
                Payload::ImportSection(reader) => sections.parse_imports(reader)?,
                Payload::FunctionSection(reader) => sections.parse_functions(reader)?,
                Payload::ExportSection(reader) => sections.parse_exports(reader)?,
                _ => {}
            }
        }
        sections.into_manifest()
    }

    pub fn export(&self, name: &str) -> Option<&ManifestExport> {
        self.exports.iter().find(|e| e.name == name)
    }

    /// For every registered binding, whether this artifact exports it with
    /// the expected lowered signature.
    pub fn binding_coverage(&self) -> Vec<(&'static BindingDescriptor, bool)> {
        BINDINGS
            .iter()
            .map(|descriptor| {
                let ok = self
                    .export(descriptor.name)
                    .and_then(|e| e.signature.as_ref())
                    .map_or(false, |sig| sig.matches(descriptor));
                (descriptor, ok)
            })
            .collect()
    }
}

fn parse_error(e: wasmparser::BinaryReaderError) -> ManifestError {
    ManifestError::Parse(e.to_string())
}

impl Sections {
    fn parse_types(&mut self, reader: TypeSectionReader<'_>) -> Result<(), ManifestError> {
        for rec_group in reader {
            let rec_group = rec_group.map_err(parse_error)?;
            for ty in rec_group.into_types() {
                match ty.composite_type.inner {
                    wasmparser::CompositeInnerType::Func(func_type) => {
                        self.types.push(Some(func_type))
                    }
                    // Keep indices aligned for non-function types.
                    _ => self.types.push(None),
                }
            }
        }
        Ok(())
    }

    fn parse_imports(&mut self, reader: ImportSectionReader<'_>) -> Result<(), ManifestError> {
        for import in reader {
            let import = import.map_err(parse_error)?;
            let type_index = match import.ty {
                wasmparser::TypeRef::Func(idx) => {
                    self.imported_functions += 1;
                    Some(idx)
                }
                _ => None,
            };
            self.imports
                .push((import.module.to_string(), import.name.to_string(), type_index));
        }
        Ok(())
    }

    fn parse_functions(&mut self, reader: FunctionSectionReader<'_>) -> Result<(), ManifestError> {
        for func in reader {
            self.functions.push(func.map_err(parse_error)?);
        }
        Ok(())
    }

    fn parse_exports(&mut self, reader: ExportSectionReader<'_>) -> Result<(), ManifestError> {
        for export in reader {
            let export = export.map_err(parse_error)?;
            self.exports
                .push((export.name.to_string(), export.kind, export.index));
        }
        Ok(())
    }

    fn signature(&self, index: u32, type_index: u32) -> Result<FuncSignature, ManifestError> {
        self.types
            .get(type_index as usize)
            .and_then(|t| t.as_ref())
            .map(FuncSignature::from_wasm)
            .ok_or(ManifestError::MissingType { index, type_index })
    }

    /// Type index of a function in the combined (imports first) index space.
    fn function_type(&self, index: u32) -> Option<u32> {
        if index < self.imported_functions {
            self.imports
                .iter()
                .filter_map(|(_, _, ty)| *ty)
                .nth(index as usize)
        } else {
            self.functions
                .get((index - self.imported_functions) as usize)
                .copied()
        }
    }

    fn into_manifest(self) -> Result<Manifest, ManifestError> {
        let mut manifest = Manifest::default();

        for (index, (module, name, type_index)) in self.imports.iter().enumerate() {
            let signature = match type_index {
                Some(t) => Some(self.signature(index as u32, *t)?),
                None => None,
            };
            manifest.imports.push(ManifestImport {
                module: module.clone(),
                name: name.clone(),
                signature,
            });
        }

        for (name, kind, index) in &self.exports {
            let signature = match kind {
                wasmparser::ExternalKind::Func => {
                    let type_index = self.function_type(*index).ok_or(
                        ManifestError::MissingType {
                            index: *index,
                            type_index: u32::MAX,
                        },
                    )?;
                    Some(self.signature(*index, type_index)?)
                }
                _ => None,
            };
            manifest.exports.push(ManifestExport {
                name: name.clone(),
                signature,
            });
        }

        Ok(manifest)
    }
}
