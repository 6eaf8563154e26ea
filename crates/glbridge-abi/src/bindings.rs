//! The binding table: which artifact functions a host may call, and how
//! each argument and result crosses the boundary.
//!
//! The table is a `static` slice checked at compile time. Adding a second
//! entry with an existing name, or putting a `Void` in a parameter slot,
//! fails the build rather than surfacing at runtime.

/// Type tag for a single argument or result slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    /// UTF-8 string passed by value. Parameter only.
    String,
    /// No value. Return only.
    Void,
}

/// Core wasm value types a [`ValueType`] lowers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreType {
    I32,
    I64,
    F32,
    F64,
}

impl CoreType {
    pub const fn name(self) -> &'static str {
        match self {
            CoreType::I32 => "i32",
            CoreType::I64 => "i64",
            CoreType::F32 => "f32",
            CoreType::F64 => "f64",
        }
    }
}

impl ValueType {
    pub const fn name(self) -> &'static str {
        match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::String => "string",
            ValueType::Void => "void",
        }
    }

    /// Core slots this type occupies in a wasm signature.
    ///
    /// Strings become a `(ptr, len)` pair pointing into artifact memory.
    pub const fn lower(self) -> &'static [CoreType] {
        match self {
            ValueType::I32 => &[CoreType::I32],
            ValueType::I64 => &[CoreType::I64],
            ValueType::F32 => &[CoreType::F32],
            ValueType::F64 => &[CoreType::F64],
            ValueType::String => &[CoreType::I32, CoreType::I32],
            ValueType::Void => &[],
        }
    }

    const fn valid_param(self) -> bool {
        !matches!(self, ValueType::Void)
    }

    const fn valid_return(self) -> bool {
        !matches!(self, ValueType::String)
    }
}

/// Declaration of one exported function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDescriptor {
    pub name: &'static str,
    pub params: &'static [ValueType],
    pub ret: ValueType,
}

impl BindingDescriptor {
    pub const fn new(name: &'static str, params: &'static [ValueType], ret: ValueType) -> Self {
        Self { name, params, ret }
    }

    /// Whether any parameter needs artifact memory to cross the boundary.
    pub fn takes_strings(&self) -> bool {
        self.params.iter().any(|p| *p == ValueType::String)
    }

    /// Number of core wasm parameters after lowering.
    pub fn core_param_count(&self) -> usize {
        self.params.iter().map(|p| p.lower().len()).sum()
    }

    /// Iterate lowered core parameter types in order.
    pub fn core_params(&self) -> impl Iterator<Item = CoreType> + '_ {
        self.params.iter().flat_map(|p| p.lower().iter().copied())
    }

    /// Lowered core result types.
    pub fn core_results(&self) -> &'static [CoreType] {
        self.ret.lower()
    }
}

const TABLE: &[BindingDescriptor] = &[
    BindingDescriptor::new("add", &[ValueType::I32, ValueType::I32], ValueType::I32),
    BindingDescriptor::new("render", &[ValueType::String], ValueType::Void),
];

const _: () = check_table(TABLE);

/// Every function a host may call on an artifact.
pub static BINDINGS: &[BindingDescriptor] = TABLE;

/// Find a descriptor by exported name.
pub fn lookup(name: &str) -> Option<&'static BindingDescriptor> {
    BINDINGS.iter().find(|d| d.name == name)
}

const fn str_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Compile-time validation of a binding table.
pub const fn check_table(table: &[BindingDescriptor]) {
    let mut i = 0;
    while i < table.len() {
        let entry = &table[i];
        if entry.name.is_empty() {
            panic!("binding with empty name");
        }
        let mut p = 0;
        while p < entry.params.len() {
            if !entry.params[p].valid_param() {
                panic!("void is not a valid parameter type");
            }
            p += 1;
        }
        if !entry.ret.valid_return() {
            panic!("strings cannot be returned by value");
        }
        let mut j = i + 1;
        while j < table.len() {
            if str_eq(entry.name, table[j].name) {
                panic!("duplicate binding name");
            }
            j += 1;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_exactly_add_and_render() {
        let names: Vec<_> = BINDINGS.iter().map(|d| d.name).collect();
        assert_eq!(names, ["add", "render"]);
    }

    #[test]
    fn lookup_finds_registered_names_only() {
        let add = lookup("add").expect("add registered");
        assert_eq!(add.params, &[ValueType::I32, ValueType::I32]);
        assert_eq!(add.ret, ValueType::I32);

        assert!(lookup("alloc").is_none());
        assert!(lookup("Render").is_none());
    }

    #[test]
    fn strings_lower_to_pointer_and_length() {
        let render = lookup("render").unwrap();
        assert!(render.takes_strings());
        assert_eq!(render.core_param_count(), 2);
        assert!(render.core_params().all(|t| t == CoreType::I32));
        assert!(render.core_results().is_empty());
    }

    #[test]
    #[should_panic(expected = "duplicate binding name")]
    fn duplicate_names_are_rejected() {
        check_table(&[
            BindingDescriptor::new("add", &[], ValueType::Void),
            BindingDescriptor::new("add", &[ValueType::I32], ValueType::I32),
        ]);
    }

    #[test]
    #[should_panic(expected = "strings cannot be returned")]
    fn string_returns_are_rejected() {
        check_table(&[BindingDescriptor::new("name", &[], ValueType::String)]);
    }
}
