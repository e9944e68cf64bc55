//! Runtime values for the Gibbon VM.
//!
//! Values form a closed tagged union. Scalars are stored inline; heap
//! variants (strings, containers, functions) are shared through `Rc`.
//! Containers are immutable: builtins that "modify" an array return a new
//! array instead.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::instruction::Instructions;

/// Canonical `true` value.
pub const TRUE: Value = Value::Boolean(true);
/// Canonical `false` value.
pub const FALSE: Value = Value::Boolean(false);
/// Canonical `null` value.
pub const NULL: Value = Value::Null;

/// A Gibbon runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(Rc<str>),
    Null,
    Array(Rc<Vec<Value>>),
    Hash(Rc<HashMap>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(&'static Builtin),
    Error(Rc<str>),
    Regex(Rc<RegexValue>),
}

/// Insertion-ordered mapping from hash keys to their original key/value pair.
pub type HashMap = IndexMap<HashKey, HashPair>;

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(Rc::from(s.into()))
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::from(message.into()))
    }

    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(elements))
    }

    pub fn from_native_bool(value: bool) -> Value {
        if value {
            TRUE
        } else {
            FALSE
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Int",
            Value::Float(_) => "Float",
            Value::Boolean(_) => "Bool",
            Value::String(_) => "String",
            Value::Null => "Null",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::CompiledFunction(_) => "Function",
            Value::Closure(_) => "Function",
            Value::Builtin(_) => "Builtin",
            Value::Error(_) => "Error",
            Value::Regex(_) => "Regex",
        }
    }

    /// Everything is truthy except `false` and `null`. Zero, empty strings,
    /// and empty containers are truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Produce the hash key for this value, if it can be used as one.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey::integer(*n)),
            Value::Boolean(b) => Some(HashKey::boolean(*b)),
            Value::String(s) => Some(HashKey::string(s)),
            _ => None,
        }
    }
}

// Scalars and strings compare by value; containers and functions compare by
// identity. Mixed int/float pairs promote the integer side.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Integer(b)) => *a == (*b as f64),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Regex(a), Value::Regex(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Null => write!(f, "null"),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (_, pair)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::CompiledFunction(func) => {
                write!(f, "<fn/{}>", func.num_parameters)
            }
            Value::Closure(closure) => {
                write!(f, "<fn/{}>", closure.function.num_parameters)
            }
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            Value::Error(message) => write!(f, "error: {}", message),
            Value::Regex(regex) => write!(f, "/{}/", regex.pattern),
        }
    }
}

/// Type tag of a hash key. Part of the key, so keys of distinct types never
/// collide even when their numeric fingerprints match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashTag {
    Integer,
    Boolean,
    String,
}

/// A type-tagged 64-bit fingerprint usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub tag: HashTag,
    pub value: u64,
}

impl HashKey {
    pub fn integer(value: i64) -> Self {
        Self {
            tag: HashTag::Integer,
            value: value as u64,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            tag: HashTag::Boolean,
            value: value as u64,
        }
    }

    pub fn string(value: &str) -> Self {
        Self {
            tag: HashTag::String,
            value: fnv1a_64(value.as_bytes()),
        }
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// A hash entry, preserving the original key value for display and iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// A function body produced by the compiler.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    /// Stack slots to reserve above the arguments.
    pub num_locals: usize,
    pub num_parameters: usize,
}

impl CompiledFunction {
    pub fn new(instructions: Instructions, num_locals: usize, num_parameters: usize) -> Self {
        Self {
            instructions,
            num_locals,
            num_parameters,
        }
    }
}

/// A compiled function paired with the values it captured at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

impl Closure {
    pub fn new(function: Rc<CompiledFunction>) -> Self {
        Self {
            function,
            free: Vec::new(),
        }
    }
}

/// A host function callable from Gibbon code.
///
/// `None` means "no interesting result"; the VM pushes `null`. Failures come
/// back as `Value::Error`, pushed like any other value.
pub type BuiltinFn = fn(&[Value]) -> Option<Value>;

/// A named builtin in the host registry.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

/// A compiled regular expression with its source pattern.
#[derive(Debug)]
pub struct RegexValue {
    pub pattern: String,
    pub regex: regex::Regex,
}
