//! Typed records decoded from the engine's JSON replies.
//!
//! Each record kind declares the fields it understands; anything else the engine emits
//! is dropped during decoding so newer engine versions that add fields keep working.
//! Records are plain data snapshots and may outlive the session that produced them.

use std::fmt;
use std::ops::Add;

use bitflags::bitflags;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{SessionError, SessionResult};

bitflags! {
    /// Memory permission bits. Values match the emulator-side protection constants
    /// (read=1, write=2, exec=4).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Perm: u32 {
        const READ = 1;
        const WRITE = 2;
        const EXEC = 4;
    }
}

impl Perm {
    /// Convert an engine permission string such as `"-rwx"` or `"r-x"`.
    ///
    /// Characters other than `r`, `w` and `x` contribute nothing.
    pub fn from_perm_str(perm: &str) -> Self {
        perm.chars().fold(Perm::empty(), |acc, ch| match ch {
            'r' => acc | Perm::READ,
            'w' => acc | Perm::WRITE,
            'x' => acc | Perm::EXEC,
            _ => acc,
        })
    }
}

impl fmt::Display for Perm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(3);
        out.push(if self.contains(Perm::READ) { 'r' } else { '-' });
        out.push(if self.contains(Perm::WRITE) { 'w' } else { '-' });
        out.push(if self.contains(Perm::EXEC) { 'x' } else { '-' });
        f.write_str(&out)
    }
}

fn perm_from_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Perm, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(Perm::from_perm_str).unwrap_or_else(Perm::empty))
}

fn perm_to_str<S: Serializer>(perm: &Perm, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(perm)
}

/// A record kind that can be built from one engine JSON object.
pub trait Record: DeserializeOwned {
    /// Short label used in error messages.
    const KIND: &'static str;

    /// Build the record from a field mapping, reading only the declared fields.
    fn from_fields(fields: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(fields)
    }
}

/// Decode a JSON array reply into records, failing on the first malformed entry.
pub(crate) fn decode_list<T: Record>(command: &str, reply: &Value) -> SessionResult<Vec<T>> {
    let entries = reply.as_array().ok_or_else(|| {
        SessionError::protocol(command, format!("expected a JSON array of {} records", T::KIND))
    })?;
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            T::from_fields(entry).map_err(|e| {
                SessionError::protocol(command, format!("{} record #{idx}: {e}", T::KIND))
            })
        })
        .collect()
}

/// A section as reported by the binary loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub vsize: u64,
    /// File offset.
    #[serde(default)]
    pub paddr: u64,
    #[serde(default)]
    pub vaddr: u64,
    #[serde(
        default = "Perm::empty",
        deserialize_with = "perm_from_str",
        serialize_with = "perm_to_str"
    )]
    pub perm: Perm,
}

impl Record for Section {
    const KIND: &'static str = "section";
}

/// A string literal found anywhere in the file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StringEntry {
    pub string: String,
    #[serde(default)]
    pub vaddr: u64,
    #[serde(default)]
    pub paddr: u64,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Length in characters.
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub section: Option<String>,
}

impl Record for StringEntry {
    const KIND: &'static str = "string";
}

/// Symbol binding class, following the engine's binary metadata model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SymbolBind {
    Local,
    Global,
    Weak,
    Num,
    Loos,
    Hios,
    Loproc,
    Hiproc,
    Import,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Symbol type tag, following the engine's binary metadata model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SymbolType {
    NoType,
    Obj,
    Func,
    Field,
    Iface,
    Meth,
    Static,
    Sect,
    File,
    Common,
    Tls,
    Num,
    Loos,
    Hios,
    Loproc,
    Hiproc,
    Spcl,
    #[default]
    #[serde(other)]
    Unk,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    /// Demangled / original name.
    #[serde(default)]
    pub realname: String,
    #[serde(default)]
    pub bind: SymbolBind,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default)]
    pub kind: SymbolType,
    #[serde(default)]
    pub vaddr: u64,
    #[serde(default)]
    pub paddr: u64,
    #[serde(default)]
    pub is_imported: bool,
}

impl Record for Symbol {
    const KIND: &'static str = "symbol";
}

/// A function discovered by the analysis pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub offset: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub signature: String,
}

impl Function {
    /// Whether `addr` falls inside `[offset, offset + size)`.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.offset && addr - self.offset < self.size
    }
}

/// `function + delta` yields the absolute address `delta` bytes into the function.
impl Add<u64> for &Function {
    type Output = u64;

    fn add(self, delta: u64) -> u64 {
        self.offset.wrapping_add(delta)
    }
}

impl Add<u64> for Function {
    type Output = u64;

    fn add(self, delta: u64) -> u64 {
        &self + delta
    }
}

impl Record for Function {
    const KIND: &'static str = "function";
}

/// A named address. Flags are the unit of address resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flag {
    pub offset: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

impl Flag {
    pub fn new(offset: u64, name: impl Into<String>) -> Self {
        Self { offset, name: name.into(), size: 0 }
    }
}

impl Record for Flag {
    const KIND: &'static str = "flag";
}

/// A directed cross-reference from `fromaddr` to `addr`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawXref")]
pub struct Xref {
    pub name: String,
    #[serde(rename = "from")]
    pub fromaddr: u64,
    pub refname: String,
    pub addr: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

// Engine versions disagree on whether the destination is `addr` or `to`.
#[derive(Deserialize)]
struct RawXref {
    #[serde(default)]
    name: String,
    from: u64,
    #[serde(default)]
    refname: String,
    #[serde(default)]
    addr: Option<u64>,
    #[serde(default)]
    to: Option<u64>,
    #[serde(rename = "type", default)]
    kind: String,
}

impl From<RawXref> for Xref {
    fn from(raw: RawXref) -> Self {
        Self {
            name: raw.name,
            fromaddr: raw.from,
            refname: raw.refname,
            addr: raw.addr.or(raw.to).unwrap_or_default(),
            kind: raw.kind,
        }
    }
}

impl Record for Xref {
    const KIND: &'static str = "xref";
}

/// Binary metadata (`iIj`). Only the fields below are kept.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BinaryInfo {
    #[serde(default)]
    pub baddr: u64,
    #[serde(default)]
    pub bintype: String,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub bits: Option<u32>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub endian: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub machine: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub stripped: Option<bool>,
    #[serde(rename = "static", default)]
    pub is_static: Option<bool>,
}

impl Record for BinaryInfo {
    const KIND: &'static str = "binary info";
}
