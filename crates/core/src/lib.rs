//! rzview
//!
//! Typed, queryable model of a binary (or a raw code buffer) loaded into the rizin
//! analysis engine.
//!
//! The engine is driven through its textual command protocol; this crate turns its
//! JSON replies into typed records (sections, strings, symbols, functions, flags,
//! cross-references), caches each view after its first computation, runs the
//! expensive analysis pass at most once per session, and resolves raw addresses to
//! the nearest preceding named location.
//!
//! ```no_run
//! use rzview::{Session, SessionConfig};
//!
//! # fn main() -> Result<(), rzview::SessionError> {
//! let session = Session::open("/bin/ls", &SessionConfig::default())?;
//! let (name, offset) = session.resolve(session.baddr()? + 0x20)?;
//! println!("{name}+{offset:#x}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod resolver;
pub mod session;
pub mod source;

pub use config::SessionConfig;
pub use engine::{Engine, OpenTarget};
pub use error::{SessionError, SessionResult};
pub use model::{
    BinaryInfo, Flag, Function, Perm, Record, Section, StringEntry, Symbol, SymbolBind,
    SymbolType, Xref,
};
pub use resolver::{FlagIndex, SymbolicAddress, XrefIndex};
pub use session::Session;
pub use source::{ArchSpec, CodeHost, Source};

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
