//! One engine instance plus the typed, cached views derived from it.
//!
//! Views are computed on first access and then returned by reference for the life of
//! the session. They are snapshots: nothing refreshes them if the image changes later.
//! Views that depend on the whole-binary analysis pass go through the analysis gate,
//! which issues that pass at most once per session.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::engine::{Engine, OpenTarget};
use crate::error::{SessionError, SessionResult};
use crate::model::{
    decode_list, BinaryInfo, Flag, Function, Record, Section, StringEntry, Symbol, Xref,
};
use crate::resolver::{FlagIndex, SymbolicAddress, XrefIndex};
use crate::source::{ArchSpec, CodeHost, Source};

/// Whole-binary analysis pass.
pub const ANALYZE_CMD: &str = "aaa";
pub const SECTIONS_CMD: &str = "iSj";
pub const STRINGS_CMD: &str = "izzj";
pub const SYMBOLS_CMD: &str = "isj";
pub const FUNCTIONS_CMD: &str = "aflj";
pub const FLAGS_CMD: &str = "fj";
pub const XREFS_CMD: &str = "axj";
pub const BINARY_INFO_CMD: &str = "iIj";

/// Longest command prefix written to logs; `wx` payloads can be huge.
const LOG_PREVIEW: usize = 64;

/// Bytes per `wx` command. Hex doubles this, which keeps each line far below the
/// 4096-byte line buffer rizin reads commands into.
const WRITE_CHUNK: usize = 1024;

struct EngineState {
    engine: Box<dyn Engine>,
    analyzed: bool,
    closed: bool,
}

impl EngineState {
    fn run(&mut self, command: &str, timeout: Option<Duration>) -> SessionResult<String> {
        let started = Instant::now();
        let reply = self.engine.cmd(command, timeout)?;
        debug!(
            engine = self.engine.name(),
            command = command.get(..LOG_PREVIEW).unwrap_or(command),
            reply_len = reply.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "engine command"
        );
        Ok(reply)
    }

    fn run_json(&mut self, command: &str, timeout: Option<Duration>) -> SessionResult<Value> {
        let reply = self.run(command, timeout)?;
        serde_json::from_str(&reply).map_err(|e| SessionError::protocol(command, e))
    }

    /// The analysis gate. Callers hold the session lock, so check-then-act is atomic.
    fn ensure_analyzed(&mut self, timeout: Option<Duration>) -> SessionResult<()> {
        if !self.analyzed {
            info!(engine = self.engine.name(), "running whole-binary analysis");
            self.run(ANALYZE_CMD, timeout)?;
            self.analyzed = true;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> SessionResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.engine.close()
    }
}

/// A typed, queryable model of one binary or code buffer loaded into an engine.
///
/// `Session` is `Send + Sync`. Engine traffic, the analysis flag and view population
/// are serialized by one lock; populated views are read without it.
pub struct Session {
    state: Mutex<EngineState>,
    config: SessionConfig,
    sections: OnceCell<BTreeMap<String, Section>>,
    strings: OnceCell<BTreeMap<String, StringEntry>>,
    symbols: OnceCell<BTreeMap<String, u64>>,
    functions: OnceCell<BTreeMap<String, Function>>,
    flags: OnceCell<FlagIndex>,
    xrefs: OnceCell<XrefIndex>,
    binary_info: OnceCell<BinaryInfo>,
}

impl Session {
    /// Open `source` in a fresh rizin process.
    #[cfg(feature = "rizin-backend")]
    pub fn open(source: impl Into<Source>, config: &SessionConfig) -> SessionResult<Self> {
        let engine = crate::engine::RizinPipe::new(config.resolve_rizin_path());
        Self::with_engine(engine, source.into(), config)
    }

    /// Open whatever a host is running (its code buffer, else its binary) in rizin.
    #[cfg(feature = "rizin-backend")]
    pub fn open_host(host: &dyn CodeHost, config: &SessionConfig) -> SessionResult<Self> {
        let engine = crate::engine::RizinPipe::new(config.resolve_rizin_path());
        Self::with_engine_for_host(engine, host, config)
    }

    /// Like [`Session::open_host`], with a caller-supplied engine.
    pub fn with_engine_for_host<E: Engine + 'static>(
        engine: E,
        host: &dyn CodeHost,
        config: &SessionConfig,
    ) -> SessionResult<Self> {
        let source = Source::from_host(host)?;
        let arch = host.arch().or_else(|| config.arch.clone());
        Self::with_engine(engine, source, &config.clone().with_arch(arch))
    }

    /// Open `source` with a caller-supplied engine.
    ///
    /// Buffers are written into the engine right after opening, and their
    /// architecture is configured when `config.arch` is set. If any step after the
    /// engine starts fails, the engine is released before the error is returned.
    pub fn with_engine<E: Engine + 'static>(
        engine: E,
        source: Source,
        config: &SessionConfig,
    ) -> SessionResult<Self> {
        let (uri, perm) = source.open_parts()?;
        // Loading a large binary can take as long as analysing it.
        let target = OpenTarget {
            uri,
            perm,
            load_addr: config.load_addr,
            base_addr: config.base_addr,
            startup_timeout: config.analysis_timeout(),
        };

        let session = Self::new(Box::new(engine), config.clone());
        session.lock()?.engine.open(&target)?;

        if let Source::Bytes(code) = &source {
            session.write(config.load_addr, code)?;
            match &config.arch {
                Some(arch) => session.configure_arch(arch)?,
                None => debug!("no architecture information; keeping engine defaults"),
            }
        }

        info!(
            uri = %target.uri,
            load_addr = target.load_addr,
            base_addr = ?target.base_addr,
            "session opened"
        );
        Ok(session)
    }

    fn new(engine: Box<dyn Engine>, config: SessionConfig) -> Self {
        Self {
            state: Mutex::new(EngineState { engine, analyzed: false, closed: false }),
            config,
            sections: OnceCell::new(),
            strings: OnceCell::new(),
            symbols: OnceCell::new(),
            functions: OnceCell::new(),
            flags: OnceCell::new(),
            xrefs: OnceCell::new(),
            binary_info: OnceCell::new(),
        }
    }

    fn lock(&self) -> SessionResult<MutexGuard<'_, EngineState>> {
        self.state.lock().map_err(|_| {
            SessionError::EngineUnavailable("session lock poisoned by a panicking thread".into())
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Send one raw command and return its textual reply.
    pub fn cmd(&self, command: &str) -> SessionResult<String> {
        self.lock()?.run(command, self.config.command_timeout())
    }

    /// Send one command whose reply must be JSON.
    pub fn cmdj(&self, command: &str) -> SessionResult<Value> {
        self.lock()?.run_json(command, self.config.command_timeout())
    }

    /// Set the disassembler architecture and word size.
    pub fn configure_arch(&self, arch: &ArchSpec) -> SessionResult<()> {
        let name = arch.engine_name();
        self.cmd(&format!("e asm.arch={name}; e asm.bits={}", arch.bits))?;
        debug!(arch = %name, bits = arch.bits, "architecture configured");
        Ok(())
    }

    /// Read `size` bytes at `addr`.
    pub fn read(&self, addr: u64, size: usize) -> SessionResult<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let command = format!("p8 {size} @ {addr:#x}");
        let reply = self.cmd(&command)?;
        let bytes = hex::decode(reply.trim()).map_err(|e| SessionError::protocol(&command, e))?;
        if bytes.len() != size {
            return Err(SessionError::protocol(
                &command,
                format!("expected {size} bytes, got {}", bytes.len()),
            ));
        }
        Ok(bytes)
    }

    /// Write `bytes` at `addr`. Already-computed views are not refreshed.
    ///
    /// Large buffers go out as several `wx` commands so no command line outgrows the
    /// engine's prompt buffer. The session lock is held across all of them.
    pub fn write(&self, addr: u64, bytes: &[u8]) -> SessionResult<()> {
        let mut state = self.lock()?;
        for (idx, chunk) in bytes.chunks(WRITE_CHUNK).enumerate() {
            let at = addr.wrapping_add((idx * WRITE_CHUNK) as u64);
            let command = format!("wx {} @ {at:#x}", hex::encode(chunk));
            state.run(&command, self.config.command_timeout())?;
        }
        Ok(())
    }

    /// Run the whole-binary analysis pass if it has not run yet.
    pub fn analyze(&self) -> SessionResult<()> {
        self.lock()?.ensure_analyzed(self.config.analysis_timeout())
    }

    pub fn is_analyzed(&self) -> bool {
        self.state.lock().map(|state| state.analyzed).unwrap_or(false)
    }

    fn query<T: Record>(&self, command: &str, needs_analysis: bool) -> SessionResult<Vec<T>> {
        let reply = {
            let mut state = self.lock()?;
            if needs_analysis {
                state.ensure_analyzed(self.config.analysis_timeout())?;
            }
            state.run_json(command, self.config.command_timeout())?
        };
        let records = decode_list(command, &reply)?;
        debug!(command, kind = T::KIND, count = records.len(), "view populated");
        Ok(records)
    }

    /// Sections by name.
    pub fn sections(&self) -> SessionResult<&BTreeMap<String, Section>> {
        self.sections.get_or_try_init(|| {
            let sections: Vec<Section> = self.query(SECTIONS_CMD, false)?;
            Ok(sections.into_iter().map(|s| (s.name.clone(), s)).collect())
        })
    }

    /// Strings by content. Duplicate contents keep the last entry reported.
    pub fn strings(&self) -> SessionResult<&BTreeMap<String, StringEntry>> {
        self.strings.get_or_try_init(|| {
            let strings: Vec<StringEntry> = self.query(STRINGS_CMD, false)?;
            Ok(strings.into_iter().map(|s| (s.string.clone(), s)).collect())
        })
    }

    /// Symbol name to virtual address. The rest of each symbol record is dropped.
    pub fn symbols(&self) -> SessionResult<&BTreeMap<String, u64>> {
        self.symbols.get_or_try_init(|| {
            let symbols: Vec<Symbol> = self.query(SYMBOLS_CMD, false)?;
            Ok(symbols.into_iter().map(|s| (s.name, s.vaddr)).collect())
        })
    }

    /// Analyzed functions by name.
    pub fn functions(&self) -> SessionResult<&BTreeMap<String, Function>> {
        self.functions.get_or_try_init(|| {
            let functions: Vec<Function> = self.query(FUNCTIONS_CMD, true)?;
            Ok(functions.into_iter().map(|f| (f.name.clone(), f)).collect())
        })
    }

    /// Flags ordered by offset.
    pub fn flags(&self) -> SessionResult<&FlagIndex> {
        self.flags.get_or_try_init(|| {
            let flags: Vec<Flag> = self.query(FLAGS_CMD, true)?;
            Ok(FlagIndex::new(flags))
        })
    }

    /// Cross-references indexed by source and destination.
    pub fn xrefs(&self) -> SessionResult<&XrefIndex> {
        self.xrefs.get_or_try_init(|| {
            let xrefs: Vec<Xref> = self.query(XREFS_CMD, true)?;
            Ok(XrefIndex::new(xrefs))
        })
    }

    pub fn binary_info(&self) -> SessionResult<&BinaryInfo> {
        self.binary_info.get_or_try_init(|| {
            let reply = self.cmdj(BINARY_INFO_CMD)?;
            BinaryInfo::from_fields(&reply)
                .map_err(|e| SessionError::protocol(BINARY_INFO_CMD, e))
        })
    }

    pub fn baddr(&self) -> SessionResult<u64> {
        Ok(self.binary_info()?.baddr)
    }

    pub fn bintype(&self) -> SessionResult<&str> {
        Ok(self.binary_info()?.bintype.as_str())
    }

    /// Nearest flag at or below `addr`, and the distance from it.
    pub fn at(&self, addr: u64) -> SessionResult<(&Flag, u64)> {
        self.flags()?.at(addr)
    }

    /// Name of the nearest flag at or below `addr`, and the distance from it.
    pub fn resolve(&self, addr: u64) -> SessionResult<(&str, u64)> {
        let (flag, offset) = self.at(addr)?;
        Ok((flag.name.as_str(), offset))
    }

    /// `resolve` as a printable `name+0xoff` reference.
    pub fn symbolize(&self, addr: u64) -> SessionResult<SymbolicAddress<'_>> {
        let (name, offset) = self.resolve(addr)?;
        Ok(SymbolicAddress { name, offset })
    }

    /// The last cross-reference reported with source `addr`.
    pub fn ref_from(&self, addr: u64) -> SessionResult<Option<&Xref>> {
        Ok(self.xrefs()?.ref_from(addr))
    }

    /// Every cross-reference with source `addr`.
    pub fn refs_from(&self, addr: u64) -> SessionResult<Vec<&Xref>> {
        Ok(self.xrefs()?.refs_from(addr))
    }

    /// Every cross-reference with destination `addr`.
    pub fn ref_to(&self, addr: u64) -> SessionResult<Vec<&Xref>> {
        Ok(self.xrefs()?.ref_to(addr))
    }

    /// The innermost analyzed function whose range contains `addr`.
    pub fn function_at(&self, addr: u64) -> SessionResult<Option<&Function>> {
        Ok(self.functions()?.values().filter(|f| f.contains(addr)).max_by_key(|f| f.offset))
    }

    /// Snapshot of flag offsets to names, for hosts that symbolize traces themselves.
    pub fn symbol_map(&self) -> SessionResult<BTreeMap<u64, String>> {
        Ok(self.flags()?.symbol_map())
    }

    /// Release the engine now instead of on drop.
    pub fn close(self) -> SessionResult<()> {
        let mut state = self.lock()?;
        let result = state.shutdown();
        drop(state);
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = state.shutdown() {
            warn!(error = %e, "failed to release engine");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("analyzed", &self.is_analyzed())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
