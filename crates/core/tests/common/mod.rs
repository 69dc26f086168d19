#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rzview::{Engine, OpenTarget, SessionError, SessionResult};

/// Longest line rizin's prompt reads in one piece; anything longer gets split.
pub const ENGINE_LINE_LIMIT: usize = 4096;

/// What a [`ScriptedEngine`] saw, shared with the test after the engine moves into a session.
#[derive(Debug, Default)]
pub struct EngineLog {
    pub opened: Option<OpenTarget>,
    pub commands: Vec<String>,
    pub timeouts: Vec<Option<Duration>>,
    pub closes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<EngineLog>>);

impl Recorder {
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().unwrap().commands.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.0.lock().unwrap().commands.iter().filter(|c| c.as_str() == command).count()
    }

    /// Timeouts passed with every command starting with `prefix`, in order.
    pub fn timeouts_for(&self, prefix: &str) -> Vec<Option<Duration>> {
        let log = self.0.lock().unwrap();
        log.commands
            .iter()
            .zip(&log.timeouts)
            .filter(|(command, _)| command.starts_with(prefix))
            .map(|(_, timeout)| *timeout)
            .collect()
    }

    pub fn opened(&self) -> Option<OpenTarget> {
        self.0.lock().unwrap().opened.clone()
    }

    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }
}

/// In-process engine: emulates `wx`/`p8` over a byte buffer, accepts `aaa` and `e`
/// commands, and serves canned replies for everything else. A canned reply for an
/// exact command wins over the emulation.
pub struct ScriptedEngine {
    memory: Vec<u8>,
    load_addr: u64,
    replies: HashMap<String, String>,
    recorder: Recorder,
    fail_open: bool,
    fail_on: Option<String>,
    analysis_delay: Option<Duration>,
}

impl ScriptedEngine {
    pub fn new() -> (Self, Recorder) {
        let recorder = Recorder::default();
        let engine = Self {
            memory: Vec::new(),
            load_addr: 0,
            replies: HashMap::new(),
            recorder: recorder.clone(),
            fail_open: false,
            fail_on: None,
            analysis_delay: None,
        };
        (engine, recorder)
    }

    pub fn reply(mut self, command: &str, body: &str) -> Self {
        self.replies.insert(command.to_string(), body.to_string());
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Fail every command starting with `prefix`.
    pub fn failing_on(mut self, prefix: &str) -> Self {
        self.fail_on = Some(prefix.to_string());
        self
    }

    pub fn slow_analysis(mut self, delay: Duration) -> Self {
        self.analysis_delay = Some(delay);
        self
    }

    fn offset(&self, addr: u64, len: usize) -> SessionResult<usize> {
        let start = addr
            .checked_sub(self.load_addr)
            .ok_or_else(|| SessionError::EngineUnavailable(format!("unmapped {addr:#x}")))?
            as usize;
        if start + len > self.memory.len() {
            return Err(SessionError::EngineUnavailable(format!("unmapped {addr:#x}+{len}")));
        }
        Ok(start)
    }
}

fn parse_addr(text: &str) -> u64 {
    let text = text.trim();
    match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).unwrap(),
        None => text.parse().unwrap(),
    }
}

impl Engine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&mut self, target: &OpenTarget) -> SessionResult<()> {
        self.recorder.0.lock().unwrap().opened = Some(target.clone());
        if self.fail_open {
            return Err(SessionError::EngineUnavailable("scripted open failure".into()));
        }
        if let Some(len) = target.uri.strip_prefix("malloc://") {
            self.memory = vec![0; len.parse().unwrap()];
        }
        self.load_addr = target.load_addr;
        Ok(())
    }

    fn cmd(&mut self, command: &str, timeout: Option<Duration>) -> SessionResult<String> {
        {
            let mut log = self.recorder.0.lock().unwrap();
            log.commands.push(command.to_string());
            log.timeouts.push(timeout);
        }
        assert!(
            command.len() < ENGINE_LINE_LIMIT,
            "command of {} bytes would be split by the engine",
            command.len()
        );
        if self.fail_on.as_deref().is_some_and(|prefix| command.starts_with(prefix)) {
            return Err(SessionError::EngineUnavailable(format!("scripted failure for {command}")));
        }
        if let Some(reply) = self.replies.get(command) {
            return Ok(reply.clone());
        }

        if command == "aaa" {
            if let Some(delay) = self.analysis_delay {
                std::thread::sleep(delay);
            }
            return Ok(String::new());
        }
        if let Some(rest) = command.strip_prefix("wx ") {
            let (data, addr) = rest.split_once(" @ ").unwrap();
            let bytes = hex::decode(data).unwrap();
            let start = self.offset(parse_addr(addr), bytes.len())?;
            self.memory[start..start + bytes.len()].copy_from_slice(&bytes);
            return Ok(String::new());
        }
        if let Some(rest) = command.strip_prefix("p8 ") {
            let (len, addr) = rest.split_once(" @ ").unwrap();
            let len: usize = len.parse().unwrap();
            let start = self.offset(parse_addr(addr), len)?;
            return Ok(format!("{}\n", hex::encode(&self.memory[start..start + len])));
        }
        Ok(String::new())
    }

    fn close(&mut self) -> SessionResult<()> {
        self.recorder.0.lock().unwrap().closes += 1;
        Ok(())
    }
}

pub const SECTIONS_JSON: &str = r#"[
  {"name":".text","size":64,"vsize":64,"perm":"-r-x","paddr":0,"vaddr":0,"flags":"0x6"},
  {"name":".data","size":16,"vsize":32,"perm":"-rw-","paddr":64,"vaddr":64}
]"#;

pub const STRINGS_JSON: &str = r#"[
  {"vaddr":96,"paddr":96,"ordinal":0,"size":6,"length":5,"section":".data",
   "type":"ascii","string":"hello"},
  {"vaddr":112,"paddr":112,"ordinal":1,"size":6,"length":5,"type":"ascii","string":"world"},
  {"vaddr":128,"paddr":128,"ordinal":2,"size":6,"length":5,"section":".data",
   "type":"ascii","string":"hello"}
]"#;

pub const SYMBOLS_JSON: &str = r#"[
  {"name":"start","realname":"start","bind":"GLOBAL","size":16,"type":"FUNC",
   "vaddr":16,"paddr":16,"is_imported":false},
  {"name":"imp.puts","realname":"puts","bind":"GLOBAL","size":0,"type":"FUNC",
   "vaddr":256,"paddr":0,"is_imported":true}
]"#;

pub const FUNCTIONS_JSON: &str = r#"[
  {"offset":16,"name":"start","size":16,"signature":"void start();","nbbs":2},
  {"offset":32,"name":"mid","size":24,"signature":"int mid(int);"}
]"#;

// Engine order is deliberately not sorted.
pub const FLAGS_JSON: &str = r#"[
  {"name":"mid","size":24,"offset":32},
  {"name":"start","size":16,"offset":16},
  {"name":"section..data","size":16,"offset":64}
]"#;

pub const XREFS_JSON: &str = r#"[
  {"from":20,"type":"CALL","addr":32,"name":"start","refname":"mid"},
  {"from":20,"type":"DATA","addr":96,"name":"start","refname":"str.hello"},
  {"from":40,"type":"DATA","addr":96,"name":"mid","refname":"str.hello"},
  {"from":44,"type":"JMP","addr":16,"name":"mid","refname":"start"}
]"#;

pub const BINARY_INFO_JSON: &str =
    r#"{"arch":"arm","baddr":4194304,"bintype":"any","bits":64,"endian":"little","canary":false}"#;

/// A scripted engine answering every view command with the fixtures above.
pub fn fixture_engine() -> (ScriptedEngine, Recorder) {
    let (engine, recorder) = ScriptedEngine::new();
    let engine = engine
        .reply("iSj", SECTIONS_JSON)
        .reply("izzj", STRINGS_JSON)
        .reply("isj", SYMBOLS_JSON)
        .reply("aflj", FUNCTIONS_JSON)
        .reply("fj", FLAGS_JSON)
        .reply("axj", XREFS_JSON)
        .reply("iIj", BINARY_INFO_JSON);
    (engine, recorder)
}

/// Sixty-four bytes of "code" with recognizable contents.
pub fn code_buffer() -> Vec<u8> {
    (0u8..64).collect()
}
