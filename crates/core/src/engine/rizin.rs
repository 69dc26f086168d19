use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{Engine, OpenTarget};
use crate::error::{SessionError, SessionResult};
use crate::model::Perm;

/// Rizin driven over a pipe in `-q0` mode.
///
/// Every reply is terminated by a NUL byte. A reader thread owned by the pipe splits
/// stdout on NUL and hands replies over a channel so each command can be bounded
/// with a timeout. After a timeout the process is killed and the pipe refuses
/// further commands.
pub struct RizinPipe {
    program: PathBuf,
    process: Option<Process>,
    poisoned: Option<String>,
}

struct Process {
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<io::Result<String>>,
    reader: JoinHandle<()>,
}

enum Reply {
    Text(io::Result<String>),
    TimedOut,
    Exited,
}

impl RizinPipe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), process: None, poisoned: None }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments used to open `target`.
    pub fn open_args(target: &OpenTarget) -> Vec<String> {
        let mut args = vec!["-2".to_string(), "-q0".to_string()];
        if target.perm.contains(Perm::WRITE) {
            args.push("-w".into());
        }
        if let Some(base) = target.base_addr {
            args.push("-B".into());
            args.push(format!("{base:#x}"));
        }
        args.push("-m".into());
        args.push(format!("{:#x}", target.load_addr));
        args.push(target.uri.clone());
        args
    }

    fn receive(&mut self, timeout: Option<Duration>) -> SessionResult<Reply> {
        let Some(process) = self.process.as_mut() else {
            return Err(self.unavailable());
        };
        let reply = match timeout {
            Some(after) => match process.replies.recv_timeout(after) {
                Ok(text) => Reply::Text(text),
                Err(RecvTimeoutError::Timeout) => Reply::TimedOut,
                Err(RecvTimeoutError::Disconnected) => Reply::Exited,
            },
            None => match process.replies.recv() {
                Ok(text) => Reply::Text(text),
                Err(_) => Reply::Exited,
            },
        };
        Ok(reply)
    }

    fn unavailable(&self) -> SessionError {
        match &self.poisoned {
            Some(reason) => SessionError::EngineUnavailable(reason.clone()),
            None => SessionError::EngineUnavailable("rizin pipe is not open".into()),
        }
    }

    /// Kill the process and refuse further commands.
    fn poison(&mut self, reason: String) -> SessionError {
        warn!(program = %self.program.display(), %reason, "killing rizin");
        if let Some(Process { mut child, stdin, replies, reader }) = self.process.take() {
            drop(stdin);
            let _ = child.kill();
            let _ = child.wait();
            drop(replies);
            let _ = reader.join();
        }
        self.poisoned = Some(reason.clone());
        SessionError::EngineUnavailable(reason)
    }

    fn expect_reply(&mut self, label: &str, timeout: Option<Duration>) -> SessionResult<String> {
        match self.receive(timeout)? {
            Reply::Text(Ok(text)) => Ok(text),
            Reply::Text(Err(e)) => Err(self.poison(format!("failed reading rizin output: {e}"))),
            Reply::Exited => Err(self.poison(format!("rizin exited while running `{label}`"))),
            Reply::TimedOut => {
                let after = timeout.unwrap_or_default();
                self.poison(format!("`{label}` timed out after {after:?}"));
                Err(SessionError::Timeout { command: label.to_string(), after })
            }
        }
    }
}

impl Engine for RizinPipe {
    fn name(&self) -> &'static str {
        "rizin"
    }

    fn open(&mut self, target: &OpenTarget) -> SessionResult<()> {
        if self.process.is_some() {
            return Err(SessionError::EngineUnavailable("rizin pipe is already open".into()));
        }

        let args = Self::open_args(target);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                SessionError::EngineUnavailable(format!(
                    "failed to spawn {}: {e}",
                    self.program.display()
                ))
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SessionError::EngineUnavailable("rizin pipes were not captured".into()));
            }
        };

        let (tx, replies) = mpsc::channel();
        let reader = match spawn_reader(stdout, tx) {
            Ok(reader) => reader,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };
        self.process = Some(Process { child, stdin, replies, reader });

        // -q0 prints a lone NUL once the target is loaded.
        self.expect_reply("open", target.startup_timeout)?;
        info!(
            program = %self.program.display(),
            uri = %target.uri,
            perm = %target.perm,
            "rizin opened target"
        );
        Ok(())
    }

    fn cmd(&mut self, command: &str, timeout: Option<Duration>) -> SessionResult<String> {
        if command.contains('\n') {
            return Err(SessionError::protocol(command, "commands must be a single line"));
        }
        let Some(process) = self.process.as_mut() else {
            return Err(self.unavailable());
        };
        if let Err(e) = writeln!(process.stdin, "{command}").and_then(|_| process.stdin.flush()) {
            return Err(self.poison(format!("failed writing to rizin: {e}")));
        }
        self.expect_reply(command, timeout)
    }

    fn close(&mut self) -> SessionResult<()> {
        let Some(Process { mut child, mut stdin, replies, reader }) = self.process.take() else {
            return Ok(());
        };
        // The engine may already be gone; closing stdin is enough to make it exit.
        let _ = writeln!(stdin, "q!");
        drop(stdin);
        let status = child.wait();
        drop(replies);
        let _ = reader.join();
        debug!(program = %self.program.display(), ?status, "rizin closed");
        status?;
        Ok(())
    }
}

impl Drop for RizinPipe {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close rizin cleanly");
        }
    }
}

fn spawn_reader(
    stdout: ChildStdout,
    tx: Sender<io::Result<String>>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("rizin-reader".into()).spawn(move || {
        let mut reader = BufReader::new(stdout);
        loop {
            let mut buf = Vec::new();
            match reader.read_until(0, &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    // A reply without its terminator means the process died mid-write.
                    if buf.pop() != Some(0) {
                        break;
                    }
                    if tx.send(Ok(String::from_utf8_lossy(&buf).into_owned())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    })
}
