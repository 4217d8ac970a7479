use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

mod pgroup;

use pgroup::{GroupSignal, PlatformSignal};

/// How long a stopped process gets to exit after the group signal before
/// it is killed outright.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Which stream a relayed output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Receives every output line the supervised process writes.
pub type LineSink = Arc<dyn Fn(StreamKind, &str) + Send + Sync>;

/// Builder for a supervised child process. The child runs in its own
/// process group and has both output streams relayed line by line,
/// prefixed with the process name.
pub struct SupervisedCommand {
    name: String,
    program: String,
    args: Vec<String>,
    work_dir: Option<PathBuf>,
}

impl SupervisedCommand {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn spawn(self) -> Result<ProcessHandle> {
        let name = self.name.clone();
        self.spawn_with_sink(Arc::new(move |stream, line| match stream {
            StreamKind::Stdout => println!("[{name}] {line}"),
            StreamKind::Stderr => eprintln!("[{name}] {line}"),
        }))
    }

    pub fn spawn_with_sink(self, sink: LineSink) -> Result<ProcessHandle> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.work_dir {
            command.current_dir(dir);
        }
        PlatformSignal.assign_group(&mut command);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;

        let stdout = child
            .stdout
            .take()
            .context("child stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("child stderr was not captured")?;

        let stdout_thread = relay_lines(stdout, StreamKind::Stdout, Arc::clone(&sink));
        let stderr_thread = relay_lines(stderr, StreamKind::Stderr, sink);

        Ok(ProcessHandle {
            name: self.name,
            child,
            readers: vec![stdout_thread, stderr_thread],
        })
    }
}

fn relay_lines<R: std::io::Read + Send + 'static>(
    stream: R,
    kind: StreamKind,
    sink: LineSink,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(line) => sink(kind, &line),
                Err(_) => break,
            }
        }
    })
}

/// A running supervised process. Dropping the handle does not stop the
/// child; call [`ProcessHandle::stop`].
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    child: Child,
    readers: Vec<JoinHandle<()>>,
}

impl ProcessHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the exit status if the process has already finished.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child
            .try_wait()
            .with_context(|| format!("failed to poll {}", self.name))
    }

    /// Blocks until the process exits on its own.
    pub fn wait(mut self) -> Result<ExitStatus> {
        let status = self
            .child
            .wait()
            .with_context(|| format!("failed to wait for {}", self.name))?;
        self.join_readers();
        Ok(status)
    }

    /// Signals the whole process group to terminate, waits out the grace
    /// period, and kills the child if it is still running.
    pub fn stop(mut self) -> Result<()> {
        if self.try_wait()?.is_some() {
            self.join_readers();
            return Ok(());
        }

        PlatformSignal
            .terminate_group(&mut self.child)
            .with_context(|| format!("failed to signal {}", self.name))?;

        let deadline = Instant::now() + STOP_GRACE_PERIOD;
        while Instant::now() < deadline {
            if self.try_wait()?.is_some() {
                self.join_readers();
                return Ok(());
            }
            thread::sleep(Duration::from_millis(50));
        }

        self.child
            .kill()
            .with_context(|| format!("failed to kill {}", self.name))?;
        self.child
            .wait()
            .with_context(|| format!("failed to reap {}", self.name))?;
        self.join_readers();
        Ok(())
    }

    fn join_readers(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
    }
}

#[cfg(test)]
mod tests;
