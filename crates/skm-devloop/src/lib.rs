use std::path::PathBuf;

use anyhow::Result;
use skm_supervisor::{ProcessHandle, SupervisedCommand};

mod pipeline;

pub use pipeline::BuildPipeline;

/// How a successful cycle starts the deployed artifact.
pub struct RunSpec {
    pub name: String,
    pub binary: PathBuf,
    pub work_dir: PathBuf,
}

/// Drives one generate-compile-deploy-restart cycle per accepted change
/// event. Cycles are serialized by the watcher's single dispatch thread.
///
/// A failed compile never kills the running process: the controller sets
/// `skip_run_due_to_failed_compile`, leaves the process alone, and the
/// next successful cycle performs the deferred restart.
pub struct DevLoopController {
    pipeline: Option<BuildPipeline>,
    server_pipeline: Option<BuildPipeline>,
    deploy: Box<dyn FnMut() -> Result<()> + Send>,
    run: Option<RunSpec>,
    process: Option<ProcessHandle>,
    skip_run_due_to_failed_compile: bool,
}

impl DevLoopController {
    pub fn new(deploy: Box<dyn FnMut() -> Result<()> + Send>) -> Self {
        Self {
            pipeline: None,
            server_pipeline: None,
            deploy,
            run: None,
            process: None,
            skip_run_due_to_failed_compile: false,
        }
    }

    pub fn with_pipeline(mut self, pipeline: BuildPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Dev mode: rebuild the server from its own entry file before each
    /// supervised start.
    pub fn with_server_pipeline(mut self, pipeline: BuildPipeline) -> Self {
        self.server_pipeline = Some(pipeline);
        self
    }

    pub fn with_run(mut self, run: RunSpec) -> Self {
        self.run = Some(run);
        self
    }

    /// One full cycle. Also serves as the initial build when the loop
    /// starts. Errors are returned for logging; the loop stays usable for
    /// the next change event either way.
    pub fn run_cycle(&mut self) -> Result<()> {
        if let Some(pipeline) = &self.pipeline {
            pipeline.generate();
            if let Err(err) = pipeline.compile() {
                self.skip_run_due_to_failed_compile = true;
                return Err(err);
            }
        }

        // The running process is only stopped once the rebuild has
        // actually succeeded, so a broken edit never kills a healthy
        // instance. This also performs the restart a failed cycle
        // deferred.
        self.stop_process();
        self.skip_run_due_to_failed_compile = false;

        (self.deploy)()?;

        if self.run.is_some() {
            if let Some(server) = &self.server_pipeline {
                server.generate();
                server.compile()?;
            }
            if let Some(spec) = &self.run {
                let handle =
                    SupervisedCommand::new(spec.name.clone(), spec.binary.display().to_string())
                        .current_dir(&spec.work_dir)
                        .spawn()?;
                println!("Started {}", spec.name);
                self.process = Some(handle);
            }
        }

        Ok(())
    }

    pub fn is_process_running(&mut self) -> bool {
        match self.process.as_mut() {
            Some(handle) => matches!(handle.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Stops the supervised process if one is running.
    pub fn stop_process(&mut self) {
        if let Some(handle) = self.process.take() {
            let name = handle.name().to_string();
            if let Err(err) = handle.stop() {
                eprintln!("failed to stop {name}: {err:#}");
            } else {
                println!("Stopped {name}");
            }
        }
    }

    /// Final teardown when the watch loop has been cancelled.
    pub fn shutdown(&mut self) {
        self.stop_process();
    }
}
