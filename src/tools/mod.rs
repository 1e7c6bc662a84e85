//! Invocation of the external programs doing the actual work.
//!
//! Every program is started with an argument vector, never through a shell,
//! so table and host names can't be interpreted as shell syntax.
//! The [Runner] trait is the seam between the backup logic and the processes.

pub mod mysql;
pub mod scp;
pub mod tar;

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use derive_more::{Display, Error};

/// Errors of an external program.
#[derive(Debug, Display, Error)]
pub enum ToolError {
    /// The program couldn't be started.
    #[display("Failed to run `{program}`: {source}")]
    Spawn { program: String, source: io::Error },
    /// The program exited unsuccessfully.
    #[display("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    /// The file receiving stdout can't be created.
    #[display("Unable to redirect output of `{command}` to {}: {source}", path.display())]
    Redirect {
        command: String,
        path: PathBuf,
        source: io::Error,
    },
}

/// Where the stdout of an [Invocation] goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Captured and returned by [Runner::run].
    Capture,
    /// Written to the file, which is created or truncated.
    File(PathBuf),
    /// Discarded.
    Null,
}

/// A program with its arguments.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    output: Output,
    read_only: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            output: Output::Null,
            read_only: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable. Its value is never logged.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// Marks the invocation as free of side effects, so it's run even on a dry run.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_output(&self) -> &Output {
        &self.output
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.env.iter().map(|(k, v)| (k, v)));
        command
    }
}

// Only the command line, environment values may carry passwords.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Output::File(path) = &self.output {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("command", &self.to_string())
            .field("env", &self.env.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Executes [Invocation]s synchronously.
pub trait Runner {
    /// Runs the [Invocation] to completion.
    ///
    /// Returns the captured stdout for [Output::Capture] and an empty string otherwise.
    fn run(&mut self, invocation: &Invocation) -> Result<String, ToolError>;
}

/// [Runner] starting real processes.
///
/// # Dry Run
///
/// On a dry run only [read only](Invocation::read_only) invocations are executed,
/// every other invocation is logged and reported as successful.
#[derive(Debug, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl Runner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<String, ToolError> {
        if self.dry_run && !invocation.is_read_only() {
            log::info!(target: "tools", "Dry run, skipping: {invocation}");
            return Ok(String::new());
        }
        log::debug!(target: "tools", "Running: {invocation}");

        let mut command = invocation.to_command();
        command.stdin(Stdio::null());
        match invocation.get_output() {
            Output::Capture => command.stdout(Stdio::piped()),
            Output::File(path) => {
                let file = File::create(path).map_err(|source| ToolError::Redirect {
                    command: invocation.to_string(),
                    path: path.clone(),
                    source,
                })?;
                command.stdout(file)
            }
            Output::Null => command.stdout(Stdio::null()),
        };

        let output = command.output().map_err(|source| ToolError::Spawn {
            program: invocation.program().to_string(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ToolError::Failed {
                command: invocation.to_string(),
                status: output.status,
                stderr: stderr.trim().to_string(),
            });
        }
        // relay stderr
        if !stderr.trim().is_empty() {
            log::warn!(target: "tools", "{}: {}", invocation.program(), stderr.trim_end());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Ensures the program is given as a path, not mistaken for an option.
pub(crate) fn path_arg(path: &Path) -> String {
    let path = path.to_string_lossy();
    if path.starts_with('-') {
        format!("./{path}")
    } else {
        path.into_owned()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::os::unix::process::ExitStatusExt;

    use super::*;

    type Predicate = Box<dyn Fn(&Invocation) -> bool>;

    /// [Runner] recording invocations instead of running them.
    ///
    /// Invocations matching a failure predicate fail with exit code 1.
    /// Redirected output is written to its file, captured output is taken
    /// from the first matching stdout rule.
    #[derive(Default)]
    pub struct ScriptedRunner {
        pub invocations: Vec<Invocation>,
        failures: Vec<Predicate>,
        stdout: Vec<(Predicate, String)>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_when(mut self, predicate: impl Fn(&Invocation) -> bool + 'static) -> Self {
            self.failures.push(Box::new(predicate));
            self
        }

        pub fn stdout_when(
            mut self,
            predicate: impl Fn(&Invocation) -> bool + 'static,
            stdout: &str,
        ) -> Self {
            self.stdout.push((Box::new(predicate), stdout.to_string()));
            self
        }

        /// Invocations of `program`, in order.
        pub fn calls(&self, program: &str) -> Vec<&Invocation> {
            self.invocations
                .iter()
                .filter(|i| i.program() == program)
                .collect()
        }
    }

    impl Runner for ScriptedRunner {
        fn run(&mut self, invocation: &Invocation) -> Result<String, ToolError> {
            self.invocations.push(invocation.clone());

            if self.failures.iter().any(|fail| fail(invocation)) {
                return Err(ToolError::Failed {
                    command: invocation.to_string(),
                    status: ExitStatus::from_raw(1 << 8),
                    stderr: "scripted failure".into(),
                });
            }

            match invocation.get_output() {
                Output::File(path) => {
                    std::fs::write(path, format!("-- {invocation}\n")).map_err(|source| {
                        ToolError::Redirect {
                            command: invocation.to_string(),
                            path: path.clone(),
                            source,
                        }
                    })?;
                    Ok(String::new())
                }
                Output::Capture => Ok(self
                    .stdout
                    .iter()
                    .find(|(matches, _)| matches(invocation))
                    .map(|(_, stdout)| stdout.clone())
                    .unwrap_or_default()),
                Output::Null => Ok(String::new()),
            }
        }
    }

    /// Matches invocations having `arg` among their arguments.
    pub fn has_arg(arg: &'static str) -> impl Fn(&Invocation) -> bool {
        move |invocation| invocation.get_args().iter().any(|a| a == arg)
    }
}
