//! `virsh` command invocation.
//!
//! [`CommandRunner`] is the seam between the provider and the host: the
//! [`SystemRunner`] spawns real processes, while [`crate::MockVirsh`] simulates
//! the pool verbs in memory. [`Virsh`] layers the pool verbs on top of a runner.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tracing::debug;

use crate::error::{PoolError, Result};

/// Executes an external program and returns its stdout.
///
/// Implementations must fail with [`PoolError::ExternalCommand`] when the
/// program exits non-zero. No retries happen at this layer.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        (**self).run(program, args)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for Box<T> {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        (**self).run(program, args)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        (**self).run(program, args)
    }
}

/// Runs commands on the local host, blocking until they exit.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        debug!(command = %program, args = ?args, "Executing command");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| PoolError::Spawn {
                command: program.to_string(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            debug!(
                command = %program,
                args = ?args,
                exit_code = ?output.status.code(),
                "Command exited with failure"
            );
            return Err(PoolError::ExternalCommand {
                command: program.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                stderr,
                exit_code: output.status.code(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// The pool verbs of `virsh`, bound to a runner and an optional connection URI.
#[derive(Debug, Clone)]
pub struct Virsh<R> {
    runner: R,
    binary: String,
    connect_uri: Option<String>,
}

impl<R: CommandRunner> Virsh<R> {
    /// Use `virsh` from `PATH` with libvirt's default connection.
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            binary: "virsh".to_string(),
            connect_uri: None,
        }
    }

    /// Use a custom `virsh` binary path.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Pass `-c <uri>` on every invocation.
    pub fn with_connect_uri(mut self, uri: impl Into<String>) -> Self {
        self.connect_uri = Some(uri.into());
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn connect_uri(&self) -> Option<&str> {
        self.connect_uri.as_deref()
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        match self.connect_uri.as_deref() {
            Some(uri) => {
                let mut full: Vec<&str> = Vec::with_capacity(args.len() + 2);
                full.extend(["-c", uri]);
                full.extend_from_slice(args);
                self.runner.run(&self.binary, &full)
            }
            None => self.runner.run(&self.binary, args),
        }
    }

    /// `virsh -q pool-list --all`
    pub fn pool_list_all(&self) -> Result<String> {
        self.run(&["-q", "pool-list", "--all"])
    }

    /// `virsh pool-define <file>`
    pub fn pool_define(&self, descriptor_path: &Path) -> Result<()> {
        let path = descriptor_path.to_string_lossy();
        self.run(&["pool-define", path.as_ref()]).map(drop)
    }

    /// `virsh pool-build --pool <name>`
    pub fn pool_build(&self, name: &str) -> Result<()> {
        self.run(&["pool-build", "--pool", name]).map(drop)
    }

    /// `virsh pool-start --pool <name>`
    pub fn pool_start(&self, name: &str) -> Result<()> {
        self.run(&["pool-start", "--pool", name]).map(drop)
    }

    /// `virsh pool-destroy --pool <name>`: stops the pool, keeps its definition.
    pub fn pool_destroy(&self, name: &str) -> Result<()> {
        self.run(&["pool-destroy", "--pool", name]).map(drop)
    }

    /// `virsh pool-undefine --pool <name>`
    pub fn pool_undefine(&self, name: &str) -> Result<()> {
        self.run(&["pool-undefine", "--pool", name]).map(drop)
    }

    /// `virsh pool-autostart --pool <name> [--disable]`
    pub fn pool_autostart(&self, name: &str, enable: bool) -> Result<()> {
        if enable {
            self.run(&["pool-autostart", "--pool", name]).map(drop)
        } else {
            self.run(&["pool-autostart", "--pool", name, "--disable"]).map(drop)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl CommandRunner for Recorder {
        fn run(&self, program: &str, args: &[&str]) -> Result<String> {
            self.calls.lock().unwrap().push((
                program.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
            ));
            Ok(String::new())
        }
    }

    #[test]
    fn test_verbs_and_connect_uri() {
        let recorder = Recorder::default();
        let virsh = Virsh::new(&recorder)
            .with_binary("/usr/bin/virsh")
            .with_connect_uri("qemu:///system");

        assert_eq!(virsh.binary(), "/usr/bin/virsh");
        assert_eq!(virsh.connect_uri(), Some("qemu:///system"));

        virsh.pool_list_all().unwrap();
        virsh.pool_autostart("images", false).unwrap();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0].0, "/usr/bin/virsh");
        assert_eq!(calls[0].1, ["-c", "qemu:///system", "-q", "pool-list", "--all"]);
        assert_eq!(
            calls[1].1,
            ["-c", "qemu:///system", "pool-autostart", "--pool", "images", "--disable"]
        );
    }

    #[test]
    fn test_default_binary_without_uri() {
        let recorder = Recorder::default();
        let virsh = Virsh::new(&recorder);
        assert!(virsh.connect_uri().is_none());
        virsh.pool_build("images").unwrap();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0].0, "virsh");
        assert_eq!(calls[0].1, ["pool-build", "--pool", "images"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_reports_exit_code() {
        let err = SystemRunner.run("false", &[]).unwrap_err();
        assert_eq!(err.exit_code(), Some(1));

        let out = SystemRunner.run("echo", &["pool1", "active", "yes"]).unwrap();
        assert_eq!(out.trim(), "pool1 active yes");
    }

    #[test]
    fn test_system_runner_spawn_failure() {
        let err = SystemRunner
            .run("/nonexistent/limiquantix-virsh", &[])
            .unwrap_err();
        assert!(matches!(err, PoolError::Spawn { .. }));
    }
}
