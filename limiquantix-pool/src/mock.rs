//! Mock `virsh` for testing and development.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::descriptor::PoolDescriptor;
use crate::error::{PoolError, Result};
use crate::types::PoolType;
use crate::virsh::CommandRunner;

/// In-memory simulation of the `virsh` pool verbs.
///
/// Behaves like libvirt for the verbs the provider uses: `pool-define` reads
/// and parses the descriptor file, `pool-start` fails on an active pool,
/// `pool-destroy` fails on an inactive one, and so on. Useful for:
/// - Unit and integration testing
/// - Development without libvirt installed
///
/// Any verb can be forced to fail with [`MockVirsh::fail_verb`]. Every
/// invocation is recorded.
pub struct MockVirsh {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    pools: BTreeMap<String, MockPool>,
    calls: Vec<Vec<String>>,
    failures: HashMap<String, String>,
    defined_paths: Vec<String>,
}

/// A pool known to the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPool {
    pub descriptor: PoolDescriptor,
    pub active: bool,
    pub autostart: bool,
    pub built: bool,
}

impl MockVirsh {
    /// Create a mock with no pools defined.
    pub fn new() -> Self {
        info!("Creating mock virsh");
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Pre-define a pool.
    pub fn with_pool(self, name: &str, pool_type: PoolType, active: bool, autostart: bool) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.pools.insert(
                name.to_string(),
                MockPool {
                    descriptor: PoolDescriptor {
                        pool_type,
                        name: name.to_string(),
                        source: None,
                        target: None,
                    },
                    active,
                    autostart,
                    built: true,
                },
            );
        }
        self
    }

    /// Make every invocation of `verb` (e.g. `pool-build`) exit 1 with `stderr`.
    pub fn fail_verb(&self, verb: &str, stderr: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert(verb.to_string(), stderr.to_string());
        }
    }

    /// Undo [`MockVirsh::fail_verb`].
    pub fn clear_failure(&self, verb: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.remove(verb);
        }
    }

    /// Argument lists of every invocation, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Verbs of every invocation except `pool-list`, in order.
    pub fn mutating_verbs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|args| verb_of(args).map(|(verb, _)| verb.to_string()))
            .filter(|verb| verb != "pool-list")
            .collect()
    }

    /// Number of `pool-list` invocations.
    pub fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|args| matches!(verb_of(args), Some(("pool-list", _))))
            .count()
    }

    /// Descriptor paths passed to `pool-define`.
    pub fn defined_paths(&self) -> Vec<String> {
        self.lock().map(|s| s.defined_paths.clone()).unwrap_or_default()
    }

    pub fn pool(&self, name: &str) -> Option<MockPool> {
        self.lock().ok().and_then(|s| s.pools.get(name).cloned())
    }

    pub fn reset_calls(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.clear();
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| PoolError::Internal("Lock poisoned".to_string()))
    }
}

impl Default for MockVirsh {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip global options (`-c <uri>`, `-q`) and split off the verb.
fn verb_of(args: &[String]) -> Option<(&str, &[String])> {
    let mut rest = args;
    loop {
        match rest.first().map(String::as_str) {
            Some("-c") | Some("--connect") => rest = rest.get(2..)?,
            Some("-q") | Some("--quiet") => rest = &rest[1..],
            Some(verb) => return Some((verb, &rest[1..])),
            None => return None,
        }
    }
}

/// Pool name from `--pool <name>` or the first positional argument.
fn pool_arg(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "--pool")
        .and_then(|i| args.get(i + 1))
        .or_else(|| args.iter().find(|a| !a.starts_with("--")))
        .map(String::as_str)
}

impl CommandRunner for MockVirsh {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let mut state = self.lock()?;
        state.calls.push(args.clone());

        let fail = |stderr: String| PoolError::ExternalCommand {
            command: program.to_string(),
            args: args.clone(),
            stderr,
            exit_code: Some(1),
        };

        let (verb, rest) =
            verb_of(&args).ok_or_else(|| fail("error: command required".to_string()))?;
        debug!(verb = %verb, args = ?rest, "Mock virsh invoked");

        if let Some(stderr) = state.failures.get(verb) {
            return Err(fail(stderr.clone()));
        }

        if verb == "pool-list" {
            let listing = state
                .pools
                .iter()
                .map(|(name, pool)| {
                    format!(
                        " {:<20} {:<10} {}\n",
                        name,
                        if pool.active { "active" } else { "inactive" },
                        if pool.autostart { "yes" } else { "no" }
                    )
                })
                .collect();
            return Ok(listing);
        }

        if verb == "pool-define" {
            let path = rest.first().ok_or_else(|| {
                fail("error: command 'pool-define' requires <file> option".to_string())
            })?;
            let xml = std::fs::read_to_string(path)
                .map_err(|e| fail(format!("error: Failed to open file '{}': {}", path, e)))?;
            let descriptor = PoolDescriptor::parse(&xml)
                .map_err(|e| fail(format!("error: Failed to define pool from {}\n{}", path, e)))?;

            state.defined_paths.push(path.clone());
            let name = descriptor.name.clone();
            match state.pools.entry(name.clone()) {
                Entry::Occupied(mut entry) => entry.get_mut().descriptor = descriptor,
                Entry::Vacant(entry) => {
                    entry.insert(MockPool {
                        descriptor,
                        active: false,
                        autostart: false,
                        built: false,
                    });
                }
            }
            return Ok(format!("Pool {} defined from {}\n", name, path));
        }

        let name = pool_arg(rest)
            .ok_or_else(|| fail(format!("error: command '{}' requires --pool option", verb)))?
            .to_string();
        let not_found = || {
            fail(format!(
                "error: failed to get pool '{}'\nerror: Storage pool not found",
                name
            ))
        };

        if verb == "pool-undefine" {
            return match state.pools.remove(&name) {
                Some(_) => Ok(format!("Pool {} has been undefined\n", name)),
                None => Err(not_found()),
            };
        }

        let pool = state.pools.get_mut(&name).ok_or_else(not_found)?;

        match verb {
            "pool-build" => {
                pool.built = true;
                Ok(format!("Pool {} built\n", name))
            }
            "pool-start" => {
                if pool.active {
                    return Err(fail(format!(
                        "error: Failed to start pool {}\nerror: Requested operation is not \
                         valid: storage pool '{}' is already active",
                        name, name
                    )));
                }
                pool.active = true;
                Ok(format!("Pool {} started\n", name))
            }
            "pool-destroy" => {
                if !pool.active {
                    return Err(fail(format!(
                        "error: Failed to destroy pool {}\nerror: Requested operation is not \
                         valid: storage pool '{}' is not active",
                        name, name
                    )));
                }
                pool.active = false;
                Ok(format!("Pool {} destroyed\n", name))
            }
            "pool-autostart" => {
                let enable = !rest.iter().any(|a| a == "--disable");
                pool.autostart = enable;
                if enable {
                    Ok(format!("Pool {} marked as autostarted\n", name))
                } else {
                    Ok(format!("Pool {} unmarked as autostarted\n", name))
                }
            }
            other => Err(fail(format!("error: unknown command: '{}'", other))),
        }
    }
}
