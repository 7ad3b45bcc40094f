//! Desired/observed reconciliation for storage pools.
//!
//! ## State machine
//!
//! ```text
//!              define + build                 start
//!   Absent ───────────────────▶ Inactive ─────────────▶ Active
//!     ▲                          │    ▲    pool-destroy    │
//!     │     stop? + undefine     │    └────────────────────┘
//!     └──────────────────────────┴─────────────────────────┘
//! ```
//!
//! Autostart is an orthogonal flag toggled with `pool-autostart`.
//!
//! Each CLI step is a [`PoolAction`]. Whether a failing step aborts the
//! transition is decided by [`step_policy`]; only the build after a define and
//! the stop before an undefine are tolerated.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument, warn};

use crate::cache::ReconcileContext;
use crate::descriptor::build_descriptor;
use crate::error::{PoolError, Result};
use crate::inventory::InventoryLister;
use crate::types::{Ensure, PoolRecord, PoolSpec, PoolStatus};
use crate::virsh::{CommandRunner, Virsh};

/// A single state-changing `virsh` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolAction {
    Define,
    Build,
    Start,
    Stop,
    Undefine,
    AutostartEnable,
    AutostartDisable,
}

impl PoolAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolAction::Define => "define",
            PoolAction::Build => "build",
            PoolAction::Start => "start",
            PoolAction::Stop => "stop",
            PoolAction::Undefine => "undefine",
            PoolAction::AutostartEnable => "autostart-enable",
            PoolAction::AutostartDisable => "autostart-disable",
        }
    }
}

/// The transition a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Create,
    Destroy,
    SetActive,
    SetAutostart,
}

/// What a failing step does to its transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Abort the transition and surface the error.
    Fatal,
    /// Log, record in the report and carry on.
    Tolerated,
}

/// Failure policy per transition step.
///
/// A build failure usually means the backing storage already exists, and a stop
/// failure usually means the pool was not running; neither blocks convergence.
pub fn step_policy(transition: Transition, action: PoolAction) -> StepPolicy {
    match (transition, action) {
        (Transition::Create, PoolAction::Build) => StepPolicy::Tolerated,
        (Transition::Destroy, PoolAction::Stop) => StepPolicy::Tolerated,
        _ => StepPolicy::Fatal,
    }
}

/// A tolerated step failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftFailure {
    pub action: PoolAction,
    pub message: String,
}

/// What one reconcile/create/destroy call did to one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub name: String,
    /// Steps attempted, in order, including tolerated failures.
    pub actions: Vec<PoolAction>,
    pub soft_failures: Vec<SoftFailure>,
    /// Local view of the pool after the call; `None` when absent.
    pub observed: Option<PoolRecord>,
}

impl ReconcileReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            actions: Vec::new(),
            soft_failures: Vec::new(),
            observed: None,
        }
    }

    /// True when at least one state-changing call was issued.
    pub fn changed(&self) -> bool {
        !self.actions.is_empty()
    }
}

/// Per-pool result within a pass.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PoolOutcome {
    Converged(ReconcileReport),
    Failed {
        name: String,
        #[serde(serialize_with = "serialize_error")]
        error: PoolError,
    },
}

fn serialize_error<S: Serializer>(
    error: &PoolError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl PoolOutcome {
    pub fn name(&self) -> &str {
        match self {
            PoolOutcome::Converged(report) => &report.name,
            PoolOutcome::Failed { name, .. } => name,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PoolOutcome::Failed { .. })
    }
}

/// Result of reconciling a batch of pools.
#[derive(Debug, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pools: Vec<PoolOutcome>,
}

impl PassReport {
    pub fn failures(&self) -> usize {
        self.pools.iter().filter(|p| p.is_failed()).count()
    }

    pub fn changed(&self) -> usize {
        self.pools
            .iter()
            .filter(|p| matches!(p, PoolOutcome::Converged(r) if r.changed()))
            .count()
    }
}

/// Drives pools toward their desired state within one pass.
pub struct Reconciler<'a, R> {
    virsh: &'a Virsh<R>,
    context: ReconcileContext,
    descriptor_dir: Option<PathBuf>,
}

impl<'a, R: CommandRunner> Reconciler<'a, R> {
    /// Reconciler without prefetched state; lookups query `virsh` per pool.
    pub fn new(virsh: &'a Virsh<R>) -> Self {
        Self::with_context(virsh, ReconcileContext::new())
    }

    pub fn with_context(virsh: &'a Virsh<R>, context: ReconcileContext) -> Self {
        Self {
            virsh,
            context,
            descriptor_dir: None,
        }
    }

    /// Write pool descriptors under `dir` instead of the system temp directory.
    pub fn with_descriptor_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.descriptor_dir = Some(dir.into());
        self
    }

    /// Reconciler whose context holds one listing for all `names`.
    pub fn prefetch<'n, I>(virsh: &'a Virsh<R>, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let context = ReconcileContext::prefetch(&InventoryLister::new(virsh), names)?;
        Ok(Self::with_context(virsh, context))
    }

    pub fn context(&self) -> &ReconcileContext {
        &self.context
    }

    /// Current local view of `name`, querying `virsh` if it is not cached.
    pub fn observe(&mut self, name: &str) -> Result<Option<PoolRecord>> {
        if let Some(cached) = self.context.get(name) {
            return Ok(cached.cloned());
        }

        debug!(pool = %name, "Pool not prefetched, querying status");
        let record = InventoryLister::new(self.virsh).find(name)?;
        self.context.insert(name, record.clone());
        Ok(record)
    }

    pub fn status(&mut self, name: &str) -> Result<PoolStatus> {
        Ok(match self.observe(name)? {
            Some(_) => PoolStatus::Present,
            None => PoolStatus::Absent,
        })
    }

    /// Converge one pool to `spec`.
    #[instrument(skip(self, spec), fields(pool = %spec.name, ensure = ?spec.ensure))]
    pub fn reconcile(&mut self, spec: &PoolSpec) -> Result<ReconcileReport> {
        spec.validate()?;

        let observed = self.observe(&spec.name)?;
        match (spec.ensure, observed) {
            (Ensure::Present, None) => self.create(spec),
            (Ensure::Present, Some(_)) => {
                let mut report = ReconcileReport::new(&spec.name);
                self.converge_flags(spec, &mut report)?;
                report.observed = self.current(&spec.name);
                Ok(report)
            }
            (Ensure::Absent, Some(_)) => self.destroy(&spec.name),
            (Ensure::Absent, None) => {
                debug!("Pool already absent");
                Ok(ReconcileReport::new(&spec.name))
            }
        }
    }

    /// Define, build, then bring the active and autostart flags in line.
    #[instrument(skip(self, spec), fields(pool = %spec.name, pool_type = %spec.pool_type))]
    pub fn create(&mut self, spec: &PoolSpec) -> Result<ReconcileReport> {
        spec.validate()?;
        let name = spec.name.as_str();
        let mut report = ReconcileReport::new(name);

        let existing = self.observe(name)?;

        report.actions.push(PoolAction::Define);
        self.define(spec).map_err(|e| PoolError::DefineFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        info!("Storage pool defined");

        // A fresh definition is inactive without autostart.
        let record = existing.unwrap_or_else(|| PoolRecord::new(name, false, false));
        self.context.insert(name, Some(record));

        self.step(&mut report, Transition::Create, PoolAction::Build, |virsh| {
            virsh.pool_build(name)
        })?;

        self.converge_flags(spec, &mut report)?;

        report.observed = self.current(name);
        Ok(report)
    }

    /// Stop (best effort) and undefine the pool.
    #[instrument(skip(self))]
    pub fn destroy(&mut self, name: &str) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(name);

        self.step(&mut report, Transition::Destroy, PoolAction::Stop, |virsh| {
            virsh.pool_destroy(name)
        })?;
        self.step(&mut report, Transition::Destroy, PoolAction::Undefine, |virsh| {
            virsh.pool_undefine(name)
        })?;

        self.context.mark_absent(name);
        info!("Storage pool removed");
        Ok(report)
    }

    /// Start or stop the pool. No call is made when already in that state.
    #[instrument(skip(self))]
    pub fn set_active(&mut self, name: &str, desired: bool) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(name);
        self.apply_active(name, desired, &mut report)?;
        report.observed = self.current(name);
        Ok(report)
    }

    /// Enable or disable autostart. No call is made when already in that state.
    #[instrument(skip(self))]
    pub fn set_autostart(&mut self, name: &str, desired: bool) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(name);
        self.apply_autostart(name, desired, &mut report)?;
        report.observed = self.current(name);
        Ok(report)
    }

    fn converge_flags(&mut self, spec: &PoolSpec, report: &mut ReconcileReport) -> Result<()> {
        self.apply_active(&spec.name, spec.active, report)?;
        self.apply_autostart(&spec.name, spec.autostart, report)
    }

    fn apply_active(
        &mut self,
        name: &str,
        desired: bool,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        if self.observe(name)?.is_some_and(|r| r.active() == desired) {
            return Ok(());
        }

        if desired {
            self.step(report, Transition::SetActive, PoolAction::Start, |virsh| {
                virsh.pool_start(name)
            })?;
            info!(pool = %name, "Storage pool started");
        } else {
            self.step(report, Transition::SetActive, PoolAction::Stop, |virsh| {
                virsh.pool_destroy(name)
            })?;
            info!(pool = %name, "Storage pool stopped");
        }

        if let Some(record) = self.context.record_mut(name) {
            record.set_active(desired);
        }
        Ok(())
    }

    fn apply_autostart(
        &mut self,
        name: &str,
        desired: bool,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        if self.observe(name)?.is_some_and(|r| r.autostart() == desired) {
            return Ok(());
        }

        let action = if desired {
            PoolAction::AutostartEnable
        } else {
            PoolAction::AutostartDisable
        };
        self.step(report, Transition::SetAutostart, action, |virsh| {
            virsh.pool_autostart(name, desired)
        })?;
        info!(pool = %name, autostart = desired, "Storage pool autostart updated");

        if let Some(record) = self.context.record_mut(name) {
            record.set_autostart(desired);
        }
        Ok(())
    }

    /// Write the descriptor to a temp file and `pool-define` it.
    /// The file is removed when the guard drops, whatever the outcome.
    fn define(&self, spec: &PoolSpec) -> Result<()> {
        let xml = build_descriptor(spec)?;

        let prefix = format!("pool.{}.", spec.name);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".xml");
        let mut file = match &self.descriptor_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| PoolError::Internal(format!("failed to create descriptor file: {}", e)))?;
        file.write_all(xml.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| PoolError::Internal(format!("failed to write descriptor file: {}", e)))?;

        debug!(path = %file.path().display(), "Wrote pool descriptor");
        self.virsh.pool_define(file.path())
    }

    /// Run one step and apply its failure policy.
    fn step<F>(
        &self,
        report: &mut ReconcileReport,
        transition: Transition,
        action: PoolAction,
        call: F,
    ) -> Result<()>
    where
        F: FnOnce(&Virsh<R>) -> Result<()>,
    {
        report.actions.push(action);

        match call(self.virsh) {
            Ok(()) => Ok(()),
            Err(e) => match step_policy(transition, action) {
                StepPolicy::Fatal => Err(e),
                StepPolicy::Tolerated => {
                    warn!(
                        pool = %report.name,
                        action = action.as_str(),
                        error = %e,
                        "Ignoring failed pool step"
                    );
                    report.soft_failures.push(SoftFailure {
                        action,
                        message: e.to_string(),
                    });
                    Ok(())
                }
            },
        }
    }

    fn current(&self, name: &str) -> Option<PoolRecord> {
        self.context.get(name).flatten().cloned()
    }
}

/// Reconcile a batch of pools with a single listing.
///
/// A fatal error on one pool is recorded and the next pool is processed; only
/// a failure to list pools aborts the pass.
#[instrument(skip_all, fields(pools = specs.len()))]
pub fn reconcile_all<R: CommandRunner>(
    virsh: &Virsh<R>,
    specs: &[PoolSpec],
) -> Result<PassReport> {
    let started_at = Utc::now();
    let mut reconciler = Reconciler::prefetch(virsh, specs.iter().map(|s| s.name.as_str()))?;

    let pools = specs
        .iter()
        .map(|spec| match reconciler.reconcile(spec) {
            Ok(report) => PoolOutcome::Converged(report),
            Err(error) => {
                warn!(pool = %spec.name, error = %error, "Pool reconciliation failed");
                PoolOutcome::Failed {
                    name: spec.name.clone(),
                    error,
                }
            }
        })
        .collect();

    let report = PassReport {
        started_at,
        finished_at: Utc::now(),
        pools,
    };
    info!(
        changed = report.changed(),
        failed = report.failures(),
        "Reconciliation pass finished"
    );
    Ok(report)
}
