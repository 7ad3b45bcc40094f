//! Pool inventory from `virsh pool-list`.
//!
//! The listing is a whitespace-delimited table of `name state autostart` rows:
//!
//! ```text
//!  default   active     yes
//!  backups   inactive   no
//! ```
//!
//! With `-q` there is no header, but the header and the dashed separator are
//! recognised and skipped anyway so a missing `-q` does not break parsing.

use tracing::{debug, instrument};

use crate::error::{PoolError, Result};
use crate::types::{PoolRecord, PoolStatus};
use crate::virsh::{CommandRunner, Virsh};

/// Parse the output of `virsh pool-list --all`.
///
/// Blank, header and separator lines are skipped. Any other line must split
/// into exactly three tokens or the whole listing is rejected.
pub fn parse_pool_list(output: &str) -> Result<Vec<PoolRecord>> {
    let mut records = Vec::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();

        if fields.is_empty() || is_separator(&fields) || is_header(&fields) {
            continue;
        }

        match fields.as_slice() {
            [name, state, autostart] => records.push(PoolRecord::new(
                *name,
                state.starts_with("act"),
                !autostart.contains("no"),
            )),
            _ => {
                return Err(PoolError::MalformedListing {
                    line: line.to_string(),
                })
            }
        }
    }

    Ok(records)
}

fn is_separator(fields: &[&str]) -> bool {
    fields.iter().all(|f| f.chars().all(|c| c == '-'))
}

fn is_header(fields: &[&str]) -> bool {
    matches!(fields, ["Name", "State", "Autostart"])
}

/// Lists pools through a [`Virsh`] handle.
pub struct InventoryLister<'a, R> {
    virsh: &'a Virsh<R>,
}

impl<'a, R: CommandRunner> InventoryLister<'a, R> {
    pub fn new(virsh: &'a Virsh<R>) -> Self {
        Self { virsh }
    }

    /// All defined pools, active or not.
    #[instrument(skip(self))]
    pub fn list_all(&self) -> Result<Vec<PoolRecord>> {
        let output = self.virsh.pool_list_all()?;
        let records = parse_pool_list(&output)?;
        debug!(count = records.len(), "Listed storage pools");
        Ok(records)
    }

    /// The record whose name is exactly `name`.
    pub fn find(&self, name: &str) -> Result<Option<PoolRecord>> {
        Ok(self
            .list_all()?
            .into_iter()
            .find(|record| record.name() == name))
    }

    /// Single-pool existence check.
    #[instrument(skip(self))]
    pub fn status(&self, name: &str) -> Result<PoolStatus> {
        Ok(match self.find(name)? {
            Some(_) => PoolStatus::Present,
            None => PoolStatus::Absent,
        })
    }
}
