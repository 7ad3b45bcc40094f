//! Storage pool type definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PoolError, Result};

/// Libvirt storage pool backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    /// Local directory (file-based)
    Dir,
    /// Pre-formatted block device mounted as a filesystem
    Fs,
    /// Network filesystem (NFS, CIFS, glusterfs mount)
    Netfs,
    /// LVM volume group
    Logical,
    /// Physical disk with a partition table
    Disk,
    /// iSCSI target exposed through the host initiator
    Iscsi,
    /// iSCSI target accessed directly by QEMU
    #[serde(rename = "iscsi-direct")]
    IscsiDirect,
    /// SCSI host adapter
    Scsi,
    /// Multipath devices
    Mpath,
    /// Ceph RBD
    Rbd,
    /// Sheepdog cluster
    Sheepdog,
    /// Gluster volume accessed via libgfapi
    Gluster,
    /// ZFS pool
    Zfs,
    /// Virtuozzo storage
    Vstorage,
}

impl PoolType {
    /// The `type` attribute value libvirt expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::Dir => "dir",
            PoolType::Fs => "fs",
            PoolType::Netfs => "netfs",
            PoolType::Logical => "logical",
            PoolType::Disk => "disk",
            PoolType::Iscsi => "iscsi",
            PoolType::IscsiDirect => "iscsi-direct",
            PoolType::Scsi => "scsi",
            PoolType::Mpath => "mpath",
            PoolType::Rbd => "rbd",
            PoolType::Sheepdog => "sheepdog",
            PoolType::Gluster => "gluster",
            PoolType::Zfs => "zfs",
            PoolType::Vstorage => "vstorage",
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolType {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        let pool_type = match s {
            "dir" => PoolType::Dir,
            "fs" => PoolType::Fs,
            "netfs" => PoolType::Netfs,
            "logical" => PoolType::Logical,
            "disk" => PoolType::Disk,
            "iscsi" => PoolType::Iscsi,
            "iscsi-direct" => PoolType::IscsiDirect,
            "scsi" => PoolType::Scsi,
            "mpath" => PoolType::Mpath,
            "rbd" => PoolType::Rbd,
            "sheepdog" => PoolType::Sheepdog,
            "gluster" => PoolType::Gluster,
            "zfs" => PoolType::Zfs,
            "vstorage" => PoolType::Vstorage,
            other => {
                return Err(PoolError::InvalidSpec(format!("unknown pool type '{}'", other)))
            }
        };
        Ok(pool_type)
    }
}

/// Whether a pool should exist at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// Desired state of a storage pool.
///
/// Field names follow the manifest format (`sourcehost`, `sourcedev`, ...).
/// `sourcedev` accepts either a single path or a list of paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// Pool name, unique per hypervisor
    pub name: String,
    /// Backend type, fixed once the pool is defined
    #[serde(rename = "type")]
    pub pool_type: PoolType,
    #[serde(default)]
    pub ensure: Ensure,
    /// Desired running state
    #[serde(default = "default_active")]
    pub active: bool,
    /// Start with the hypervisor
    #[serde(default)]
    pub autostart: bool,
    /// Source host (netfs, iscsi, rbd, gluster, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcehost: Option<String>,
    /// Source directory path on the source host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcepath: Option<String>,
    /// Source block devices, in the order they are given
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub sourcedev: Vec<String>,
    /// Source name (volume group, RBD pool, iSCSI IQN, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcename: Option<String>,
    /// Source format (auto, nfs, lvm2, gpt, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourceformat: Option<String>,
    /// Target path on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

fn default_active() -> bool {
    true
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(dev) => vec![dev],
        OneOrMany::Many(devs) => devs,
    })
}

impl PoolSpec {
    /// Create a spec for an active, non-autostarted pool with no source.
    pub fn new(name: impl Into<String>, pool_type: PoolType) -> Self {
        Self {
            name: name.into(),
            pool_type,
            ensure: Ensure::Present,
            active: true,
            autostart: false,
            sourcehost: None,
            sourcepath: None,
            sourcedev: Vec::new(),
            sourcename: None,
            sourceformat: None,
            target: None,
        }
    }

    /// Spec that removes the named pool.
    pub fn absent(name: impl Into<String>, pool_type: PoolType) -> Self {
        Self {
            ensure: Ensure::Absent,
            ..Self::new(name, pool_type)
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    pub fn with_source_host(mut self, host: impl Into<String>) -> Self {
        self.sourcehost = Some(host.into());
        self
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.sourcepath = Some(path.into());
        self
    }

    pub fn with_source_device(mut self, device: impl Into<String>) -> Self {
        self.sourcedev.push(device.into());
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.sourcename = Some(name.into());
        self
    }

    pub fn with_source_format(mut self, format: impl Into<String>) -> Self {
        self.sourceformat = Some(format.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// True when any `<source>` sub-element would be emitted.
    pub fn has_source(&self) -> bool {
        self.sourcehost.is_some()
            || self.sourcepath.is_some()
            || !self.sourcedev.is_empty()
            || self.sourcename.is_some()
            || self.sourceformat.is_some()
    }

    /// Reject names that cannot round-trip through `virsh pool-list`.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PoolError::InvalidSpec("pool name must not be empty".to_string()));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(PoolError::InvalidSpec(format!(
                "pool name '{}' must not contain whitespace",
                self.name
            )));
        }
        if self.name.contains('/') {
            return Err(PoolError::InvalidSpec(format!(
                "pool name '{}' must not contain '/'",
                self.name
            )));
        }
        Ok(())
    }
}

/// Observed state of a defined pool, as reported by `virsh pool-list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolRecord {
    name: String,
    active: bool,
    autostart: bool,
}

impl PoolRecord {
    pub(crate) fn new(name: impl Into<String>, active: bool, autostart: bool) -> Self {
        Self {
            name: name.into(),
            active,
            autostart,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn autostart(&self) -> bool {
        self.autostart
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn set_autostart(&mut self, autostart: bool) {
        self.autostart = autostart;
    }
}

/// Result of a single-pool status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Present,
    Absent,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolStatus::Present => f.write_str("present"),
            PoolStatus::Absent => f.write_str("absent"),
        }
    }
}
