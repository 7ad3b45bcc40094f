//! # limiquantix Pool
//!
//! Libvirt storage pool provider driven through the `virsh` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Reconciler                  │
//! │  (create, destroy, set_active, autostart)   │
//! └───────┬───────────────┬─────────────────────┘
//!         │               │
//!         ▼               ▼
//! ┌──────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │ ReconcileContext │ │ PoolDescriptor  │ │ InventoryLister │
//! │    (prefetch)    │ │   (pool XML)    │ │ (pool-list -q)  │
//! └────────┬─────────┘ └─────────────────┘ └────────┬────────┘
//!          └──────────────────┬────────────────────┘
//!                              ▼
//!                   ┌─────────────────────┐
//!                   │   Virsh<Runner>     │
//!                   │ SystemRunner / Mock │
//!                   └─────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use limiquantix_pool::{reconcile_all, MockVirsh, PoolSpec, PoolType, Virsh};
//!
//! let virsh = Virsh::new(MockVirsh::new());
//! let specs = vec![
//!     PoolSpec::new("images", PoolType::Dir)
//!         .with_target("/var/lib/libvirt/images")
//!         .with_autostart(true),
//! ];
//!
//! let pass = reconcile_all(&virsh, &specs).unwrap();
//! assert_eq!(pass.failures(), 0);
//! ```

pub mod cache;
pub mod descriptor;
pub mod error;
pub mod inventory;
pub mod mock;
pub mod reconciler;
pub mod types;
pub mod virsh;

pub use cache::ReconcileContext;
pub use descriptor::{build_descriptor, PoolDescriptor};
pub use error::{PoolError, Result};
pub use inventory::{parse_pool_list, InventoryLister};
pub use mock::{MockPool, MockVirsh};
pub use reconciler::{
    reconcile_all,
    step_policy,
    PassReport,
    PoolAction,
    PoolOutcome,
    ReconcileReport,
    Reconciler,
    SoftFailure,
    StepPolicy,
    Transition,
};
pub use types::{Ensure, PoolRecord, PoolSpec, PoolStatus, PoolType};
pub use virsh::{CommandRunner, SystemRunner, Virsh};
