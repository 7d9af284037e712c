//! Two-way reconciliation of host role selections with an Ansible
//! inventory and per-host variable files.
//!
//! The [`Reconciler`] keeps three views of a workspace in step:
//!
//! - the per-host role selection ([`SelectionStore`])
//! - the inventory file, grouped by role
//! - one host-vars file per host, mirroring the [`HostRegistry`]
//!
//! Files are reached through a [`FileStore`]: [`HttpStore`] talks to the
//! workspace files API, [`LocalStore`] works on a directory and
//! [`MemoryStore`] backs tests.
//!
//! # Example
//!
//! ```
//! use reconcile::{MemoryStore, ReconcileConfig, Reconciler};
//! use std::rc::Rc;
//!
//! let store = Rc::new(MemoryStore::new());
//! let engine = Reconciler::new(store.clone(), ReconcileConfig::default());
//! engine.switch_workspace("demo");
//! engine
//!     .edit_selection(|s| s.select_role("web", "nginx"))
//!     .unwrap();
//!
//! let inventory = store.content("demo", "inventory.yml").unwrap();
//! assert!(inventory.contains("nginx"));
//! ```

pub mod autosave;
pub mod backend;
pub mod cascade;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod guard;
pub mod hosts;
pub mod observer;
pub mod orphans;
pub mod queue;
pub mod selection;
pub mod types;
mod write_through;

pub use autosave::{AutosaveController, DocState, NavAction, NavDecision, OpenDocument};
pub use backend::http::HttpStore;
pub use backend::local::LocalStore;
pub use backend::memory::{MemoryStore, StoreOp};
pub use backend::{FileEntry, FileStore, normalize_path};
pub use cascade::{DeleteRequest, InventoryRepair, PurgeRequest, RenameRequest};
pub use engine::{EngineStatus, Reconciler, TickReport, WorkspaceState};
pub use error::{Error, ErrorCategory, Result};
pub use hosts::{AuthMethod, DEFAULT_PORT, HostRecord, HostRegistry};
pub use observer::{LogObserver, NoObserver, SyncObserver};
pub use orphans::{DeleteReport, OrphanFile, delete_orphans, find_orphans, scan_orphans};
pub use queue::{AliasMutation, MutationQueue};
pub use selection::SelectionStore;
pub use types::{
    AUTOSAVE_DEBOUNCE, HOST_VARS_DEBOUNCE, PassOutcome, ReconcileConfig, SkipReason,
};
