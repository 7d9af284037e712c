//! Autosave and leave-guard for the open document.
//!
//! ```text
//! Clean --edit--> Dirty --flush--> Saving --ok--> Clean
//!                                         \--err--> Error --edit/flush--> ...
//! ```
//!
//! A dirty document is flushed once it has been idle for the autosave
//! delay. Navigation away from a dirty document is deferred until the user
//! saves, cancels or discards.

use crate::backend::FileStore;
use crate::error::Result;
use std::time::{Duration, Instant};

/// Save state of the open document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocState {
    Clean,
    Dirty,
    Saving,
    /// Last flush failed; the edits are still unsaved
    Error(String),
}

/// An action that leaves the current document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavAction {
    SwitchWorkspace(String),
    SwitchTab(String),
    FollowLink(String),
    CloseWindow,
}

/// Result of asking to navigate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavDecision {
    /// Nothing unsaved, run the action now
    Proceed(NavAction),
    /// Action deferred; ask the user to save, cancel or discard
    Prompt,
}

/// A document open in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocument {
    pub workspace: String,
    pub path: String,
    pub content: String,
    saved: String,
    pub state: DocState,
}

impl OpenDocument {
    fn has_unsaved(&self) -> bool {
        !matches!(self.state, DocState::Clean)
    }
}

/// Autosave timer and leave-guard for one editor.
#[derive(Debug)]
pub struct AutosaveController {
    delay: Duration,
    document: Option<OpenDocument>,
    deadline: Option<Instant>,
    pending: Option<NavAction>,
}

impl AutosaveController {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            document: None,
            deadline: None,
            pending: None,
        }
    }

    /// Show a document. Any previous document is replaced without saving.
    pub fn open(&mut self, workspace: &str, path: &str, content: String) {
        self.document = Some(OpenDocument {
            workspace: workspace.to_string(),
            path: path.to_string(),
            saved: content.clone(),
            content,
            state: DocState::Clean,
        });
        self.deadline = None;
    }

    pub fn document(&self) -> Option<&OpenDocument> {
        self.document.as_ref()
    }

    pub fn path(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.path.as_str())
    }

    pub fn state(&self) -> Option<&DocState> {
        self.document.as_ref().map(|d| &d.state)
    }

    /// Whether the open document has unsaved edits.
    pub fn is_dirty(&self) -> bool {
        self.document.as_ref().is_some_and(OpenDocument::has_unsaved)
    }

    /// Whether `path` is open with unsaved edits.
    pub fn is_dirty_at(&self, workspace: &str, path: &str) -> bool {
        self.document
            .as_ref()
            .is_some_and(|d| d.workspace == workspace && d.path == path && d.has_unsaved())
    }

    /// Replace the buffer content and restart the autosave timer.
    pub fn edit(&mut self, content: String, now: Instant) {
        let Some(doc) = self.document.as_mut() else {
            return;
        };
        if content == doc.saved {
            doc.content = content;
            doc.state = DocState::Clean;
            self.deadline = None;
            return;
        }
        doc.content = content;
        doc.state = DocState::Dirty;
        self.deadline = Some(now + self.delay);
    }

    /// Flush if the timer has fired. Returns the flush result, if one ran.
    pub fn tick(&mut self, now: Instant, store: &dyn FileStore) -> Option<Result<()>> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        Some(self.flush(store))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Write unsaved edits. A clean document is a successful no-op.
    pub fn flush(&mut self, store: &dyn FileStore) -> Result<()> {
        let Some(doc) = self.document.as_mut() else {
            return Ok(());
        };
        if !doc.has_unsaved() {
            return Ok(());
        }

        doc.state = DocState::Saving;
        self.deadline = None;
        match store.write_file(&doc.workspace, &doc.path, &doc.content) {
            Ok(()) => {
                log::info!("Saved {}", doc.path);
                doc.saved = doc.content.clone();
                doc.state = DocState::Clean;
                Ok(())
            }
            Err(e) => {
                log::warn!("Autosave of {} failed: {e}", doc.path);
                doc.state = DocState::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// Ask to leave the document.
    pub fn request(&mut self, action: NavAction) -> NavDecision {
        if self.is_dirty() {
            log::debug!("Deferring {action:?}: unsaved edits");
            self.pending = Some(action);
            NavDecision::Prompt
        } else {
            NavDecision::Proceed(action)
        }
    }

    /// The deferred action, if any.
    pub fn pending(&self) -> Option<&NavAction> {
        self.pending.as_ref()
    }

    /// Flush, then hand back the deferred action. On failure the action
    /// stays pending.
    pub fn save_and_continue(&mut self, store: &dyn FileStore) -> Result<Option<NavAction>> {
        self.flush(store)?;
        Ok(self.pending.take())
    }

    /// Drop the deferred action and keep editing.
    pub fn cancel(&mut self) -> Option<NavAction> {
        self.pending.take()
    }

    /// Throw away unsaved edits and hand back the deferred action.
    pub fn discard(&mut self) -> Option<NavAction> {
        if let Some(doc) = self.document.as_mut() {
            doc.content = doc.saved.clone();
            doc.state = DocState::Clean;
        }
        self.deadline = None;
        self.pending.take()
    }

    /// Point the buffer at a renamed file. Returns true if it was open.
    pub fn repoint(&mut self, workspace: &str, from: &str, to: &str) -> bool {
        match self.document.as_mut() {
            Some(doc) if doc.workspace == workspace && doc.path == from => {
                doc.path = to.to_string();
                true
            }
            _ => false,
        }
    }

    /// Close the buffer, dropping unsaved edits, if it shows `path`.
    pub fn close_if(&mut self, workspace: &str, path: &str) -> bool {
        let open = self
            .document
            .as_ref()
            .is_some_and(|d| d.workspace == workspace && d.path == path);
        if open {
            self.close();
        }
        open
    }

    /// Close the buffer without saving.
    pub fn close(&mut self) {
        self.document = None;
        self.deadline = None;
        self.pending = None;
    }
}
