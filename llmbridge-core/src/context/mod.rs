//! Context collaborators
//!
//! The core never reads files itself. Callers supply the documents they have
//! open; a [`ContextProvider`] turns them into items an exchange can
//! reference, and a [`PolicyGate`] decides which identifiers are off limits.

pub mod policy;
pub mod selector;

pub use policy::DenyListPolicy;
pub use selector::{OpenDocumentSelector, MAX_CONTEXT_ITEMS, PREVIEW_LINES};

use serde::{Deserialize, Serialize};

/// A piece of context offered for an exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextItem {
    /// Stable identifier, usually a workspace-relative path
    pub id: String,
    /// Short display name
    pub label: String,
    /// Leading excerpt, already redacted
    pub preview: String,
}

/// A document the caller has open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDocument {
    pub id: String,
    pub text: String,
}

/// Where the user is working when context is requested
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorContext {
    /// Identifier of the focused document
    pub current_document: Option<String>,
    pub open_documents: Vec<OpenDocument>,
}

/// Chooses context items for the current cursor position
pub trait ContextProvider: Send + Sync {
    fn select_context(&self, cursor: &CursorContext) -> Vec<ContextItem>;
}

/// Decides whether an identifier may be shared with a backend
pub trait PolicyGate: Send + Sync {
    fn is_denied(&self, id: &str) -> bool;

    /// Mask sensitive text; the default leaves it unchanged
    fn redact(&self, text: &str) -> String {
        text.to_string()
    }
}
