//! Context selection from the documents a caller has open

use crate::context::{ContextItem, ContextProvider, CursorContext, PolicyGate};
use std::sync::Arc;

/// Maximum number of items offered for one exchange
pub const MAX_CONTEXT_ITEMS: usize = 5;

/// Lines of each document kept in its preview
pub const PREVIEW_LINES: usize = 100;

/// Offers the caller's open documents, current one first
pub struct OpenDocumentSelector {
    policy: Arc<dyn PolicyGate>,
}

impl OpenDocumentSelector {
    pub fn new(policy: Arc<dyn PolicyGate>) -> Self {
        Self { policy }
    }
}

impl ContextProvider for OpenDocumentSelector {
    fn select_context(&self, cursor: &CursorContext) -> Vec<ContextItem> {
        let mut items: Vec<ContextItem> = cursor
            .open_documents
            .iter()
            .filter(|doc| !self.policy.is_denied(&doc.id))
            .map(|doc| ContextItem {
                id: doc.id.clone(),
                label: label_of(&doc.id).to_string(),
                preview: self.policy.redact(&preview_of(&doc.text)),
            })
            .collect();

        if let Some(current) = cursor.current_document.as_deref() {
            // Stable, so the remaining order is kept
            items.sort_by_key(|item| item.id != current);
        }
        items.truncate(MAX_CONTEXT_ITEMS);
        items
    }
}

fn label_of(id: &str) -> &str {
    id.rsplit(['/', '\\']).next().unwrap_or(id)
}

fn preview_of(text: &str) -> String {
    text.lines()
        .take(PREVIEW_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}
