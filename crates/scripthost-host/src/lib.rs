//! Host collaborators consumed by the script runtime.
//!
//! The runtime never talks to the host application directly. Everything it
//! needs (content storage, the action registry, user notifications, document
//! metadata, style injection and item selection) is expressed as a trait in
//! this crate, each with a stock implementation usable by a standalone host
//! and by tests.

mod actions;
mod frontmatter;
mod notice;
mod picker;
mod store;
mod styles;

use std::sync::Arc;

pub use actions::{Action, ActionFuture, ActionRegistry, ActionTable, Callback, CheckCallback};
pub use frontmatter::{FrontMatterReader, NoteSettings, YamlFrontMatter, note_settings_from_markdown};
pub use notice::{Notice, NoticeLevel, NoticeLog, Notifier, Reporter};
pub use picker::{PresetPicker, ScriptPicker};
pub use store::{ContentStore, FsStore, Listing};
pub use styles::{StyleHandle, StyleHost, StyleSheetSet};

/// Bundle of collaborators handed to the runtime at construction.
#[derive(Clone)]
pub struct HostServices {
    /// Content store holding scripts and documents.
    pub store: Arc<dyn ContentStore>,

    /// Host action registry.
    pub actions: Arc<dyn ActionRegistry>,

    /// User-visible notification surface.
    pub notifier: Arc<dyn Notifier>,

    /// Front matter accessor for documents.
    pub front_matter: Arc<dyn FrontMatterReader>,

    /// Style resource injection.
    pub styles: Arc<dyn StyleHost>,

    /// Interactive item selection.
    pub picker: Arc<dyn ScriptPicker>,
}

impl HostServices {
    /// Create services with YAML front matter, an in-memory style set and a
    /// picker that never selects anything.
    pub fn new(
        store: Arc<dyn ContentStore>,
        actions: Arc<dyn ActionRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            front_matter: Arc::new(YamlFrontMatter::new(Arc::clone(&store))),
            styles: Arc::new(StyleSheetSet::new()),
            picker: Arc::new(PresetPicker::none()),
            store,
            actions,
            notifier,
        }
    }

    /// Replace the style host.
    pub fn with_styles(mut self, styles: Arc<dyn StyleHost>) -> Self {
        self.styles = styles;
        self
    }

    /// Replace the picker.
    pub fn with_picker(mut self, picker: Arc<dyn ScriptPicker>) -> Self {
        self.picker = picker;
        self
    }

    /// Replace the front matter accessor.
    pub fn with_front_matter(mut self, front_matter: Arc<dyn FrontMatterReader>) -> Self {
        self.front_matter = front_matter;
        self
    }

    /// Reporter bound to this host's notifier.
    pub fn reporter(&self) -> Reporter {
        Reporter::new(Arc::clone(&self.notifier))
    }
}
