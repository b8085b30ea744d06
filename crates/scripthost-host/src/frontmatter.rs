//! Front matter access for markdown documents.

use std::sync::Arc;

use scripthost_core::{BoxFuture, ScriptResult};
use serde::Deserialize;

use crate::store::ContentStore;

/// Front matter key holding the toolkit settings of a document.
const SETTINGS_KEY: &str = "codeScriptToolkit";

/// Per-document toolkit settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSettings {
    /// Whether the document may be invoked as a script.
    #[serde(default)]
    pub is_invocable: bool,

    /// Name of the code block to invoke.
    #[serde(default)]
    pub invocable_code_script_name: Option<String>,
}

/// Reads toolkit settings from a document's front matter.
pub trait FrontMatterReader: Send + Sync {
    fn note_settings<'a>(&'a self, path: &'a str) -> BoxFuture<'a, ScriptResult<NoteSettings>>;
}

/// Front matter reader that parses the YAML header of documents in a store.
pub struct YamlFrontMatter {
    store: Arc<dyn ContentStore>,
}

impl YamlFrontMatter {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }
}

impl FrontMatterReader for YamlFrontMatter {
    fn note_settings<'a>(&'a self, path: &'a str) -> BoxFuture<'a, ScriptResult<NoteSettings>> {
        Box::pin(async move {
            let text = self.store.read(path).await?;
            Ok(note_settings_from_markdown(&text))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(rename = "codeScriptToolkit", default)]
    settings: Option<NoteSettings>,
}

/// Extract toolkit settings from markdown text.
///
/// Documents without front matter, or whose front matter does not parse,
/// are not invocable.
pub fn note_settings_from_markdown(text: &str) -> NoteSettings {
    let Some(header) = front_matter_block(text) else {
        return NoteSettings::default();
    };

    match serde_yaml::from_str::<FrontMatter>(header) {
        Ok(front_matter) => front_matter.settings.unwrap_or_default(),
        Err(e) => {
            tracing::debug!(target: "scripthost::frontmatter", key = SETTINGS_KEY, error = %e, "Ignoring unparsable front matter");
            NoteSettings::default()
        }
    }
}

/// The YAML between the opening and closing `---` lines.
fn front_matter_block(text: &str) -> Option<&str> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text
        .strip_prefix("---\r\n")
        .or_else(|| text.strip_prefix("---\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(&rest[..offset]);
        }
        offset += line.len();
    }
    None
}
