//! Script eligibility and selector resolution.

use std::sync::Arc;

use scripthost_core::{ScriptError, ScriptResult, path};
use scripthost_host::{ContentStore, FrontMatterReader};

use crate::module::ModuleKey;

/// Extensions of module sources handled by external evaluators.
pub const RECOGNIZED_EXTENSIONS: &[&str] = &[".js", ".cjs", ".mjs", ".ts", ".cts", ".mts"];

/// Eligibility of a path as an invocable script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub path: String,
    pub is_invocable: bool,
    /// Code block to evaluate inside a document.
    pub selector: Option<String>,
}

impl ScriptDescriptor {
    /// Key the script's module is cached under.
    pub fn load_key(&self) -> ModuleKey {
        ModuleKey::with_selector(self.path.clone(), self.selector.clone())
    }
}

/// Decides which paths are invocable scripts.
pub struct DescriptorResolver {
    store: Arc<dyn ContentStore>,
    front_matter: Arc<dyn FrontMatterReader>,
    extensions: Vec<String>,
}

impl DescriptorResolver {
    /// Create a resolver recognizing [`RECOGNIZED_EXTENSIONS`] plus `extra`.
    pub fn new<'a>(
        store: Arc<dyn ContentStore>,
        front_matter: Arc<dyn FrontMatterReader>,
        extra: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut extensions: Vec<String> = RECOGNIZED_EXTENSIONS.iter().map(|e| e.to_string()).collect();
        for ext in extra {
            let ext = ext.to_lowercase();
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }

        Self {
            store,
            front_matter,
            extensions,
        }
    }

    /// Whether a file name carries a recognized script extension.
    pub fn is_recognized(&self, file: &str) -> bool {
        let name = path::basename(file).to_lowercase();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// Describe a path without checking that it exists.
    pub async fn resolve(&self, file: &str) -> ScriptResult<ScriptDescriptor> {
        if path::is_markdown(file) {
            let settings = self.front_matter.note_settings(file).await?;
            return Ok(ScriptDescriptor {
                path: file.to_string(),
                is_invocable: settings.is_invocable,
                selector: settings
                    .invocable_code_script_name
                    .filter(|name| !name.is_empty()),
            });
        }

        Ok(ScriptDescriptor {
            path: file.to_string(),
            is_invocable: self.is_recognized(file),
            selector: None,
        })
    }

    /// Describe a path that must exist and be invocable.
    pub async fn resolve_invocable(&self, file: &str) -> ScriptResult<ScriptDescriptor> {
        if !self.store.exists(file).await {
            return Err(ScriptError::NotFound {
                path: file.to_string(),
            });
        }

        let descriptor = self.resolve(file).await?;
        if !descriptor.is_invocable {
            return Err(ScriptError::NotInvocable {
                path: file.to_string(),
            });
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scripthost_core::ErrorKind;
    use scripthost_host::{FsStore, YamlFrontMatter};
    use std::fs;
    use tempfile::TempDir;

    fn resolver(temp: &TempDir) -> DescriptorResolver {
        let store: Arc<dyn ContentStore> = Arc::new(FsStore::new(temp.path()));
        DescriptorResolver::new(
            Arc::clone(&store),
            Arc::new(YamlFrontMatter::new(store)),
            [".rhai", ".lua"],
        )
    }

    #[tokio::test]
    async fn test_extension_eligibility() {
        let temp = TempDir::new().unwrap();
        let resolver = resolver(&temp);

        for file in ["a.js", "b.MTS", "c.cjs", "d.rhai", "e.LUA"] {
            assert!(resolver.resolve(file).await.unwrap().is_invocable, "{file}");
        }
        for file in ["a.txt", "b.json", "tsconfig"] {
            assert!(!resolver.resolve(file).await.unwrap().is_invocable, "{file}");
        }
    }

    #[tokio::test]
    async fn test_markdown_front_matter() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("note.md"),
            "---\ncodeScriptToolkit:\n  isInvocable: true\n  invocableCodeScriptName: greet\n---\n",
        )
        .unwrap();
        fs::write(temp.path().join("plain.md"), "# Just a note\n").unwrap();
        let resolver = resolver(&temp);

        let descriptor = resolver.resolve("note.md").await.unwrap();
        assert!(descriptor.is_invocable);
        assert_eq!(
            descriptor.load_key(),
            ModuleKey::with_selector("note.md", Some("greet".into()))
        );

        let err = resolver.resolve_invocable("plain.md").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInvocable);
    }

    #[tokio::test]
    async fn test_resolve_invocable_missing() {
        let temp = TempDir::new().unwrap();
        let err = resolver(&temp).resolve_invocable("gone.rhai").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
