//! Interactive selection of a script.

use scripthost_core::BoxFuture;

/// Presents a list of items and returns the one the user picked.
pub trait ScriptPicker: Send + Sync {
    /// Returns `None` when the user dismissed the selection.
    fn pick<'a>(&'a self, items: &'a [String], placeholder: &'a str)
    -> BoxFuture<'a, Option<String>>;
}

/// Picker that always answers with a fixed item, if offered.
#[derive(Debug, Clone, Default)]
pub struct PresetPicker {
    choice: Option<String>,
}

impl PresetPicker {
    pub fn new(choice: impl Into<String>) -> Self {
        Self {
            choice: Some(choice.into()),
        }
    }

    /// Picker that always dismisses.
    pub fn none() -> Self {
        Self::default()
    }
}

impl ScriptPicker for PresetPicker {
    fn pick<'a>(
        &'a self,
        items: &'a [String],
        _placeholder: &'a str,
    ) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            self.choice
                .as_ref()
                .filter(|choice| items.contains(choice))
                .cloned()
        })
    }
}
