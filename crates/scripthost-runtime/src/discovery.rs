//! Deterministic enumeration of invocable scripts under a folder.

use scripthost_core::{BoxFuture, ScriptResult, path};
use scripthost_host::ContentStore;

use crate::descriptor::DescriptorResolver;

/// List the invocable scripts under `folder`, relative to it.
///
/// Each level emits its files in collation order, then descends into its
/// subfolders in collation order.
pub async fn discover(
    store: &dyn ContentStore,
    resolver: &DescriptorResolver,
    folder: &str,
) -> ScriptResult<Vec<String>> {
    let mut found = Vec::new();
    walk(store, resolver, folder.to_string(), String::new(), &mut found).await?;
    tracing::debug!(target: "scripthost::bridge", folder, count = found.len(), "Discovered scripts");
    Ok(found)
}

fn walk<'a>(
    store: &'a dyn ContentStore,
    resolver: &'a DescriptorResolver,
    dir: String,
    relative: String,
    found: &'a mut Vec<String>,
) -> BoxFuture<'a, ScriptResult<()>> {
    Box::pin(async move {
        let listing = store.list(&dir).await?;

        for name in path::sorted_base_names(&listing.files) {
            let full = path::join([dir.as_str(), name.as_str()]);
            match resolver.resolve(&full).await {
                Ok(descriptor) if descriptor.is_invocable => {
                    found.push(path::join([relative.as_str(), name.as_str()]));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(target: "scripthost::bridge", path = %full, error = %e, "Skipping unreadable script");
                }
            }
        }

        for name in path::sorted_base_names(&listing.folders) {
            walk(
                store,
                resolver,
                path::join([dir.as_str(), name.as_str()]),
                path::join([relative.as_str(), name.as_str()]),
                found,
            )
            .await?;
        }

        Ok(())
    })
}
