//! Recursive folder listing.
//!
//! Layered on top of the folder contract rather than part of it: a BFS over
//! sub-folder handles, re-rooting every object name at the entry folder so
//! callers see paths relative to where they started.

use std::collections::VecDeque;
use std::sync::Arc;

use walvault_common::{paths, Error, Result};

use crate::folder::{Folder, Object};

/// List every object under `folder`, at any depth. Names are relative to
/// `folder` itself.
pub async fn list_folder_recursively(folder: Arc<dyn Folder>) -> Result<Vec<Object>> {
    let entry_path = folder.path().to_string();
    let mut queue: VecDeque<Arc<dyn Folder>> = VecDeque::new();
    queue.push_back(folder);

    let mut collected = Vec::new();
    while let Some(current) = queue.pop_front() {
        let (objects, sub_folders) = current.list().await?;
        let prefix = current
            .path()
            .strip_prefix(&entry_path)
            .unwrap_or(current.path())
            .to_string();
        collected.extend(prepend_paths(objects, &prefix));
        queue.extend(sub_folders);
    }
    Ok(collected)
}

/// Like [`list_folder_recursively`], starting from `prefix` under `folder`.
///
/// When the prefix does not end with `/` it may name a single object; in that
/// case the parent folder is listed once and the match is returned without
/// recursing.
pub async fn list_folder_recursively_with_prefix(
    folder: Arc<dyn Folder>,
    prefix: &str,
) -> Result<Vec<Object>> {
    let check_file = !prefix.is_empty() && !prefix.ends_with('/');
    let prefix = prefix.trim_matches('/').to_string();

    if check_file {
        let (dir_name, file_name) = match prefix.rsplit_once('/') {
            Some((dir, file)) => (paths::with_delimiter(dir), file.to_string()),
            None => (String::new(), prefix.clone()),
        };
        let parent = if dir_name.is_empty() {
            Arc::clone(&folder)
        } else {
            folder.sub_folder(&dir_name)
        };
        let (objects, _) = parent
            .list()
            .await
            .map_err(|e| Error::transport(format!("can't list folder {dir_name:?}: {e}")))?;
        if let Some(found) = objects.into_iter().find(|o| o.name == file_name) {
            return Ok(prepend_paths(vec![found], &dir_name));
        }
    }

    let sub = if prefix.is_empty() {
        folder
    } else {
        folder.sub_folder(&format!("{prefix}/"))
    };
    let objects = list_folder_recursively(sub).await?;
    Ok(prepend_paths(objects, &prefix))
}

fn prepend_paths(objects: Vec<Object>, prefix: &str) -> Vec<Object> {
    if prefix.is_empty() {
        return objects;
    }
    objects
        .into_iter()
        .map(|mut o| {
            o.name = paths::join(prefix, &o.name);
            o
        })
        .collect()
}
