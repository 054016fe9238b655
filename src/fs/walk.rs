//! Depth-first directory traversal --- [`walk_dir`].

use futures::future::BoxFuture;

use crate::error::{FsError, Result};
use crate::fs::{dispatch, DirEntry, Fs};
use crate::path;

/// Decision returned by a walk callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Keep walking.
    Continue,
    /// Skip the subtree rooted at the visited directory.
    SkipDir,
}

/// Walks the tree rooted at `root` depth-first, visiting every node
/// exactly once.
///
/// The callback receives the node's path, its entry (absent when the root
/// itself could not be stat'ed) and any listing error encountered at that
/// node. Listing errors are delivered to the callback at the failing
/// directory and abort the walk only if the callback returns `Err`.
pub async fn walk_dir<F>(fs: &dyn Fs, root: &str, visit: &mut F) -> Result<()>
where
    F: FnMut(&str, Option<&DirEntry>, Option<&FsError>) -> Result<WalkAction> + Send,
{
    match dispatch::stat(fs, root).await {
        Ok(info) => {
            let entry = DirEntry::from_info(info);
            walk(fs, root.to_owned(), entry, visit).await
        }
        Err(err) => {
            visit(root, None, Some(&err))?;
            Ok(())
        }
    }
}

fn walk<'a, F>(
    fs: &'a dyn Fs,
    node: String,
    entry: DirEntry,
    visit: &'a mut F,
) -> BoxFuture<'a, Result<()>>
where
    F: FnMut(&str, Option<&DirEntry>, Option<&FsError>) -> Result<WalkAction> + Send,
{
    Box::pin(async move {
        if visit(&node, Some(&entry), None)? == WalkAction::SkipDir {
            return Ok(());
        }
        if !entry.is_dir() {
            return Ok(());
        }
        match dispatch::read_dir(fs, &node).await {
            Ok(children) => {
                for child in children {
                    let child_path = path::join(&node, child.name());
                    walk(fs, child_path, child, visit).await?;
                }
            }
            Err(err) => {
                visit(&node, Some(&entry), Some(&err))?;
            }
        }
        Ok(())
    })
}
