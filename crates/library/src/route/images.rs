use super::{Action, fs};
use crate::error::{ErrorKind, Result};
use crate::resolve::Layout;
use crate::{Context, MATERIALS_DIR, PROJECT_MARKER};
use exn::ResultExt;
use std::path::PathBuf;

/// Copy images lying directly in the project root or `12/开评标资料` into
/// the output. Originals are kept; name collisions are always suffixed.
pub(super) fn collect(layout: &Layout, ctx: &Context) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    for dir in [layout.root.clone(), layout.root.join(PROJECT_MARKER).join(MATERIALS_DIR)] {
        if !dir.is_dir() {
            continue;
        }
        let mut images: Vec<PathBuf> = std::fs::read_dir(&dir)
            .or_raise(|| ErrorKind::Io)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && ctx.is_image(path))
            .collect();
        images.sort();
        for from in images {
            let Some(name) = from.file_name() else { continue };
            let to = fs::unique_path(&layout.output.join(name));
            if !ctx.dry_run {
                std::fs::copy(&from, &to).or_raise(|| ErrorKind::Io)?;
            }
            tracing::info!(from = %from.display(), to = %to.display(), dry_run = ctx.dry_run, "Copied image");
            actions.push(Action::Copied { from, to });
        }
    }
    Ok(actions)
}
