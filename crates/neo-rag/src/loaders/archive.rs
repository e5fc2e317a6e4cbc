use std::fs::File;
use std::path::{Path, PathBuf};

use super::LoaderRegistry;
use crate::error::{RagError, Result};
use crate::types::Document;

/// Extract a zip archive into a scoped temp dir and load every member through
/// the registry. The temp dir is removed when this function returns or unwinds.
pub(crate) fn load_archive(
    registry: &LoaderRegistry,
    path: &Path,
    depth: usize,
) -> Result<Document> {
    if depth >= registry.archive_depth {
        return Err(RagError::load(
            path,
            format!("archive nesting deeper than {} levels", registry.archive_depth),
        ));
    }

    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| RagError::load(path, format!("failed to read archive: {}", e)))?;

    let builder = {
        let mut b = tempfile::Builder::new();
        b.prefix("neo-rag-archive-");
        b
    };
    let workdir = match &registry.scratch_dir {
        Some(dir) => builder.tempdir_in(dir)?,
        None => builder.tempdir()?,
    };

    let mut members: Vec<(PathBuf, PathBuf)> = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| RagError::load(path, format!("bad archive entry {}: {}", i, e)))?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(
                archive = %path.display(),
                entry = %entry.name(),
                "skipping archive entry outside extraction root"
            );
            continue;
        };
        let relative = relative.to_path_buf();

        let target = workdir.path().join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
        members.push((relative, target));
    }
    members.sort();

    let mut sections = Vec::new();
    let mut failed = 0usize;
    for (relative, target) in &members {
        match registry.load_at_depth(target, depth + 1) {
            Ok(doc) => sections.push(format!("--- {} ---\n{}", relative.display(), doc.content)),
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    archive = %path.display(),
                    entry = %relative.display(),
                    error = %e,
                    "skipping archive member"
                );
            }
        }
    }

    if sections.is_empty() {
        return Err(RagError::load(path, "archive contains no loadable files"));
    }

    tracing::debug!(
        archive = %path.display(),
        loaded = sections.len(),
        failed,
        "archive extracted"
    );

    let loaded = sections.len();
    Ok(Document::new(sections.join("\n\n"), path)
        .with_extra("archive_members", loaded.to_string())
        .with_extra("archive_failures", failed.to_string()))
}
