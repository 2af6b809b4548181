//! ZIP extraction into a staging directory with path-traversal protection.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Decompress `src` into `dest`, creating `dest` as needed.
///
/// Security invariant: every entry materializes strictly inside `dest`.
/// Entry names are rebuilt component by component; absolute paths, drive
/// prefixes and `..` segments are rejected rather than resolved.
pub fn extract_zip(src: &Path, dest: &Path) -> Result<()> {
    let file = File::open(src).with_context(|| format!("open zip: {}", src.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("open zip")?;
    fs::create_dir_all(dest)
        .with_context(|| format!("create extract root: {}", dest.display()))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).context("open zip entry")?;
        let name = entry.name().to_string();
        let target = sanitize_entry_path(dest, &name)?;

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("create dir: {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir: {}", parent.display()))?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("create extracted file: {}", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("extract file: {}", target.display()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&target, fs::Permissions::from_mode(mode));
        }
    }
    Ok(())
}

/// Rebuild an archive entry name under `dest`, rejecting anything that
/// would escape it.
fn sanitize_entry_path(dest: &Path, name: &str) -> Result<PathBuf> {
    let mut target = dest.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("invalid zip path: {name}")
            }
        }
    }
    Ok(target)
}
