use std::{
    collections::BTreeMap,
    fs::{File, create_dir, rename},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use rustix::fs::{Mode, chmod};

pub fn mkdir_p<P: AsRef<Path>>(path: P, mode: Mode) -> Result<()> {
    for dir in descending_dirs(&path.as_ref().to_string_lossy()) {
        match create_dir(&dir) {
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => (),
            Err(e) => return Err(anyhow!("unable to create directory {}: {}", dir, e)),
            Ok(_) => {
                debug!("Created directory {}", &dir);
                chmod(&dir, mode)
                    .map_err(|e| anyhow!("unable to change mode of {}: {}", dir, e))?;
            }
        }
    }
    Ok(())
}

// Given a path, return a list of it and its parents in descending order.
// For example, "/a/b/c", returns the Vector ["/a", "/a/b", "/a/b/c"].
fn descending_dirs(path: &str) -> Vec<String> {
    let dirs = path.split("/").collect::<Vec<&str>>();
    (1..=dirs.len())
        .map(|i| dirs[..i].join("/"))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Write through a temporary file in the same directory, then rename.
pub fn atomic_write<P: AsRef<Path>>(
    path: P,
    write: impl FnOnce(&File) -> Result<()>,
) -> Result<()> {
    let p = path.as_ref();
    let p_str = p.to_string_lossy();

    let dir_name = if p.is_absolute() {
        p.parent().unwrap_or(Path::new("/"))
    } else {
        p.parent()
            .map(|d| {
                if d.to_string_lossy().is_empty() {
                    Path::new(".")
                } else {
                    d
                }
            })
            .ok_or_else(|| anyhow!("invalid path {}", p_str))?
    };
    let file_name = p
        .file_name()
        .ok_or_else(|| anyhow!("invalid path {}", p_str))?;
    let file_name_tmp = dir_name.join(format!(".{}.tmp", file_name.to_string_lossy()));

    {
        let f = File::create(&file_name_tmp)
            .context(format!("unable to create {}", file_name_tmp.to_string_lossy()))?;
        write(&f).context(format!("unable to write {}", p_str))?;
        f.sync_all().context(format!("unable to sync {}", p_str))?;
    }

    rename(&file_name_tmp, p).context(format!(
        "unable to rename {} to {}",
        file_name_tmp.to_string_lossy(),
        p_str
    ))?;
    let dir_name_str = dir_name.to_string_lossy();
    let dir = File::open(dir_name).context(format!("unable to open directory {}", dir_name_str))?;
    dir.sync_all()
        .context(format!("unable to sync directory {}", dir_name_str))
}

pub fn write_files(files: &BTreeMap<PathBuf, String>) -> Result<()> {
    for (path, content) in files {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            mkdir_p(parent, Mode::from(0o755))?;
        }
        atomic_write(path, |mut f| {
            f.write_all(content.as_bytes())?;
            Ok(())
        })?;
        info!("Wrote {}", path.to_string_lossy());
    }
    Ok(())
}
