/// Cold-start path: removing build leftovers and reopening the tables found
/// in the data directory.
use anyhow::{Context, Result};
use sstable::{BlockCache, SsTable};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{Engine, Levels};

const SST_PREFIX: &str = "sst_";
const SST_EXTENSION: &str = ".sst";
const TMP_SUFFIX: &str = ".sst.tmp";
const SST_ID_DIGITS: usize = 20;

/// Parses the id out of a `sst_<id>.sst` file name.
///
/// Only the exact name [`Engine::get_sst_path`] produces is accepted: the id
/// must be 20 ASCII digits. `sst_0.sst` or `sst_+0.sst` would otherwise map
/// to the same id as a real table.
pub(crate) fn parse_sst_id(file_name: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix(SST_PREFIX)?
        .strip_suffix(SST_EXTENSION)?;
    if digits.len() != SST_ID_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl Engine {
    /// Removes leftover `.sst.tmp` files from interrupted table builds.
    /// Other files are left alone.
    pub(crate) fn cleanup_tmp_files(data_dir: &Path) {
        let Ok(entries) = std::fs::read_dir(data_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let p = entry.path();
            let is_tmp = p
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.ends_with(TMP_SUFFIX));
            if !is_tmp {
                continue;
            }
            match std::fs::remove_file(&p) {
                Ok(()) => debug!(path = %p.display(), "removed leftover tmp file"),
                Err(e) => warn!(path = %p.display(), error = %e, "failed to remove tmp file"),
            }
        }
    }

    /// Reopens every table in `data_dir`. Files whose names do not follow
    /// the `sst_<id>.sst` pattern are ignored.
    pub(crate) fn load_tables(data_dir: &Path, cache: &Arc<BlockCache>) -> Result<Levels> {
        let mut ids: Vec<u64> = std::fs::read_dir(data_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().and_then(parse_sst_id))
            .collect();
        // newest first
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();

        let mut levels = Levels {
            next_sst_id: ids.first().map_or(0, |&max| max + 1),
            ..Levels::default()
        };
        for id in ids {
            let path = Self::sst_path_in(data_dir, id);
            let table = SsTable::open(id, &path, Some(Arc::clone(cache)))
                .with_context(|| format!("failed to reopen {}", path.display()))?;
            levels.l0_sst_ids.push(id);
            levels.ssts.insert(id, Arc::new(table));
        }
        Ok(levels)
    }
}
