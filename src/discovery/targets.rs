//! Work-list builders, one per entry point
//!
//! Builders never touch the object store. Identifiers that can't be turned
//! into exactly one work item land in the `no_match` / `multi_match` lists
//! instead of failing the run.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::locate::find_files_with_suffix;
use crate::error::{CdmError, Result};
use crate::store::ObjectEntry;
use crate::transfer::WorkItem;

/// A work list plus the identifiers that could not be resolved
#[derive(Debug, Clone, Default, Serialize)]
pub struct Targets {
    #[serde(skip)]
    pub items: Vec<WorkItem>,
    pub no_match: Vec<String>,
    pub multi_match: Vec<String>,
}

impl Targets {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Join a key prefix and a file name with exactly one `/` between them
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// One upload per genome whose directory holds exactly one file ending in `suffix`
///
/// The object key is `<key_prefix>/<file name>`.
pub fn genome_upload_targets<S: AsRef<str>>(
    genome_ids: &[S],
    source_dir: &Path,
    suffix: &str,
    key_prefix: &str,
) -> Targets {
    let mut targets = Targets::default();

    for genome_id in genome_ids {
        let genome_id = genome_id.as_ref();
        let mut matching = find_files_with_suffix(&source_dir.join(genome_id), suffix);

        match matching.len() {
            0 => targets.no_match.push(genome_id.to_string()),
            1 => {
                let upload_file = matching.remove(0);
                let name = upload_file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let key = object_key(key_prefix, &name);
                targets
                    .items
                    .push(WorkItem::upload(upload_file, key).with_label(genome_id));
            }
            n => {
                debug!(genome_id, matches = n, "more than one candidate file");
                targets.multi_match.push(genome_id.to_string());
            }
        }
    }

    if !targets.no_match.is_empty() || !targets.multi_match.is_empty() {
        warn!(
            no_match = targets.no_match.len(),
            multi_match = targets.multi_match.len(),
            "some genomes did not resolve to a single file"
        );
    }
    targets
}

/// Clade names, one per line (blank lines ignored)
pub fn read_clade_ids(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CdmError::MissingInput(path.to_path_buf()),
        _ => CdmError::Io(e),
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Entries of `results_dir` (non-recursive) whose name contains `clade_id`
/// and ends with one of `suffixes`
pub fn clade_result_files<S: AsRef<str>>(
    results_dir: &Path,
    clade_id: &str,
    suffixes: &[S],
) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(results_dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CdmError::MissingInput(results_dir.to_path_buf()),
        _ => CdmError::Io(e),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.contains(clade_id) && suffixes.iter().any(|s| name.ends_with(s.as_ref())) {
            files.push(results_dir.join(name));
        }
    }
    files.sort();
    Ok(files)
}

/// FastANI result uploads for the given clades
///
/// Clades with no result file are listed under `no_match`.
pub fn fastani_upload_targets<C: AsRef<str>, S: AsRef<str>>(
    results_dir: &Path,
    clade_ids: &[C],
    suffixes: &[S],
    key_prefix: &str,
) -> Result<Targets> {
    let mut targets = Targets::default();

    for clade_id in clade_ids {
        let clade_id = clade_id.as_ref();
        let files = clade_result_files(results_dir, clade_id, suffixes)?;
        if files.is_empty() {
            targets.no_match.push(clade_id.to_string());
            continue;
        }
        for file in files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = object_key(key_prefix, &name);
            targets.items.push(WorkItem::upload(file, key));
        }
    }

    Ok(targets)
}

/// One link per genome: `collection_dir/<id>` -> `source_root/<id>`
pub fn link_targets<S: AsRef<str>>(
    genome_ids: &[S],
    source_root: &Path,
    collection_dir: &Path,
) -> Targets {
    let items = genome_ids
        .iter()
        .map(|id| {
            let id = id.as_ref();
            WorkItem::link(source_root.join(id), collection_dir.join(id)).with_label(id)
        })
        .collect();
    Targets {
        items,
        ..Default::default()
    }
}

/// Downloads for listed objects ending (case-insensitively) in one of `suffixes`
///
/// Keys look like `<uuid>/img/submissions/<genome folder>/<file>`; each file
/// lands in `dest_root/<genome folder>/<file>`.
pub fn download_targets<S: AsRef<str>>(
    objects: &[ObjectEntry],
    suffixes: &[S],
    dest_root: &Path,
) -> Targets {
    let suffixes: Vec<String> = suffixes.iter().map(|s| s.as_ref().to_lowercase()).collect();
    let mut targets = Targets::default();

    for object in objects {
        let lower = object.key.to_lowercase();
        if !suffixes.iter().any(|s| lower.ends_with(s)) {
            continue;
        }

        let mut parts = object.key.rsplit('/');
        let file_name = parts.next().unwrap_or_default();
        let Some(genome_folder) = parts.next() else {
            debug!(key = %object.key, "key has no parent folder");
            targets.no_match.push(object.key.clone());
            continue;
        };

        let local = dest_root.join(genome_folder).join(file_name);
        targets
            .items
            .push(WorkItem::download(object.key.clone(), local).with_label(genome_folder));
    }

    targets
}
