//! Lineage filter over GTDB taxonomy files (e.g. `bac120_taxonomy_r214.tsv`)

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{CdmError, Result};

/// Length of the GTDB source prefix (`RS_`, `GB_`) that NCBI ids don't carry
pub const SOURCE_PREFIX_LEN: usize = 3;

/// Drop the GTDB source prefix: `RS_GCF_000979555.1` -> `GCF_000979555.1`
///
/// The prefix is counted in characters, not bytes.
pub fn strip_source_prefix(id: &str) -> &str {
    match id.char_indices().nth(SOURCE_PREFIX_LEN) {
        Some((cut, _)) => &id[cut..],
        None => "",
    }
}

/// Genome ids whose lineage column contains any of `lineages`
///
/// Each line is `id<TAB>lineage[<TAB>...]`. Output follows file order then
/// line order. A row that matches several target lineages is emitted once per
/// match, and ids present in several files are emitted once per file.
pub fn genome_ids_with_lineage<P, S>(taxonomy_files: &[P], lineages: &[S]) -> Result<Vec<String>>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let mut genome_ids = Vec::new();

    for file_path in taxonomy_files {
        let file_path = file_path.as_ref();
        let file = File::open(file_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CdmError::MissingInput(file_path.to_path_buf()),
            _ => CdmError::Io(e),
        })?;

        let before = genome_ids.len();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let mut columns = line.trim().split('\t');
            let (Some(id), Some(lineage)) = (columns.next(), columns.next()) else {
                debug!(file = %file_path.display(), line = line_no + 1, "row has no lineage column");
                continue;
            };

            for target in lineages {
                if lineage.contains(target.as_ref()) {
                    genome_ids.push(strip_source_prefix(id).to_string());
                }
            }
        }

        info!(
            file = %file_path.display(),
            matched = genome_ids.len() - before,
            "scanned taxonomy file"
        );
    }

    Ok(genome_ids)
}
