/*!
 * Tool-result normalization
 *
 * Turns eggNOG annotation spreadsheets and FastANI text output into flat CSV
 * files with identifier columns added, ready for loading. Spreadsheets are
 * read with `calamine` and every output is written with `csv`.
 */

use calamine::{open_workbook_auto, Data, Reader};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::discovery::locate::{find_files_with_suffix, list_subdirs};
use crate::discovery::targets::{clade_result_files, object_key};
use crate::dispatch::{FanOutDispatcher, RunSummary};
use crate::error::{CdmError, Result};
use crate::transfer::{FileTransferer, TransferError, TransferOutcome, WorkItem};

/// Suffix of the eggNOG-mapper annotation workbook
pub const ANNOTATIONS_XLSX_SUFFIX: &str = "emapper.annotations.xlsx";

/// Written by a completed eggNOG run
pub const RUN_METADATA_FILE: &str = "eggnog_run_metadata.json";

/// Batch directories produced by the compute jobs start with this
pub const BATCH_DIR_PREFIX: &str = "job";

/// Rows eggNOG-mapper puts above the header and below the data
const SUBMISSION_LEADING_ROWS: usize = 2;
const SUBMISSION_TRAILING_ROWS: usize = 3;

/// Output columns of the normalized FastANI table
pub const FASTANI_COLUMNS: [&str; 5] = ["G1", "G2", "ANI", "Overlap", "Total"];

/// Header row plus data rows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Add a column with the same value in every row
    pub fn push_constant_column(&mut self, name: &str, value: &str) {
        self.header.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.to_string());
        }
    }

    /// Same as [`Table::push_constant_column`], but as the first column
    pub fn insert_constant_column(&mut self, name: &str, value: &str) {
        self.header.insert(0, name.to_string());
        for row in &mut self.rows {
            row.insert(0, value.to_string());
        }
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Text form of one spreadsheet cell
///
/// Floats keep Rust's shortest round-trip form, so e-values stay `1.5e-50`;
/// whole numbers lose the trailing `.0`.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => format!("{:?}", f),
        other => other.to_string(),
    }
}

/// Every cell of the first worksheet, rendered with [`cell_text`]
pub fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>> {
    if !path.exists() {
        return Err(CdmError::MissingInput(path.to_path_buf()));
    }
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| CdmError::Spreadsheet(format!("{} has no worksheets", path.display())))??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// Annotation rows with comment and blank rows removed and `genome_id` prepended
///
/// The first row left after filtering is the header.
pub fn annotation_table(rows: Vec<Vec<String>>, genome_id: &str) -> Result<Table> {
    let mut kept = rows.into_iter().filter(|row| {
        let comment = row.first().is_some_and(|c| c.starts_with('#'));
        !comment && !is_blank(row)
    });

    let header = kept
        .next()
        .ok_or_else(|| CdmError::Malformed(format!("no header row for {}", genome_id)))?;
    let mut table = Table {
        header,
        rows: kept.collect(),
    };
    table.insert_constant_column("genome_id", genome_id);
    Ok(table)
}

/// `processed_<name>.csv` next to the workbook
fn processed_path(workbook: &Path) -> PathBuf {
    let name = workbook
        .file_name()
        .map(|n| n.to_string_lossy().replace(".xlsx", ".csv"))
        .unwrap_or_default();
    workbook.with_file_name(format!("processed_{}", name))
}

/// `(genome_id, workbook)` for every genome directory under `data_dir/<batch>/<genome>/`
///
/// A genome directory without a workbook is logged and left out.
pub fn eggnog_workbooks(data_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut workbooks = Vec::new();

    for batch_dir in list_subdirs(data_dir, None)? {
        for genome_dir in list_subdirs(&batch_dir, None)? {
            let found = find_files_with_suffix(&genome_dir, ANNOTATIONS_XLSX_SUFFIX);
            let Some(workbook) = found.into_iter().next() else {
                warn!("No annotation workbook in {}", genome_dir.display());
                continue;
            };
            let genome_id = genome_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            workbooks.push((genome_id, workbook));
        }
    }
    Ok(workbooks)
}

/// Normalize one genome's workbook; returns the CSV written next to it
pub fn normalize_genome_workbook(workbook: &Path, genome_id: &str) -> Result<PathBuf> {
    let table = annotation_table(read_first_sheet(workbook)?, genome_id)?;
    let output = processed_path(workbook);
    table.write_csv(&output)?;
    debug!(genome_id, rows = table.rows.len(), "wrote {}", output.display());
    Ok(output)
}

/// [`normalize_genome_workbook`] off the async runtime, as one work item
pub async fn normalize_workbook_item(genome_id: String, workbook: PathBuf) -> TransferOutcome {
    let written =
        tokio::task::spawn_blocking(move || normalize_genome_workbook(&workbook, &genome_id)).await;

    match written {
        Ok(Ok(_)) => TransferOutcome::Success,
        Ok(Err(e)) => TransferOutcome::Failed(TransferError::Other(e.to_string())),
        Err(e) => TransferOutcome::Failed(TransferError::Panicked(e.to_string())),
    }
}

/// Normalize every genome's annotation workbook under `data_dir/<batch>/<genome>/`
///
/// Each genome is its own work item: a corrupt or header-less workbook fails
/// that genome only. Setup errors (unreadable `data_dir`) are returned.
pub async fn normalize_eggnog_results(
    data_dir: &Path,
    dispatcher: &FanOutDispatcher,
) -> Result<RunSummary> {
    let workbooks = eggnog_workbooks(data_dir)?;
    info!("Normalizing {} genome eggNOG results", workbooks.len());

    Ok(dispatcher
        .run_with(
            workbooks,
            |(genome_id, _)| genome_id.clone(),
            |(genome_id, workbook)| normalize_workbook_item(genome_id, workbook),
        )
        .await)
}

#[derive(Debug, Deserialize)]
struct RunMetadata {
    #[serde(default)]
    source_file: Option<String>,
}

/// The `source_file` recorded by a completed eggNOG run in `data_dir`
pub fn read_source_file(data_dir: &Path) -> Result<String> {
    let metadata_path = data_dir.join(RUN_METADATA_FILE);
    let contents = std::fs::read_to_string(&metadata_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CdmError::MissingInput(metadata_path.clone()),
        _ => CdmError::Io(e),
    })?;
    let metadata: RunMetadata = serde_json::from_str(&contents)?;

    match metadata.source_file {
        Some(source) if !source.is_empty() => Ok(source),
        _ => Err(CdmError::Metadata(format!(
            "source_file not found in {}",
            metadata_path.display()
        ))),
    }
}

/// Submission rows without eggNOG's preamble and footer, plus provenance columns
pub fn submission_table(
    rows: Vec<Vec<String>>,
    data_id: &str,
    source_file_name: &str,
) -> Result<Table> {
    if rows.len() <= SUBMISSION_LEADING_ROWS + SUBMISSION_TRAILING_ROWS {
        return Err(CdmError::Malformed(format!(
            "annotation sheet for {} has only {} rows",
            data_id,
            rows.len()
        )));
    }

    let end = rows.len() - SUBMISSION_TRAILING_ROWS;
    let mut body = rows
        .into_iter()
        .take(end)
        .skip(SUBMISSION_LEADING_ROWS);
    let header = body.next().unwrap_or_default();
    let mut table = Table {
        header,
        rows: body.collect(),
    };
    table.push_constant_column("img_submission_id", data_id);
    table.push_constant_column("source_file_name", source_file_name);
    Ok(table)
}

/// Normalize one IMG submission's annotations; returns the CSV path
pub fn process_eggnog_submission(data_dir: &Path, data_id: &str) -> Result<PathBuf> {
    let source_file = read_source_file(data_dir)?;
    let source_name = Path::new(&source_file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(source_file.clone());

    let workbook = data_dir.join(format!("{}.emapper.annotations.xlsx", source_name));
    let table = submission_table(read_first_sheet(&workbook)?, data_id, &source_name)?;

    let output = data_dir.join(format!("{}.emapper.annotations.processed.csv", source_name));
    table.write_csv(&output)?;
    Ok(output)
}

/// `(data_id, dir)` for every submission under `result_dir/<batch_prefix*>/`
pub fn submission_dirs(result_dir: &Path, batch_prefix: &str) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for batch_dir in list_subdirs(result_dir, Some(batch_prefix))? {
        for data_dir in list_subdirs(&batch_dir, None)? {
            let data_id = data_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            dirs.push((data_id, data_dir));
        }
    }
    Ok(dirs)
}

/// Normalize one submission and upload the CSV under `<key_prefix>/<data_id>/`
///
/// Processing errors become a `Failed` outcome for this submission.
pub async fn process_and_upload(
    data_dir: PathBuf,
    data_id: String,
    key_prefix: String,
    uploader: Arc<dyn FileTransferer>,
) -> TransferOutcome {
    let id = data_id.clone();
    let processed =
        tokio::task::spawn_blocking(move || process_eggnog_submission(&data_dir, &id)).await;

    let csv_path = match processed {
        Ok(Ok(path)) => path,
        Ok(Err(e)) => return TransferOutcome::Failed(TransferError::Other(e.to_string())),
        Err(e) => return TransferOutcome::Failed(TransferError::Panicked(e.to_string())),
    };

    let name = csv_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let key = object_key(&object_key(&key_prefix, &data_id), &name);
    uploader
        .transfer(&WorkItem::upload(csv_path, key).with_label(data_id))
        .await
}

/// Genome accession from a FastANI path column: first two `_` fields of the file name
///
/// `/genomes/GCF_000005845.2_ASM584v2_genomic.fna.gz` -> `GCF_000005845.2`
pub fn genome_from_path(path: &str) -> String {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('_').take(2).collect::<Vec<_>>().join("_")
}

/// Rows of one whitespace-separated FastANI result file, as `FASTANI_COLUMNS`
pub fn fastani_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let [query, reference, ani, overlap, total] = fields.as_slice() else {
            return Err(CdmError::Malformed(format!(
                "{} line {}: expected 5 columns, found {}",
                path.display(),
                line_no + 1,
                fields.len()
            )));
        };
        rows.push(vec![
            genome_from_path(query),
            genome_from_path(reference),
            ani.to_string(),
            overlap.to_string(),
            total.to_string(),
        ]);
    }

    Ok(rows)
}

/// Concatenate the `.txt` results of every clade into one CSV at `output`
///
/// Returns the number of data rows written.
pub fn normalize_fastani_results<S: AsRef<str>>(
    results_dir: &Path,
    clade_ids: &[S],
    output: &Path,
) -> Result<usize> {
    let mut table = Table {
        header: FASTANI_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: Vec::new(),
    };

    for clade_id in clade_ids {
        let clade_id = clade_id.as_ref();
        let files = clade_result_files(results_dir, clade_id, &[".txt"])?;
        if files.is_empty() {
            warn!(clade_id, "no FastANI result file");
        }
        for file in files {
            table.rows.extend(fastani_rows(&file)?);
        }
    }

    table.write_csv(output)?;
    info!(
        rows = table.rows.len(),
        "wrote FastANI results to {}",
        output.display()
    );
    Ok(table.rows.len())
}
