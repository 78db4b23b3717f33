/*!
 * End-to-end pipeline tests: taxonomy -> targets -> dispatcher -> store
 */

use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

use cdm_ingest::discovery::genome_ids_with_lineage;
use cdm_ingest::discovery::targets::{
    download_targets, fastani_upload_targets, genome_upload_targets, link_targets,
};
use cdm_ingest::{
    Downloader, FanOutDispatcher, Linker, MemoryStore, ObjectStore, RunReport, Uploader,
};

fn write_taxonomy(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("bac120_taxonomy_r214.tsv");
    std::fs::write(
        &path,
        "RS_GCF_000001.1\td__Bacteria;p__Pseudomonadota;c__Alphaproteobacteria\n\
         RS_GCF_000002.1\td__Bacteria;p__Pseudomonadota;c__Alphaproteobacteria\n\
         GB_GCA_000003.1\td__Bacteria;p__Pseudomonadota;c__Gammaproteobacteria\n\
         RS_GCF_000004.1\td__Bacteria;p__Pseudomonadota;c__Alphaproteobacteria\n",
    )
    .unwrap();
    path
}

fn write_genome(source: &Path, genome_id: &str, files: &[&str]) {
    let dir = source.join(genome_id);
    std::fs::create_dir_all(&dir).unwrap();
    for file in files {
        std::fs::write(dir.join(file), genome_id.as_bytes()).unwrap();
    }
}

#[tokio::test]
async fn test_genome_upload_run() {
    let dir = tempdir().unwrap();
    let taxonomy = write_taxonomy(dir.path());
    let source = dir.path().join("sourcedata");
    write_genome(&source, "GCF_000001.1", &["GCF_000001.1_ASM1_protein.faa.gz"]);
    write_genome(
        &source,
        "GCF_000002.1",
        &["GCF_000002.1_ASM2_protein.faa.gz", "GCF_000002.1_ASM2_genomic.fna.gz"],
    );
    write_genome(
        &source,
        "GCF_000004.1",
        &["a_protein.faa.gz", "b_protein.faa.gz"],
    );

    let ids = genome_ids_with_lineage(&[&taxonomy], &["c__Alphaproteobacteria"]).unwrap();
    assert_eq!(ids, vec!["GCF_000001.1", "GCF_000002.1", "GCF_000004.1"]);

    let targets = genome_upload_targets(&ids, &source, "protein.faa.gz", "NCBI");
    assert_eq!(targets.len(), 2);
    assert_eq!(targets.multi_match, vec!["GCF_000004.1"]);

    let store = Arc::new(MemoryStore::new("cdm"));
    store.insert("NCBI/GCF_000002.1_ASM2_protein.faa.gz", b"old");

    let summary = FanOutDispatcher::new(8)
        .run(targets.items.clone(), Arc::new(Uploader::new(store.clone())))
        .await;
    let report = RunReport::new(summary).with_targets(&targets);

    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.summary.skipped_samples, vec!["GCF_000002.1"]);
    assert!(report.summary.is_complete());
    assert_eq!(report.multi_match, vec!["GCF_000004.1"]);
    assert_eq!(
        store.get("NCBI/GCF_000001.1_ASM1_protein.faa.gz"),
        Some(b"GCF_000001.1".to_vec())
    );
    // Existing objects are left as they were
    assert_eq!(
        store.get("NCBI/GCF_000002.1_ASM2_protein.faa.gz"),
        Some(b"old".to_vec())
    );
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("sourcedata");
    let ids: Vec<String> = (1..=12).map(|i| format!("GCF_{:06}.1", i)).collect();
    for id in &ids {
        let name = format!("{}_protein.faa.gz", id);
        write_genome(&source, id, &[name.as_str()]);
    }
    let targets = genome_upload_targets(&ids, &source, "protein.faa.gz", "NCBI");
    let store = Arc::new(MemoryStore::new("cdm"));
    let dispatcher = FanOutDispatcher::new(4);

    let first = dispatcher
        .run(targets.items.clone(), Arc::new(Uploader::new(store.clone())))
        .await;
    assert_eq!(first.succeeded, 12);

    let second = dispatcher
        .run(targets.items.clone(), Arc::new(Uploader::new(store.clone())))
        .await;
    assert_eq!(second.succeeded, 0);
    assert_eq!(second.skipped, 12);
    assert_eq!(store.put_count(), 12);
}

#[tokio::test]
async fn test_fastani_upload_run() {
    let dir = tempdir().unwrap();
    let results = dir.path().join("MERGED_OUT");
    std::fs::create_dir_all(&results).unwrap();
    for name in ["s__Dyella_a.txt", "s__Dyella_a.txt.matrix", "s__Dyella_b.txt"] {
        std::fs::write(results.join(name), name.as_bytes()).unwrap();
    }

    let targets = fastani_upload_targets(
        &results,
        &["s__Dyella_a", "s__Dyella_b"],
        &[".txt", ".txt.matrix"],
        "FastANI/Rhodanobacteraceae",
    )
    .unwrap();
    let store = Arc::new(MemoryStore::new("cdm"));
    let summary = FanOutDispatcher::new(2)
        .run(targets.items, Arc::new(Uploader::new(store.clone())))
        .await;

    assert_eq!(summary.succeeded, 3);
    let keys: Vec<String> = store
        .list("FastANI/")
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert_eq!(
        keys,
        vec![
            "FastANI/Rhodanobacteraceae/s__Dyella_a.txt",
            "FastANI/Rhodanobacteraceae/s__Dyella_a.txt.matrix",
            "FastANI/Rhodanobacteraceae/s__Dyella_b.txt",
        ]
    );
}

#[tokio::test]
async fn test_download_run_with_failure() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("IMG");
    let store = Arc::new(MemoryStore::new("dts-staging"));
    store.insert("u1/img/submissions/2500001/2500001.faa", b">p1\nMK\n");
    store.insert("u1/img/submissions/2500002/2500002.faa", b">p2\nMA\n");
    store.insert("u1/img/submissions/2500002/2500002.fna", b">c\nACGT\n");
    store.fail_on("u1/img/submissions/2500002/2500002.faa");

    let objects = store.list("").await.unwrap();
    let targets = download_targets(&objects, &[".faa"], &dest);
    assert_eq!(targets.len(), 2);

    let summary = FanOutDispatcher::new(4)
        .run(targets.items, Arc::new(Downloader::new(store.clone())))
        .await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_samples, vec!["2500002"]);
    assert_eq!(
        std::fs::read(dest.join("2500001").join("2500001.faa")).unwrap(),
        b">p1\nMK\n"
    );
    assert!(!dest.join("2500002").join("2500002.faa").exists());
    assert!(!dest.join("2500002").join("2500002.faa.part").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_link_run() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("sourcedata").join("NCBI").join("NONE");
    let collection = dir
        .path()
        .join("collectionssource")
        .join("NONE")
        .join("CDM")
        .join("eggNOG");
    std::fs::create_dir_all(&collection).unwrap();
    write_genome(&source, "GCF_000001.1", &["GCF_000001.1_protein.faa.gz"]);
    write_genome(&source, "GCF_000002.1", &["GCF_000002.1_genomic.fna.gz"]);

    let ids = ["GCF_000001.1", "GCF_000002.1", "GCF_000009.1"];
    let targets = link_targets(&ids, &source, &collection);
    let linker = Arc::new(Linker::new(["protein.faa.gz"]));
    let dispatcher = FanOutDispatcher::new(2);

    let summary = dispatcher.run(targets.items.clone(), linker.clone()).await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_samples, vec!["GCF_000009.1"]);
    assert_eq!(
        std::fs::read_link(collection.join("GCF_000001.1")).unwrap(),
        source.join("GCF_000001.1")
    );

    // Second pass finds the link already in place
    let again = dispatcher.run(targets.items, linker).await;
    assert_eq!(again.succeeded, 0);
    assert_eq!(again.skipped, 2);
}
