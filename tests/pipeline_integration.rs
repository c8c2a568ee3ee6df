//! End-to-end runs of the pipeline over on-disk descriptor collections.

use async_trait::async_trait;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use xz2::write::XzEncoder;

use sybil_hunter::analysis::{CsvFormat, FingerprintChanges, SimilarityMatrix};
use sybil_hunter::{
    Analysis, AnalysisError, DeliveryMode, Inbox, MemoryReporter, NetDocExtractor, ObjectFilter,
    Pipeline, PipelineError, SourceError,
};

fn fingerprint(i: u128) -> String {
    format!("{:040X}", 0xAB00 + i)
}

fn descriptor(i: u128) -> String {
    format!(
        "@type server-descriptor 1.0\n\
         router relay{i} 203.0.113.{i} 9001 0 0\n\
         platform Tor 0.2.7.6 on Linux\n\
         published 2015-07-31 1{i}:00:00\n\
         fingerprint {fpr}\n\
         uptime {uptime}\n\
         bandwidth 1000 2000 500\n\
         contact admin{i} at example dot org\n\
         reject *:*\n\
         router-signature\n\
         -----BEGIN SIGNATURE-----\n\
         c2lnbmF0dXJl\n\
         -----END SIGNATURE-----\n",
        i = i,
        fpr = fingerprint(i),
        uptime = 3600 * i,
    )
}

/// Five single-descriptor files named `d1` to `d5`.
fn descriptor_files() -> Vec<(String, String)> {
    (1..=5).map(|i| (format!("d{}", i), descriptor(i))).collect()
}

fn write_dir(files: &[(String, String)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

fn write_tar_xz(dir: &Path, files: &[(String, String)]) -> PathBuf {
    let path = dir.join("server-descriptors.tar.xz");
    let encoder = XzEncoder::new(File::create(&path).unwrap(), 6);
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("descriptors/{}", name), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
    path
}

/// Records the fingerprints of every delivered set.
struct Recorder {
    deliveries: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl Analysis for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn run(&mut self, mut inbox: Inbox) -> Result<(), AnalysisError> {
        while let Some(set) = inbox.recv().await {
            let fprs: Vec<String> = set
                .descriptors()
                .map(|d| d.fingerprints().map(|f| f.to_string()).collect())
                .unwrap_or_default();
            self.deliveries.lock().unwrap().push(fprs);
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

fn recorder() -> (Box<dyn Analysis>, Arc<Mutex<Vec<Vec<String>>>>) {
    let deliveries = Arc::new(Mutex::new(Vec::new()));
    (
        Box::new(Recorder {
            deliveries: Arc::clone(&deliveries),
        }),
        deliveries,
    )
}

#[tokio::test]
async fn test_directory_independent_mode() {
    let dir = write_dir(&descriptor_files());
    let (analysis, deliveries) = recorder();

    let stats = Pipeline::new(NetDocExtractor::default())
        .run(dir.path(), DeliveryMode::Independent, vec![analysis])
        .await
        .unwrap();

    assert_eq!(stats.entries_seen, 5);
    assert_eq!(stats.deliveries, 5);
    let deliveries = deliveries.lock().unwrap();
    let expected: Vec<Vec<String>> = (1..=5).map(|i| vec![fingerprint(i)]).collect();
    assert_eq!(*deliveries, expected);
}

#[tokio::test]
async fn test_archive_cumulative_mode() {
    let dir = TempDir::new().unwrap();
    let archive = write_tar_xz(dir.path(), &descriptor_files());
    let (first, first_seen) = recorder();
    let (second, second_seen) = recorder();

    let stats = Pipeline::new(NetDocExtractor::default())
        .run(&archive, DeliveryMode::Cumulative, vec![first, second])
        .await
        .unwrap();

    assert_eq!(stats.entries_admitted, 5);
    assert_eq!(stats.deliveries, 2);
    for seen in [first_seen, second_seen] {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 5);
    }
}

#[tokio::test]
async fn test_filter_restricts_delivered_relays() {
    let dir = write_dir(&descriptor_files());
    let (analysis, deliveries) = recorder();
    let filter = ObjectFilter::new().with_nickname("relay3");

    let stats = Pipeline::new(NetDocExtractor::new(filter))
        .run(dir.path(), DeliveryMode::Independent, vec![analysis])
        .await
        .unwrap();

    assert_eq!(stats.empty_sets, 4);
    assert_eq!(*deliveries.lock().unwrap(), vec![vec![fingerprint(3)]]);
}

#[tokio::test]
async fn test_empty_archive_in_cumulative_mode() {
    let dir = TempDir::new().unwrap();
    let archive = write_tar_xz(dir.path(), &[]);
    let (analysis, deliveries) = recorder();

    let result = Pipeline::new(NetDocExtractor::default())
        .run(&archive, DeliveryMode::Cumulative, vec![analysis])
        .await;

    assert!(matches!(result, Err(PipelineError::EmptyInput(_))));
    assert!(deliveries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_archive_is_fatal() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("broken.tar.xz");
    fs::write(&archive, b"definitely not xz").unwrap();
    let (analysis, deliveries) = recorder();

    let result = Pipeline::new(NetDocExtractor::default())
        .run(&archive, DeliveryMode::Independent, vec![analysis])
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::Source(SourceError::Archive { .. }))
    ));
    assert!(deliveries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unparseable_entries_are_reported_and_skipped() {
    let mut files = descriptor_files();
    files.push(("notes.txt".to_string(), "just some notes\n".to_string()));
    let dir = write_dir(&files);
    let reporter = Arc::new(MemoryReporter::new());
    let (analysis, deliveries) = recorder();

    let stats = Pipeline::new(NetDocExtractor::default())
        .with_reporter(reporter.clone())
        .run(dir.path(), DeliveryMode::Independent, vec![analysis])
        .await
        .unwrap();

    assert_eq!(stats.parse_failures, 1);
    assert_eq!(deliveries.lock().unwrap().len(), 5);
    assert_eq!(reporter.diagnostics().len(), 1);
}

#[tokio::test]
async fn test_similarity_matrix_and_fingerprint_changes() {
    let dir = TempDir::new().unwrap();
    let archive = write_tar_xz(dir.path(), &descriptor_files());
    let matrix_out = SharedBuffer::default();
    let changes_out = SharedBuffer::default();

    let analyses: Vec<Box<dyn Analysis>> = vec![
        Box::new(SimilarityMatrix::new(CsvFormat::Wide, matrix_out.clone())),
        Box::new(FingerprintChanges::new(changes_out.clone())),
    ];
    Pipeline::new(NetDocExtractor::default())
        .run(&archive, DeliveryMode::Cumulative, analyses)
        .await
        .unwrap();

    let csv = matrix_out.contents();
    let lines: Vec<&str> = csv.lines().collect();
    // Header plus C(5, 2) pairs.
    assert_eq!(lines.len(), 11);
    assert!(lines[1].starts_with(&format!("{},{},", fingerprint(1), fingerprint(2))));

    // Every relay has its own address.
    assert!(changes_out.contents().is_empty());
}
