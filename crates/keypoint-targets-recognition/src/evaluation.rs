//! Detection quality against labelled test images.

use crate::lists::load_test_list;
use crate::{
    EvaluationError, ImagePreprocessor, LoadError, LoadMode, MatchResult, RecognitionEngine,
    TestEntry,
};
use keypoint_targets_core::GrayImageView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Precision, recall and accuracy of one comparison (or their means).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub accuracy: f64,
}

/// Compare detected and expected ids as multisets.
///
/// Each detected id matches at most one expected occurrence. Precision and
/// recall are 0 when their denominator is empty; accuracy is the multiset
/// Jaccard index, and 1 when both sides are empty.
pub fn score_detections(detected: &[u32], expected: &[u32]) -> Metrics {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for &id in expected {
        *counts.entry(id).or_default() += 1;
    }
    let mut true_positives = 0usize;
    for id in detected {
        if let Some(c) = counts.get_mut(id).filter(|c| **c > 0) {
            *c -= 1;
            true_positives += 1;
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let union = detected.len() + expected.len() - true_positives;
    Metrics {
        precision: ratio(true_positives, detected.len()),
        recall: ratio(true_positives, expected.len()),
        accuracy: if union == 0 {
            1.0
        } else {
            ratio(true_positives, union)
        },
    }
}

/// Per-image evaluation outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub filename: String,
    /// Detected ids, sorted ascending.
    pub detected: Vec<u32>,
    pub expected: Vec<u32>,
    #[serde(flatten)]
    pub metrics: Metrics,
    /// Sum of detected ids (e.g. the total value of recognized banknotes).
    pub detected_sum: u64,
    pub elapsed_ms: f64,
}

/// Mean metrics over the processed images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    #[serde(flatten)]
    pub metrics: Metrics,
    pub processed: usize,
    /// Images that failed to load; not part of the means.
    pub skipped: usize,
}

/// Full evaluation output, written as `<output_dir>/<tag>_results.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub tag: String,
    pub records: Vec<EvaluationRecord>,
    pub aggregate: EvaluationSummary,
}

impl EvaluationReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, EvaluationError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| EvaluationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), EvaluationError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| EvaluationError::Output {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_to(file)
    }

    fn write_to(&self, file: File) -> Result<(), EvaluationError> {
        let mut w = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut w, self)?;
        w.flush().map_err(serde_json::Error::io)?;
        Ok(())
    }
}

/// Draws accepted detections over a test image.
pub trait DetectionRenderer: Send + Sync {
    fn render(
        &self,
        image: &GrayImageView<'_>,
        detections: &[MatchResult],
        caption: &str,
        out_path: &Path,
    ) -> Result<(), LoadError>;
}

/// Where and how an evaluation writes its outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOptions {
    pub output_dir: PathBuf,
    /// Names every output file of this run.
    pub tag: String,
    /// Render each processed image with its detections.
    pub save_results: bool,
}

impl EvaluationOptions {
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_results.json", self.tag))
    }

    pub fn overlay_path(&self, image_path: &Path) -> PathBuf {
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output_dir.join(format!("{stem}_{}.png", self.tag))
    }
}

/// Runs a [`RecognitionEngine`] over a labelled test set.
pub struct EvaluationHarness<'a> {
    engine: &'a RecognitionEngine,
    preprocessor: &'a dyn ImagePreprocessor,
    renderer: Option<&'a dyn DetectionRenderer>,
    options: EvaluationOptions,
}

impl<'a> EvaluationHarness<'a> {
    pub fn new(
        engine: &'a RecognitionEngine,
        preprocessor: &'a dyn ImagePreprocessor,
        options: EvaluationOptions,
    ) -> Self {
        Self {
            engine,
            preprocessor,
            renderer: None,
            options,
        }
    }

    pub fn with_renderer(mut self, renderer: &'a dyn DetectionRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[inline]
    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    /// Evaluate every image of a test list; image paths resolve against
    /// `image_dir`.
    pub fn run(
        &self,
        test_list: impl AsRef<Path>,
        image_dir: impl AsRef<Path>,
    ) -> Result<EvaluationReport, EvaluationError> {
        let entries = load_test_list(test_list, image_dir)?;
        self.run_entries(&entries)
    }

    /// Evaluate `entries` and write the JSON report.
    ///
    /// The output directory and report file are created before any image is
    /// processed; failing that, nothing runs.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(images = entries.len(), tag = %self.options.tag))
    )]
    pub fn run_entries(&self, entries: &[TestEntry]) -> Result<EvaluationReport, EvaluationError> {
        let out_dir = &self.options.output_dir;
        fs::create_dir_all(out_dir).map_err(|source| EvaluationError::Output {
            path: out_dir.clone(),
            source,
        })?;
        let report_path = self.options.report_path();
        let report_file = File::create(&report_path).map_err(|source| EvaluationError::Output {
            path: report_path.clone(),
            source,
        })?;

        let start = Instant::now();
        log::info!("evaluating {} test image(s)", entries.len());
        let mut records = Vec::with_capacity(entries.len());
        let mut skipped = 0usize;
        for (i, entry) in entries.iter().enumerate() {
            log::info!(
                "image {} ({}/{})",
                entry.image_path.display(),
                i + 1,
                entries.len()
            );
            match self.evaluate_one(entry) {
                Ok(record) => records.push(record),
                Err(err) => {
                    log::warn!("skipping {}: {err}", entry.image_path.display());
                    skipped += 1;
                }
            }
        }

        let report = EvaluationReport {
            tag: self.options.tag.clone(),
            aggregate: summarize(&records, skipped),
            records,
        };
        report.write_to(report_file)?;

        let m = report.aggregate.metrics;
        log::info!(
            "evaluation finished in {:.1} s: precision {:.3} | recall {:.3} | accuracy {:.3}",
            start.elapsed().as_secs_f64(),
            m.precision,
            m.recall,
            m.accuracy
        );
        Ok(report)
    }

    fn evaluate_one(&self, entry: &TestEntry) -> Result<EvaluationRecord, LoadError> {
        let start = Instant::now();
        let image = self.preprocessor.load(&entry.image_path, LoadMode::Gray)?;
        let detections = self.engine.detect(&image.view());

        let mut detected: Vec<u32> = detections.iter().map(|d| d.target_id).collect();
        detected.sort_unstable();
        let detected_sum = detected.iter().map(|&id| id as u64).sum();
        let metrics = score_detections(&detected, &entry.expected);

        let caption = global_caption(detected_sum, &detected);
        log::info!(
            "{caption} | precision {:.3} | recall {:.3} | accuracy {:.3}",
            metrics.precision,
            metrics.recall,
            metrics.accuracy
        );

        if let (true, Some(renderer)) = (self.options.save_results, self.renderer) {
            let out = self.options.overlay_path(&entry.image_path);
            if let Err(err) = renderer.render(&image.view(), &detections, &caption, &out) {
                log::warn!("could not save {}: {err}", out.display());
            }
        }

        Ok(EvaluationRecord {
            filename: entry
                .image_path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            detected,
            expected: entry.expected.clone(),
            metrics,
            detected_sum,
            elapsed_ms: start.elapsed().as_secs_f64() * 1e3,
        })
    }
}

fn global_caption(sum: u64, ids: &[u32]) -> String {
    if ids.is_empty() {
        return format!("Global result: {sum}");
    }
    let list: Vec<String> = ids.iter().map(u32::to_string).collect();
    format!("Global result: {sum} ( {} )", list.join(" "))
}

/// Mean metrics over `records`; all zeros when there are none.
pub fn summarize(records: &[EvaluationRecord], skipped: usize) -> EvaluationSummary {
    let n = records.len();
    if n == 0 {
        return EvaluationSummary {
            skipped,
            ..EvaluationSummary::default()
        };
    }
    let sum = records.iter().fold(Metrics::default(), |acc, r| Metrics {
        precision: acc.precision + r.metrics.precision,
        recall: acc.recall + r.metrics.recall,
        accuracy: acc.accuracy + r.metrics.accuracy,
    });
    EvaluationSummary {
        metrics: Metrics {
            precision: sum.precision / n as f64,
            recall: sum.recall / n as f64,
            accuracy: sum.accuracy / n as f64,
        },
        processed: n,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exact_multiset_match_is_perfect() {
        let m = score_detections(&[1, 1], &[1, 1]);
        assert_eq!(
            m,
            Metrics {
                precision: 1.0,
                recall: 1.0,
                accuracy: 1.0
            }
        );
    }

    #[test]
    fn repeated_ids_count_once_per_occurrence() {
        // detected {5,5,10}, expected {5,20}: one true positive
        let m = score_detections(&[5, 5, 10], &[5, 20]);
        assert_relative_eq!(m.precision, 1.0 / 3.0);
        assert_relative_eq!(m.recall, 0.5);
        assert_relative_eq!(m.accuracy, 0.25);
    }

    #[test]
    fn empty_sides() {
        let none = score_detections(&[], &[]);
        assert_eq!((none.precision, none.recall, none.accuracy), (0.0, 0.0, 1.0));

        let missed = score_detections(&[], &[5]);
        assert_eq!((missed.precision, missed.recall, missed.accuracy), (0.0, 0.0, 0.0));

        let spurious = score_detections(&[5], &[]);
        assert_eq!((spurious.precision, spurious.recall, spurious.accuracy), (0.0, 0.0, 0.0));
    }

    #[test]
    fn summary_is_mean_over_processed_images() {
        let rec = |p: f64, r: f64, a: f64| EvaluationRecord {
            filename: String::new(),
            detected: Vec::new(),
            expected: Vec::new(),
            metrics: Metrics {
                precision: p,
                recall: r,
                accuracy: a,
            },
            detected_sum: 0,
            elapsed_ms: 0.0,
        };
        let s = summarize(&[rec(1.0, 0.5, 0.5), rec(0.0, 0.5, 0.25)], 3);
        assert_relative_eq!(s.metrics.precision, 0.5);
        assert_relative_eq!(s.metrics.recall, 0.5);
        assert_relative_eq!(s.metrics.accuracy, 0.375);
        assert_eq!((s.processed, s.skipped), (2, 3));

        let empty = summarize(&[], 2);
        assert_eq!(empty.metrics, Metrics::default());
        assert_eq!(empty.skipped, 2);
    }

    #[test]
    fn caption_lists_sorted_ids() {
        assert_eq!(global_caption(0, &[]), "Global result: 0");
        assert_eq!(global_caption(25, &[5, 20]), "Global result: 25 ( 5 20 )");
    }

    #[test]
    fn report_read_failures_name_the_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("orb_results.json");
        let err = EvaluationReport::load_json(&missing).expect_err("missing report");
        assert!(matches!(&err, EvaluationError::Read { path, .. } if *path == missing));
        assert!(err.to_string().starts_with("cannot read report"));

        let garbled = dir.path().join("garbled.json");
        fs::write(&garbled, "{").expect("write");
        assert!(matches!(
            EvaluationReport::load_json(&garbled),
            Err(EvaluationError::Json(_))
        ));
    }
}
