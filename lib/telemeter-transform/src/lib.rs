//! A composable pipeline of metric family transformers.
//!
//! Every transformer is `Transform(family) -> (keep, error)`: it may mutate
//! the family in place (dropping individual metrics, injecting or renaming
//! labels, rewriting timestamps) and signals whether the family as a whole
//! should survive. [`filter`] applies one transformer across a batch,
//! nullifying families the transformer rejects; errors abort the batch.

mod drop_empty;
mod elide;
mod error;
mod federate;
mod label;
mod pack_sort;
mod rename;
mod required_labels;
mod timestamps;
mod whitelist;

pub use drop_empty::DropEmptyFamilies;
pub use elide::Elide;
pub use error::TransformError;
pub use federate::{FederateSampleCheck, OnInvalidSample};
pub use label::{Label as LabelTransform, LabelRetriever};
pub use pack_sort::{DropUnsorted, ErrorOnUnsorted, PackMetrics, SortMetrics};
pub use rename::RenameMetrics;
pub use required_labels::RequiredLabels;
pub use timestamps::{DriftCounters, OverwriteTimestamps};
pub use whitelist::{Rule, Whitelist};

use metrics_model::MetricFamily;

/// A single stage of the transformer pipeline.
pub trait Transform: Send + Sync {
    /// Applies this transform to `family`, returning whether it should be
    /// kept. `family` may be mutated (metrics nullified, labels rewritten)
    /// regardless of the returned verdict.
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError>;
}

/// Applies `transform` to every live family in `families`, nullifying the
/// ones it rejects. Stops and propagates the first error, leaving families
/// processed so far mutated in place.
pub fn filter(
    families: &mut [Option<MetricFamily>],
    transform: &dyn Transform,
) -> Result<(), TransformError> {
    for slot in families.iter_mut() {
        if let Some(family) = slot {
            let keep = transform.apply(family)?;
            if !keep {
                *slot = None;
            }
        }
    }
    Ok(())
}

/// Removes nullified families, preserving order.
pub fn pack_families(families: Vec<Option<MetricFamily>>) -> Vec<MetricFamily> {
    families.into_iter().flatten().collect()
}

/// Runs the standard upload pipeline ordering: sample/shape validation and
/// sort-order checks first (so a malformed upload fails fast), then required
/// labels, then empties are dropped, then timestamps are stamped with the
/// ingest time.
pub fn run_upload_pipeline(
    families: &mut Vec<Option<MetricFamily>>,
    min_time_ms: i64,
    required_labels: &RequiredLabels,
    overwrite_timestamps: &OverwriteTimestamps<'_>,
) -> Result<(), TransformError> {
    let federate_check = FederateSampleCheck::new(min_time_ms, OnInvalidSample::Error);
    filter(families, &federate_check)?;

    let error_on_unsorted = ErrorOnUnsorted::new(true);
    filter(families, &error_on_unsorted)?;

    filter(families, required_labels)?;
    filter(families, &DropEmptyFamilies)?;
    filter(families, overwrite_timestamps)?;
    Ok(())
}
