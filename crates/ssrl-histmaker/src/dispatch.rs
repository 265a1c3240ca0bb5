//! Per-chunk dispatch of masked, weighted data to a region's aggregators.

use std::borrow::Cow;

use ssrl_ntuple::{Chunk, Column, Evaluate, Mask, Value, any_nonzero};

use crate::aggregator::{Aggregator, AggregatorKind, FillInput, FillWeight, Observable};
use crate::compose::evaluate_mask;
use crate::error::{Error, Result};
use crate::termination::EarlyTermination;

/// Whether a region ran to the end of its aggregator list for a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Every aggregator was offered the chunk.
    Completed,
    /// A graph observable hit an out-of-range subscript; the rest of the
    /// region was skipped for this chunk.
    RegionSkipped,
}

/// Feed one chunk to every aggregator of a region.
///
/// `mask` and `weight` come from the selection/weight composer. Each graph
/// that reports its limit reached bumps `termination`.
pub fn dispatch(
    chunk: &Chunk,
    mask: Option<&Mask>,
    weight: Option<&Value>,
    aggregators: &mut [Aggregator],
    evaluator: &mut dyn Evaluate,
    termination: &mut EarlyTermination,
) -> Result<Dispatch> {
    for agg in aggregators.iter_mut() {
        match agg.kind() {
            AggregatorKind::Histogram => fill_histogram(chunk, agg, mask, weight, evaluator)?,
            AggregatorKind::SelectiveHistogram => {
                let own = match agg.selection() {
                    Some(sel) => evaluate_mask(chunk, sel, evaluator)?,
                    None => return Err(mismatch(agg)),
                };
                let combined = match mask {
                    Some(m) => m.and(&own)?,
                    None => own,
                };
                fill_histogram(chunk, agg, Some(&combined), weight, evaluator)?;
            }
            AggregatorKind::Histogram2D => {
                let (xe, ye) = pair(agg)?;
                let x = evaluate(chunk, xe, evaluator)?;
                let y = evaluate(chunk, ye, evaluator)?;
                let xs = masked(&x, mask)?.flatten();
                let ys = masked(&y, mask)?.flatten();
                if !(any_nonzero(&xs) && any_nonzero(&ys)) {
                    continue;
                }
                let w = fill_weight(weight, &x, mask)?;
                agg.update(FillInput::Points(&xs, &ys), w.as_ref())?;
            }
            AggregatorKind::Graph | AggregatorKind::AvgGraph => {
                let (xe, ye) = pair(agg)?;
                let recover = agg.kind().is_graph();
                let (Some(x), Some(y)) = (
                    evaluate_optional(chunk, xe, recover, evaluator)?,
                    evaluate_optional(chunk, ye, recover, evaluator)?,
                ) else {
                    tracing::debug!(
                        aggregator = agg.name(),
                        "index error in graph observable, skipping region"
                    );
                    return Ok(Dispatch::RegionSkipped);
                };
                let (x, y) = match mask {
                    Some(m) => {
                        let keep = m.any_per_event();
                        (x.select_events(&keep)?, y.select_events(&keep)?)
                    }
                    None => (x, y),
                };
                if any_nonzero(&x.flatten()) && any_nonzero(&y.flatten()) {
                    agg.update(FillInput::Events(&x, &y), None)?;
                }
                if agg.reached_limit() {
                    termination.increment();
                }
            }
        }
    }
    Ok(Dispatch::Completed)
}

fn fill_histogram(
    chunk: &Chunk,
    agg: &mut Aggregator,
    mask: Option<&Mask>,
    weight: Option<&Value>,
    evaluator: &mut dyn Evaluate,
) -> Result<()> {
    let Observable::Single(expr) = agg.observable() else {
        return Err(mismatch(agg));
    };
    let data = evaluate(chunk, expr, evaluator)?;
    let values = masked(&data, mask)?.flatten();
    if !any_nonzero(&values) {
        return Ok(());
    }
    let w = fill_weight(weight, &data, mask)?;
    agg.update(FillInput::Values(&values), w.as_ref())
}

fn pair(agg: &Aggregator) -> Result<(&str, &str)> {
    match agg.observable() {
        Observable::Pair(x, y) => Ok((x, y)),
        Observable::Single(_) => Err(mismatch(agg)),
    }
}

fn mismatch(agg: &Aggregator) -> Error {
    Error::Validation(format!(
        "aggregator '{}' ({:?}) does not declare the expected observables",
        agg.name(),
        agg.kind()
    ))
}

fn evaluate(chunk: &Chunk, expr: &str, evaluator: &mut dyn Evaluate) -> Result<Column> {
    Ok(evaluator.evaluate(expr, chunk)?.into_column(chunk.n_events()))
}

/// Like [`evaluate`], with out-of-range subscripts mapped to `None` when
/// `recover_index` is set.
fn evaluate_optional(
    chunk: &Chunk,
    expr: &str,
    recover_index: bool,
    evaluator: &mut dyn Evaluate,
) -> Result<Option<Column>> {
    match evaluator.evaluate(expr, chunk) {
        Ok(v) => Ok(Some(v.into_column(chunk.n_events()))),
        Err(e) if recover_index && e.is_index_error() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Apply `mask` to `data`. Per-element masks gate per-event data through
/// their "any element passes" reduction.
pub fn masked<'c>(data: &'c Column, mask: Option<&Mask>) -> Result<Cow<'c, Column>> {
    let Some(mask) = mask else {
        return Ok(Cow::Borrowed(data));
    };
    let out = match (data, mask) {
        (Column::Flat(_), Mask::Ragged(_)) => data.select_events(&mask.any_per_event())?,
        _ => data.select(mask)?,
    };
    Ok(Cow::Owned(out))
}

/// Align a composed weight with the values filled from `data`.
pub fn fill_weight(
    weight: Option<&Value>,
    data: &Column,
    mask: Option<&Mask>,
) -> Result<Option<FillWeight>> {
    Ok(match weight {
        None => None,
        Some(Value::Scalar(w)) => Some(FillWeight::Constant(*w)),
        Some(Value::Column(w)) => {
            let aligned = w.broadcast_like(data)?;
            Some(FillWeight::PerEntry(masked(&aligned, mask)?.into_owned().into_flat()))
        }
    })
}
