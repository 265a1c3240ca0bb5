//! Selection and weight composition across the dataset and region levels.

use std::borrow::Cow;

use ssrl_ntuple::{Chunk, Evaluate, Mask, Value};

use crate::dataset::{WeightSpec, WeightTerm};
use crate::error::Result;

/// Join the non-empty selections with a logical AND.
///
/// Returns `None` when neither level selects anything.
pub fn compose_selection(dataset: Option<&str>, region: Option<&str>) -> Option<String> {
    let parts: Vec<&str> =
        [dataset, region].into_iter().flatten().map(str::trim).filter(|s| !s.is_empty()).collect();
    match parts.as_slice() {
        [] => None,
        [only] => Some((*only).to_string()),
        _ => Some(parts.iter().map(|p| format!("({p})")).collect::<Vec<_>>().join("&&")),
    }
}

fn non_empty(sel: Option<&str>) -> Option<&str> {
    sel.map(str::trim).filter(|s| !s.is_empty())
}

/// Evaluate a selection expression as a mask over `chunk`.
pub fn evaluate_mask(chunk: &Chunk, selection: &str, evaluator: &mut dyn Evaluate) -> Result<Mask> {
    Ok(evaluator.evaluate(selection, chunk)?.to_mask(chunk.n_events()))
}

/// Mask of one region in the current chunk; `None` means every event passes.
///
/// `dataset_mask` is the mask of `dataset_selection`, computed once per chunk.
/// It is reused as-is when the region adds no selection of its own.
pub fn compose_mask<'m>(
    chunk: &Chunk,
    dataset_selection: Option<&str>,
    region_selection: Option<&str>,
    dataset_mask: Option<&'m Mask>,
    evaluator: &mut dyn Evaluate,
) -> Result<Option<Cow<'m, Mask>>> {
    let dataset_selection = non_empty(dataset_selection);
    if non_empty(region_selection).is_none()
        && let Some(mask) = dataset_mask
    {
        return Ok(Some(Cow::Borrowed(mask)));
    }
    match compose_selection(dataset_selection, region_selection) {
        Some(sel) => Ok(Some(Cow::Owned(evaluate_mask(chunk, &sel, evaluator)?))),
        None => Ok(None),
    }
}

/// Weight of one region in the current chunk; `None` means unit weights.
///
/// Without a dataset or region weight only `default_weight` applies.
/// Otherwise the dataset weight and then the region weight are multiplied in,
/// and `default_weight` joins them only when `enforce_default` is set.
pub fn compose_weight(
    chunk: &Chunk,
    dataset: Option<&WeightSpec>,
    region: Option<&WeightSpec>,
    default_weight: Option<&str>,
    enforce_default: bool,
    evaluator: &mut dyn Evaluate,
) -> Result<Option<Value>> {
    let default_weight = non_empty(default_weight);
    if dataset.is_none() && region.is_none() {
        return match default_weight {
            Some(d) => Ok(Some(evaluator.evaluate(d, chunk)?)),
            None => Ok(None),
        };
    }
    let mut weight = None;
    for spec in [dataset, region].into_iter().flatten() {
        weight = multiply(weight, resolve_weight(chunk, spec, evaluator)?)?;
    }
    if enforce_default && let Some(d) = default_weight {
        weight = multiply(weight, Some(evaluator.evaluate(d, chunk)?))?;
    }
    Ok(weight)
}

/// Value of one weight spec. Literals never reach the evaluator, and list
/// names that are chunk columns are read directly.
pub fn resolve_weight(
    chunk: &Chunk,
    spec: &WeightSpec,
    evaluator: &mut dyn Evaluate,
) -> Result<Option<Value>> {
    match spec {
        WeightSpec::Literal(v) => Ok(Some(Value::Scalar(*v))),
        WeightSpec::Expression(e) => Ok(Some(evaluator.evaluate(e, chunk)?)),
        WeightSpec::Product(terms) => {
            let mut acc = None;
            for term in terms {
                let v = match term {
                    WeightTerm::Literal(v) => Value::Scalar(*v),
                    WeightTerm::Name(n) => match chunk.get(n) {
                        Some(col) => Value::Column(col.clone()),
                        None => evaluator.evaluate(n, chunk)?,
                    },
                };
                acc = multiply(acc, Some(v))?;
            }
            Ok(acc)
        }
    }
}

fn multiply(acc: Option<Value>, factor: Option<Value>) -> Result<Option<Value>> {
    Ok(match (acc, factor) {
        (Some(a), Some(f)) => Some(a.mul(&f)?),
        (a, f) => a.or(f),
    })
}
