//! Traversal of leaf datasets in single and paired composite collections

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{Block, DataObject, Dataset, MultiBlock};
use crate::{Error, Result};

/// What a leaf callback wants the traversal to do next.
///
/// Carries the integer convention of analysis callbacks: zero continues, a
/// positive code stops cleanly, a negative code stops with an error. The code
/// is the only state, so an outcome can never disagree with its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Visit(i32);

impl Visit {
    pub const CONTINUE: Visit = Visit(0);
    /// Clean stop with code 1.
    pub const STOP: Visit = Visit(1);
    /// Error stop with code -1.
    pub const ABORT: Visit = Visit(-1);

    pub fn from_code(code: i32) -> Self {
        Visit(code)
    }

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_continue(self) -> bool {
        self.0 == 0
    }

    pub fn is_stop(self) -> bool {
        self.0 > 0
    }

    pub fn is_error(self) -> bool {
        self.0 < 0
    }
}

impl From<i32> for Visit {
    fn from(code: i32) -> Self {
        Visit::from_code(code)
    }
}

fn finish(block: usize, visit: Visit) -> Visit {
    let code = visit.code();
    match code.cmp(&0) {
        Ordering::Equal => {}
        Ordering::Greater => debug!(block, code, "traversal stopped by callback"),
        Ordering::Less => warn!(block, code, "traversal aborted by callback"),
    }
    visit
}

/// Call `func` on every leaf of `object` in ascending flat block index.
///
/// A single dataset is visited once as block 0. Empty slots are skipped but
/// still consume their index. The first nonzero outcome ends the
/// traversal and is returned; leaves already visited are not revisited.
pub fn apply<F>(object: &DataObject, mut func: F) -> Visit
where
    F: FnMut(usize, &Dataset) -> Visit,
{
    match object {
        DataObject::Dataset(ds) => finish(0, func(0, ds)),
        DataObject::MultiBlock(mb) => apply_composite(mb, func),
    }
}

/// [`apply`] over a composite collection.
pub fn apply_composite<F>(collection: &MultiBlock, mut func: F) -> Visit
where
    F: FnMut(usize, &Dataset) -> Visit,
{
    let mut next = 0;
    walk(collection, &mut next, &mut func)
}

fn walk<F>(collection: &MultiBlock, next: &mut usize, func: &mut F) -> Visit
where
    F: FnMut(usize, &Dataset) -> Visit,
{
    for child in collection.children() {
        let block = *next;
        let visit = match child {
            None => {
                *next += 1;
                continue;
            }
            Some(Block::Leaf(ds)) => {
                *next += 1;
                finish(block, func(block, ds))
            }
            Some(Block::Nested(inner)) => walk(inner, next, func),
        };
        if !visit.is_continue() {
            return visit;
        }
    }
    Visit::CONTINUE
}

/// Call `func` on each pair of corresponding leaves of `input` and `output`.
///
/// The two objects must be congruent: same nesting, same child counts, and an
/// output leaf wherever the input has one. Output leaves shared with other
/// owners are copied before being handed out mutably.
pub fn apply_pair<F>(input: &DataObject, output: &mut DataObject, mut func: F) -> Result<Visit>
where
    F: FnMut(usize, &Dataset, &mut Dataset) -> Visit,
{
    match (input, output) {
        (DataObject::Dataset(src), DataObject::Dataset(dst)) => {
            Ok(finish(0, func(0, src, Arc::make_mut(dst))))
        }
        (DataObject::MultiBlock(src), DataObject::MultiBlock(dst)) => {
            if src.amr_layout() != dst.amr_layout() {
                return Err(Error::StructureMismatch {
                    block: 0,
                    reason: "input and output AMR layouts differ".to_string(),
                });
            }
            let mut next = 0;
            walk_pair(src, dst, &mut next, &mut func)
        }
        (src, dst) => Err(Error::StructureMismatch {
            block: 0,
            reason: format!("input is {}, output is {}", src.kind(), dst.kind()),
        }),
    }
}

fn walk_pair<F>(input: &MultiBlock, output: &mut MultiBlock, next: &mut usize, func: &mut F) -> Result<Visit>
where
    F: FnMut(usize, &Dataset, &mut Dataset) -> Visit,
{
    if input.num_children() != output.num_children() {
        return Err(Error::StructureMismatch {
            block: *next,
            reason: format!(
                "input has {} children, output has {}",
                input.num_children(),
                output.num_children()
            ),
        });
    }

    for (src, dst) in input.children().iter().zip(output.children_mut()) {
        let block = *next;
        let visit = match (src, dst) {
            (None, None) | (None, Some(Block::Leaf(_))) => {
                *next += 1;
                continue;
            }
            (Some(Block::Leaf(src)), Some(Block::Leaf(dst))) => {
                *next += 1;
                finish(block, func(block, src, Arc::make_mut(dst)))
            }
            (Some(Block::Leaf(_)), None) => {
                return Err(Error::StructureMismatch {
                    block,
                    reason: "output block is missing".to_string(),
                })
            }
            (Some(Block::Nested(src)), Some(Block::Nested(dst))) => walk_pair(src, dst, next, func)?,
            _ => {
                return Err(Error::StructureMismatch {
                    block,
                    reason: "input and output nest differently".to_string(),
                })
            }
        };
        if !visit.is_continue() {
            return Ok(visit);
        }
    }
    Ok(Visit::CONTINUE)
}
