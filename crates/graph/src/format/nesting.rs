//! Nesting budget for the decoders
//!
//! Both decoders are recursive, so hostile input could nest deep enough to
//! overflow the stack before the rebuilder's depth guard ever runs. They
//! thread a `Nesting` budget through their `DeserializeSeed`s instead and
//! stop with `DepthExceeded` once it runs out.
//!
//! One graph level spans at most four levels of raw nesting (an object node,
//! its attrs mapping node, the entries list, one entry pair), and a JSON
//! marker adds up to two more at a leaf. The budget allows for that, so
//! anything the walker can emit within `max_depth` decodes.

use crate::error::{GraphError, Result};
use serde::de;
use std::cell::Cell;

const RAW_LEVELS_PER_NODE: usize = 4;
const LEAF_SLACK: usize = 4;

/// Raw nesting allowed for a graph depth limit
pub fn nesting_limit(max_depth: usize) -> usize {
    max_depth
        .saturating_mul(RAW_LEVELS_PER_NODE)
        .saturating_add(LEAF_SLACK)
}

/// Remaining nesting for one decode
///
/// `tripped` is shared by every level so the caller can tell a spent budget
/// apart from any other decode error once serde has wrapped it.
#[derive(Clone, Copy)]
pub struct Nesting<'a> {
    remaining: usize,
    tripped: &'a Cell<bool>,
}

impl<'a> Nesting<'a> {
    /// Budget for one container level down
    pub fn descend<E: de::Error>(self) -> std::result::Result<Nesting<'a>, E> {
        match self.remaining.checked_sub(1) {
            Some(remaining) => Ok(Nesting { remaining, ..self }),
            None => {
                self.tripped.set(true);
                Err(E::custom("nesting limit reached"))
            }
        }
    }
}

/// Run `decode` under the budget for `max_depth`
///
/// A decode that spent the budget reports `DepthExceeded` whatever error
/// the format wrapped around it.
pub fn bounded<T>(
    max_depth: usize,
    decode: impl FnOnce(Nesting<'_>) -> Result<T>,
) -> Result<T> {
    let tripped = Cell::new(false);
    let nesting = Nesting {
        remaining: nesting_limit(max_depth),
        tripped: &tripped,
    };
    let result = decode(nesting);
    if tripped.get() {
        return Err(GraphError::DepthExceeded { limit: max_depth });
    }
    result
}
