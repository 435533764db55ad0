//! Pass-through stage.

use crate::element::{ElementContext, ElementOps};
use crate::error::Result;

/// Moves bytes from input to output unchanged and propagates format changes.
///
/// The trait's default step is exactly this; the named type exists so a
/// plain relay stage can be put in a chain.
#[derive(Debug, Default)]
pub struct Passthrough;

impl ElementOps for Passthrough {
    fn process(&mut self, ctx: &mut ElementContext) -> Result<usize> {
        ctx.passthrough_step()
    }
}
