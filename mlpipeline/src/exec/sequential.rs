//! Sequential execution: one stage at a time, in declaration order.

use super::{run_stage, RunState};
use crate::errors::PipelineError;

/// Runs stages in declaration order. A stage failure (after retries)
/// aborts the run; later stages are never attempted and stay `pending`.
pub(crate) async fn run(state: &RunState) -> Result<(), PipelineError> {
    for idx in 0..state.len() {
        run_stage(state, idx).await?;
    }
    Ok(())
}
