//! Stage-keyed cleanup dispatcher
//!
//! | Stage reached           | Released                                          |
//! |-------------------------|---------------------------------------------------|
//! | marshal-in failed at i  | in tokens and caller-allocated storage of `[0, i)` |
//! | native call failed      | every in token and caller-allocated storage        |
//! | marshal-out failed at j | binding temporaries, plus native outputs after j   |
//! | done                    | binding temporaries only                           |
//!
//! Tokens are taken out of their slots as they are handled, so no slot is
//! released twice whatever order the stages run in.

use tracing::debug;

use super::call::{InvocationState, Output};
use crate::marshal::{release_native, CleanupData, Owned};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CombineArgs,
    AllocStorage,
    /// Failed while marshaling the argument at this native index
    MarshalIn(usize),
    NativeCall,
    /// Failed while marshaling the output at this position
    MarshalOut(usize),
    Done,
}

/// Per-argument tokens owned by one invocation
#[derive(Debug, Default)]
pub struct Tokens {
    pub(super) in_tokens: Vec<Option<CleanupData>>,
    /// Caller-allocated out storage, released only if the call never completed
    pub(super) out_storage: Vec<Option<Owned>>,
}

impl Tokens {
    fn abort_range(&mut self, end: usize) {
        for slot in self.in_tokens.iter_mut().take(end) {
            if let Some(cleanup) = slot.take() {
                cleanup.abort();
            }
        }
        for slot in self.out_storage.iter_mut().take(end) {
            if let Some(owned) = slot.take() {
                owned.release();
            }
        }
    }

    /// The callee completed: free temporaries, hand transferred values over
    fn finish(&mut self) {
        for slot in self.in_tokens.iter_mut() {
            if let Some(cleanup) = slot.take() {
                cleanup.finish();
            }
        }
        // Caller-allocated storage now belongs to its output
        for slot in self.out_storage.iter_mut() {
            slot.take();
        }
    }
}

/// Run the cleanup obligations of `stage`. Never fails.
pub(super) fn cleanup(state: &mut InvocationState<'_>, stage: Stage) {
    debug!(event = "cleanup", callable = %state.cache.name, stage = ?stage);
    match stage {
        Stage::CombineArgs | Stage::AllocStorage => {}
        Stage::MarshalIn(index) => state.tokens.abort_range(index),
        Stage::NativeCall => {
            let all = state.tokens.in_tokens.len();
            state.tokens.abort_range(all);
        }
        Stage::MarshalOut(failed) => {
            state.tokens.finish();
            let cache = state.cache;
            let outputs = state.outputs();
            for output in outputs.into_iter().skip(failed + 1) {
                let (arg, value) = match output {
                    Output::Return => (&cache.return_cache, std::mem::take(&mut state.ret)),
                    Output::Arg(index) => (&cache.args[index], std::mem::take(&mut state.native_args[index])),
                };
                debug!(event = "release_unmarshaled_output", callable = %cache.name, arg = %arg.name);
                release_native(arg, &value);
            }
        }
        Stage::Done => state.tokens.finish(),
    }
}
