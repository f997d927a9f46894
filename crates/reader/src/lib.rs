//! Tail-first log reading primitives.
//!
//! [`BackwardLineReader`] reconstructs whole lines from the end of a file
//! without loading it into memory; [`FilterStage`] applies keyword and
//! line-count constraints over any [`LineSource`] and signals the producer
//! to stop as soon as the cap is reached.

pub mod backward;
pub mod error;
pub mod filter;
pub mod source;

pub use backward::{BackwardLineReader, DEFAULT_BUFFER_SIZE};
pub use error::{ReaderError, Result};
pub use filter::{CancelFn, FilterStage, LineFilter, Verdict};
pub use source::{ForwardLines, LineSource};
