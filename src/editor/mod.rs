//! Modal input handlers that take over the keyboard until they finish.

pub mod column;
pub mod line;

pub use column::{ColumnEditor, ColumnOutcome};
pub use line::{LineCommand, LineEditor, LineOutcome, Submission};
