pub mod duration;
pub mod types;
pub mod window;

pub use duration::{DurationError, PromDuration};
pub use types::{Rule, RuleKind, Target};
pub use window::{LadderError, Window, WindowLadder};
