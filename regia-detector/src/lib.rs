pub mod categorize;
pub mod detector;
pub mod diff;
pub mod normalize;
pub mod semantic;

pub use categorize::*;
pub use detector::*;
pub use diff::*;
pub use normalize::*;
pub use semantic::*;
