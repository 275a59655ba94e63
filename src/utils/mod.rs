pub mod constants;
pub mod filename;
pub mod layout;
pub mod progress;

pub use constants::*;
pub use filename::sanitize;
pub use layout::LakeLayout;
pub use progress::ProgressReporter;
