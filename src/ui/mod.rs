pub mod icons;
pub mod progress;

pub use progress::{StationUI, summary_lines};
