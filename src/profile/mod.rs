pub mod diff;
pub mod generate;
pub mod merge;
pub mod model;

pub use diff::{DiffOutcome, DiffRecord, GenerationDiff, ProfileDiff, diff_generation, diff_rules};
pub use generate::{GeneratedProfile, Generator, generation_order, local_stamp};
pub use merge::merge_profile_rules;
pub use model::{ProcessProfile, profile_filename};
