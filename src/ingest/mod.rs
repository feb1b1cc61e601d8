pub mod log;
pub mod profile;

pub use log::{LogIngest, LogRecord, NETWORK_COMMENT_PREFIX, normalize_profile_name};
pub use profile::{ParsedProfile, ProfileParser, ProfileSet, parse_profile_text};
