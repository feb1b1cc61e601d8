pub mod file;
pub mod library;
pub mod mask;
pub mod model;

pub use file::{FileAccess, FileEntry, FileRule, PathFilter};
pub use mask::{MaskDialect, PermissionMask};
pub use model::{
    IngestedRule, LogOrigin, NetworkRule, ProfileHeader, Rule, RuleBody, RuleKind, Subprofile,
    sort_for_output,
};
