//! Exit codes for the `muster` binary.

pub const SUCCESS: i32 = 0;
pub const NOT_CLOUD_MANAGED: i32 = 1; // probe: metadata does not describe a managed instance
pub const INTERNAL_ERROR: i32 = 2; // Config, identity store or runtime failure
