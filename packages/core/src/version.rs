//! Version information for dockhand

/// Get the current version string
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Get the long version string with build information
///
/// Build metadata is injected by CI through `DOCKHAND_GIT_HASH` and
/// `DOCKHAND_BUILD_DATE`; both fall back to "unknown".
pub fn get_version_long() -> String {
    let version = get_version();
    let git_hash = option_env!("DOCKHAND_GIT_HASH").unwrap_or("unknown");
    let build_date = option_env!("DOCKHAND_BUILD_DATE").unwrap_or("unknown");

    format!("{version} (git: {git_hash}, built: {build_date})")
}
