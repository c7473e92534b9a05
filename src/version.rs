/// Build-time override via `SITEWATCH_VERSION`, falling back to the crate version.
pub const VERSION: &str = match option_env!("SITEWATCH_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
