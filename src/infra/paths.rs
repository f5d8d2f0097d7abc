// src/infra/paths.rs — Config location
//
// TALKSTREAM_HOME overrides everything. Otherwise config lives in
// ~/.talkstream/, falling back to the working directory when no home
// directory can be determined.

use std::path::PathBuf;

pub const CONFIG_FILE_NAME: &str = "api.json";

/// Returns the TALKSTREAM_HOME override, if set.
fn talkstream_home() -> Option<PathBuf> {
    std::env::var_os("TALKSTREAM_HOME").map(PathBuf::from)
}

/// Configuration directory: $TALKSTREAM_HOME/ or ~/.talkstream/
pub fn config_dir() -> PathBuf {
    if let Some(home) = talkstream_home() {
        return home;
    }
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(".talkstream"),
        None => PathBuf::from("."),
    }
}

/// Default config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}
