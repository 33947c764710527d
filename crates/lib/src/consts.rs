pub const APP_NAME: &str = "wdeploy";

/// Configuration file name looked up in the working directory.
pub const CONFIG_FILENAME: &str = "wdeploy.toml";

/// Environment variable naming a configuration file or its directory.
pub const CONFIG_ENV: &str = "WDEPLOY_CONFIG";

/// Per-project state directory, relative to the source root.
pub const DATA_DIR: &str = ".deploy";

pub const LOCK_FILENAME: &str = "lock";
