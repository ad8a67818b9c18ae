/// Workflow file read when none is given on the command line.
pub const DEFAULT_WORKFLOW_FILE: &str = "Sakefile.yaml";

/// Directory (next to the workflow file) holding persisted build state.
pub const STATE_DIR_NAME: &str = ".sake";

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "SAKE_STATE_DIR";

/// File name of the persisted HashStore inside the state directory.
pub const HASHSTORE_FILENAME: &str = "hashstore.json";

/// Current on-disk HashStore layout version.
pub const HASHSTORE_VERSION: u32 = 1;
