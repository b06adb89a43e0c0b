/// Default port the list server listens on
pub const DEFAULT_PORT: u16 = 8889;

/// Route paths, kept compatible with existing game-engine list server clients
/// Older clients poll the root path for the list
pub const PATH_ROOT: &str = "/";
pub const PATH_LIST: &str = "/list";
pub const PATH_ADD: &str = "/add";
pub const PATH_UPDATE: &str = "/update";
pub const PATH_REMOVE: &str = "/remove";

