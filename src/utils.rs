//! small helpers shared by the binary and the tests.

/// initialize the logger from the environment. safe to call more than once.
pub fn init_log() {
    let _ = env_logger::Builder::from_default_env().try_init();
}
