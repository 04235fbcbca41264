//! Ambient configuration the CLI (or any other caller) loads from flags or
//! a config file and passes in as a single struct, rather than threading
//! scalar parameters through every call.

use crate::memory::sparse::GarbageHandling;
use serde::{Deserialize, Serialize};

/// Runtime (loader + interpreter) configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub garbage_handling: GarbageHandling,
    pub show_trace: bool,
}

impl Default for RunConfig {
    fn default() -> RunConfig {
        RunConfig {
            garbage_handling: GarbageHandling::default(),
            show_trace: false,
        }
    }
}
