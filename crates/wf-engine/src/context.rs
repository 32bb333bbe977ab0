//! Engine context
//!
//! Everything the engine needs from its host process, passed in at
//! construction. There are no ambient statics: tests run independent engines
//! with mock backends side by side.

use crate::config::EngineConfig;
use crate::resolve::{FsResolver, PathResolver};
use std::sync::Arc;
use wf_backend::{AudioBackend, SoftwareBackend};

pub struct EngineContext {
    pub backend: Arc<dyn AudioBackend>,
    pub resolver: Box<dyn PathResolver>,
    pub config: EngineConfig,
}

impl EngineContext {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        resolver: Box<dyn PathResolver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            resolver,
            config,
        }
    }

    /// Production wiring: software backend with device output, filesystem
    /// path resolution, default latency settings.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(SoftwareBackend::new()),
            Box::new(FsResolver),
            EngineConfig::default(),
        )
    }
}
