//! # Dash Engine
//!
//! Real-time state fusion and zero-copy frame presentation core for an
//! in-vehicle dashboard display.
//!
//! ## Features
//!
//! - **State Fusion**: one coherent scene merged from a dozen telemetry topics
//! - **Zero-Copy Video**: camera DMA-BUFs bound as GPU textures without copies
//! - **Overlay Geometry**: lane, path and lead polygons ready for the renderer
//! - **Status Machine**: prioritized display status with alert blinking
//! - **Persistent Parameters**: typed access to a shared file-backed store
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dash_engine::prelude::*;
//!
//! # fn collaborators() -> Collaborators { unimplemented!() }
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DashboardConfig::default();
//!     let mut dashboard = Dashboard::new(config, collaborators())?;
//!     for _ in 0..20 {
//!         dashboard.tick();
//!         let frame = dashboard.render_frame();
//!         println!("{:?} texture={:?}", frame.status, frame.texture);
//!     }
//!     dashboard.shutdown();
//!     Ok(())
//! }
//! ```

// Configuration and shared types
pub mod config;
pub mod core;
pub mod foundation;

// Fusion pipeline
pub mod messaging;
pub mod params;
pub mod scene;
pub mod status;
pub mod sync;

// Presentation
pub mod render;
pub mod vision;

mod engine;

pub use engine::{
    run, Collaborators, Dashboard, EngineError, RunState, PARAM_BRIGHTNESS_B, PARAM_BRIGHTNESS_M,
    PARAM_DRIVER_VIEW, PARAM_IS_METRIC, PARAM_LAST_ATHENA_PING,
};

/// Common imports for embedders
pub mod prelude {
    pub use crate::{
        core::{Config, DashboardConfig},
        foundation::time::{Clock, SystemClock},
        messaging::{BusPublisher, LocalBus, MessageBus, MessageSink, Topic},
        params::{FileParamStore, MemoryParamStore, ParamStore},
        render::{HeadlessImporter, ImageImporter, RenderFrame, SceneRenderer, TextureRef},
        scene::Scene,
        status::UiStatus,
        vision::{CameraStream, Viewport},
        Collaborators, Dashboard, EngineError,
    };
}
