//! Dashboard demo application
//!
//! Drives the fusion core with a simulated camera and a scripted telemetry
//! feed, and logs what a renderer would paint.
//!
//! ```text
//! dash_app [-c <file.toml|file.ron>] [-t <n>] [--gpu]
//! ```

mod simulation;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use dash_engine::foundation::logging;
use dash_engine::messaging::{decode, Topic, UiLayoutState};
use dash_engine::prelude::*;

use simulation::SimulatedCamera;

/// Command line options
#[derive(Parser, Debug)]
#[command(name = "dash_app")]
#[command(about = "Run the dashboard core against a simulated car", long_about = None)]
struct Args {
    /// Configuration file (.toml or .ron)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of ticks to run before exiting
    #[arg(short, long, default_value_t = 600)]
    ticks: u64,

    /// Import camera frames through Vulkan instead of the headless importer
    #[arg(long)]
    gpu: bool,
}

/// Logs a summary of every `every`-th frame instead of painting it
struct LoggingRenderer {
    every: u64,
}

impl SceneRenderer for LoggingRenderer {
    fn render(&mut self, frame: &RenderFrame<'_>) -> Result<(), Box<dyn std::error::Error>> {
        if frame.frame % self.every != 0 {
            return Ok(());
        }

        let geometry = frame.geometry;
        let lead = frame.scene.leads[0].d_rel();
        log::info!(
            "tick {:>5} {:?} {:?} texture={:?} brightness={} road={} path={} track={} lead={:?}",
            frame.frame,
            frame.viewport,
            frame.status,
            frame.texture,
            frame.brightness,
            geometry.road.len(),
            geometry.path.len(),
            geometry.track.len(),
            lead
        );
        if frame.alert_visible && frame.scene.alert.is_active() {
            log::info!("alert: {} / {}", frame.scene.alert.text1, frame.scene.alert.text2);
        }
        Ok(())
    }
}

#[cfg(all(feature = "vulkan", target_os = "linux"))]
fn create_importer(gpu: bool) -> Result<Box<dyn ImageImporter>, EngineError> {
    use dash_engine::render::vulkan::{GpuContext, VulkanImageImporter};

    if gpu {
        let context = Arc::new(GpuContext::new("dash_app")?);
        log::info!("Importing camera frames through Vulkan");
        return Ok(Box::new(VulkanImageImporter::rgb(context)));
    }
    Ok(Box::new(HeadlessImporter::new()))
}

#[cfg(not(all(feature = "vulkan", target_os = "linux")))]
fn create_importer(gpu: bool) -> Result<Box<dyn ImageImporter>, EngineError> {
    if gpu {
        return Err(EngineError::Gpu("built without Vulkan support".to_string()));
    }
    Ok(Box::new(HeadlessImporter::new()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DashboardConfig::load_from_file(path)?,
        None => DashboardConfig::default().with_params_root(std::env::temp_dir().join("dash_app_params")),
    };
    logging::init(&config.log_level);
    log::info!("Starting dashboard demo for {} ticks", args.ticks);

    let stop = Arc::new(AtomicBool::new(false));
    let (bus, publisher) = LocalBus::new();
    let telemetry = simulation::spawn_telemetry(publisher, config.timing.tick_period(), Arc::clone(&stop))?;
    // what the dashboard announces goes to its own bus so it never reads it back
    let (mut announced, outbox) = LocalBus::new();

    let camera = SimulatedCamera::new(
        &std::env::temp_dir().join("dash_app_frames"),
        config.camera.slot_count,
        config.camera.frame_width,
        config.camera.frame_height,
        config.timing.tick_period(),
    )?;
    let params = FileParamStore::open(&config.params.root)?;
    log::info!("Parameters stored under {}", params.root().display());

    let mut dashboard = Dashboard::new(
        config,
        Collaborators {
            camera: Box::new(camera),
            importer: create_importer(args.gpu)?,
            bus: Box::new(bus),
            outbox: Box::new(outbox),
            params: Box::new(params),
            clock: Box::new(SystemClock),
        },
    )?;

    let mut renderer = LoggingRenderer { every: 20 };
    let ticks = args.ticks;
    dash_engine::run(&mut dashboard, &mut renderer, |d| d.run_state().frame < ticks);

    stop.store(true, Ordering::Relaxed);
    if telemetry.join().is_err() {
        log::error!("Telemetry thread panicked");
    }

    let mut layouts = 0;
    let mut last_layout = None;
    while let Some(payload) = announced.try_receive(Topic::UiLayoutState) {
        layouts += 1;
        match decode::<UiLayoutState>(&payload) {
            Ok(layout) => last_layout = Some(layout),
            Err(err) => log::warn!("{}", err),
        }
    }
    log::info!("Announced layout {} times, last {:?}", layouts, last_layout);

    for topic in Topic::ALL {
        let failures = dashboard.synchronizer().decode_failures(topic);
        if failures > 0 {
            log::warn!("{}: {} malformed messages", topic, failures);
        }
    }
    log::info!(
        "Finished: {} late ticks, {} bind failures",
        dashboard.late_ticks(),
        dashboard.vision().bind_failures()
    );
    Ok(())
}
