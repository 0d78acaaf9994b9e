//! Update loop
//!
//! [`Dashboard`] owns the scene, the vision frame ring, the geometry buffers
//! and the status machine, and advances all of them in [`Dashboard::tick`].
//! Nothing inside a tick blocks or fails: missing frames and messages are the
//! normal steady state and every error is logged and reflected in the scene.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::ConfigError;
use crate::core::DashboardConfig;
use crate::foundation::math::Vec3;
use crate::foundation::time::{Clock, TickTimer};
use crate::messaging::{send_message, MessageBus, MessageSink, Topic, UiLayoutState};
use crate::params::{read_param, write_param, ParamError, ParamStore};
use crate::render::{
    GeometryBuffers, ImageImporter, RenderFrame, SceneRenderer, TextureRef, ViewportGeometry,
};
use crate::scene::{
    apply_touch, classify_touch, viz_rect, ActiveApp, Alert, AlertSize, AlertStatus, HwType, LeadTrack,
    NetStatus, Scene, TouchAction,
};
use crate::status::{StatusInputs, StatusMachine, UiStatus};
use crate::sync::{SessionSignals, StateSynchronizer, UpdatedGroups};
use crate::vision::{CameraStream, StreamDescriptor, Viewport, VisionError, VisionFrameManager};

/// Units flag, `"1"` for metric
pub const PARAM_IS_METRIC: &str = "IsMetric";
/// Last remote-link ping, nanoseconds since the Unix epoch
pub const PARAM_LAST_ATHENA_PING: &str = "LastAthenaPingTime";
/// Brightness calibration offset
pub const PARAM_BRIGHTNESS_B: &str = "BRIGHTNESS_B";
/// Brightness calibration slope
pub const PARAM_BRIGHTNESS_M: &str = "BRIGHTNESS_M";
/// Driver camera preview toggle
pub const PARAM_DRIVER_VIEW: &str = "IsDriverViewEnabled";

const DEFAULT_BRIGHTNESS_B: f32 = 5.0;
const DEFAULT_BRIGHTNESS_M: f32 = 1.3;
const MAX_CLIPPED_BRIGHTNESS: f32 = 512.0;
const MAX_BRIGHTNESS: f32 = 255.0;
const BRIGHTNESS_SMOOTHING: f32 = 0.01;

/// Errors surfaced before the loop starts
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Configuration is unusable
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// No GPU context could be created
    #[error("GPU initialization failed: {0}")]
    Gpu(String),
}

#[cfg(all(feature = "vulkan", target_os = "linux"))]
impl From<crate::render::vulkan::GpuError> for EngineError {
    fn from(err: crate::render::vulkan::GpuError) -> Self {
        EngineError::Gpu(err.to_string())
    }
}

/// External collaborators the dashboard is wired to
pub struct Collaborators {
    /// Camera subsystem
    pub camera: Box<dyn CameraStream>,
    /// Zero-copy image importer
    pub importer: Box<dyn ImageImporter>,
    /// Message bus subscriber
    pub bus: Box<dyn MessageBus>,
    /// Where the dashboard announces its own layout
    pub outbox: Box<dyn MessageSink>,
    /// Persistent parameters
    pub params: Box<dyn ParamStore>,
    /// Wall clock
    pub clock: Box<dyn Clock>,
}

/// Session and device state of the running dashboard
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Telemetry-driven session signals
    pub signals: SessionSignals,
    /// A drive session is active
    pub onroad: bool,
    /// Display is on
    pub awake: bool,
    /// Logical ticks since start
    pub frame: u64,
    /// Tick the current session started
    pub started_frame: u64,
    /// Last remote-link ping read from the store
    pub last_athena_ping: Option<u64>,
    /// Metric units
    pub is_metric: bool,
    /// Brightness calibration offset
    pub brightness_b: f32,
    /// Brightness calibration slope
    pub brightness_m: f32,
    /// Smoothed backlight level
    pub smooth_brightness: f32,
    /// Ticks left before the display sleeps
    pub awake_timeout: u64,
    /// Controls stopped publishing during this session
    pub controls_unresponsive: bool,
    /// A touch arrived since the last tick
    pub touch_pending: bool,
}

impl RunState {
    /// Backlight level for the display driver, zero while asleep
    pub fn brightness(&self) -> u8 {
        if self.awake {
            self.smooth_brightness.round().clamp(0.0, MAX_BRIGHTNESS) as u8
        } else {
            0
        }
    }
}

/// Tracks when the layout was last announced
#[derive(Debug, Default)]
struct LayoutAnnouncer {
    sent: Option<(ActiveApp, bool)>,
    countdown: u64,
}

impl LayoutAnnouncer {
    /// Count down one tick and report whether `layout` must go out now
    fn due(&mut self, layout: (ActiveApp, bool)) -> bool {
        self.countdown = self.countdown.saturating_sub(1);
        self.sent != Some(layout) || self.countdown == 0
    }

    fn mark_sent(&mut self, layout: (ActiveApp, bool), refresh_ticks: u64) {
        self.sent = Some(layout);
        self.countdown = refresh_ticks;
    }
}

/// The fixed-rate update loop and its owned state
pub struct Dashboard {
    config: DashboardConfig,
    scene: Scene,
    run: RunState,
    synchronizer: StateSynchronizer,
    vision: VisionFrameManager,
    geometry: GeometryBuffers,
    status: StatusMachine,
    bus: Box<dyn MessageBus>,
    outbox: Box<dyn MessageSink>,
    announcer: LayoutAnnouncer,
    params: Box<dyn ParamStore>,
    clock: Box<dyn Clock>,
    timer: TickTimer,
    last_updated: UpdatedGroups,
}

impl Dashboard {
    /// Validate `config` and wire the collaborators
    pub fn new(config: DashboardConfig, io: Collaborators) -> Result<Self, EngineError> {
        config.validate()?;

        let mut params = io.params;
        let (brightness_b, brightness_m) = load_brightness_calibration(params.as_mut());

        let mut scene = Scene::default();
        scene.layout.viz_rect = viz_rect(&config.display, scene.layout.sidebar_collapsed);

        let run = RunState {
            awake: true,
            awake_timeout: config.timing.ticks(config.timing.display_timeout_s),
            brightness_b,
            brightness_m,
            smooth_brightness: brightness_b,
            ..RunState::default()
        };

        log::info!(
            "Dashboard ready: display {}x{}, {} Hz, {} frame slots",
            config.display.width,
            config.display.height,
            config.timing.ui_freq_hz,
            config.camera.slot_count
        );

        Ok(Self {
            synchronizer: StateSynchronizer::new(config.camera.intrinsics()),
            vision: VisionFrameManager::new(io.camera, io.importer, config.camera.slot_count),
            geometry: GeometryBuffers::new(&config.camera, &config.geometry),
            status: StatusMachine::new(config.timing.alert_blink_period_ticks),
            timer: TickTimer::new(config.timing.late_tick_threshold()),
            bus: io.bus,
            outbox: io.outbox,
            announcer: LayoutAnnouncer::default(),
            params,
            clock: io.clock,
            scene,
            run,
            config,
            last_updated: UpdatedGroups::empty(),
        })
    }

    /// Run one logical tick.
    ///
    /// Order: synchronize telemetry, poll vision, derive scene fields, rebuild
    /// geometry, advance the status machine, announce the layout. A late tick
    /// is reported and still counts as exactly one tick.
    pub fn tick(&mut self) {
        if self.timer.advance(self.clock.now()) {
            log::warn!(
                "Tick {} late: {:?} since previous ({} late so far)",
                self.timer.frame(),
                self.timer.last_gap(),
                self.timer.late_ticks()
            );
        }
        self.run.frame = self.timer.frame();

        let updated = self
            .synchronizer
            .sync(self.bus.as_mut(), &mut self.scene, &mut self.run.signals, self.run.frame);
        if updated.contains(UpdatedGroups::LAYOUT) {
            log::debug!("Layout update: {:?}", self.scene.layout.active_app);
        }
        self.last_updated = updated;
        self.apply_session_edges(updated);

        self.update_vision(updated);
        self.update_derived();
        self.geometry.rebuild(&self.scene);
        self.update_status();
        self.announce_layout();
    }

    fn apply_session_edges(&mut self, updated: UpdatedGroups) {
        let signals = &self.run.signals;
        let onroad = signals.ignition || signals.started || self.scene.driver.frontview;
        if onroad == self.run.onroad {
            return;
        }
        self.run.onroad = onroad;

        if onroad {
            log::info!("Session started at tick {}", self.run.frame);
            self.run.started_frame = self.run.frame;
            self.run.controls_unresponsive = false;
            self.scene.layout.sidebar_collapsed = true;
            self.scene.layout.active_app = ActiveApp::None;
            if !updated.contains(UpdatedGroups::CONTROLS) {
                self.scene.alert = Alert::default();
            }
            self.status.reset();
        } else {
            log::info!("Session ended at tick {}", self.run.frame);
            self.scene.clear_onroad_state();
            self.scene.layout.sidebar_collapsed = false;
            self.scene.layout.active_app = ActiveApp::Home;
            self.vision.disconnect();
        }
    }

    fn update_vision(&mut self, updated: UpdatedGroups) {
        let wanted = self.active_viewport();
        if self.vision.is_connected() && (!self.run.onroad || self.vision.connected_viewport() != Some(wanted)) {
            self.vision.disconnect();
        }

        if !self.vision.is_connected() && self.run.onroad {
            match self.vision.connect(&StreamDescriptor::for_viewport(wanted)) {
                Ok(()) => {
                    if !updated.contains(UpdatedGroups::CALIBRATION) {
                        self.scene.world_objects_visible = false;
                    }
                }
                Err(err) => {
                    log::debug!("{}", err);
                    return;
                }
            }
        }

        match self.vision.poll_next_frame() {
            Ok(_) => {}
            Err(VisionError::StreamLost(reason)) => {
                log::warn!("Vision stream lost: {}", reason);
                self.vision.disconnect();
            }
            Err(err) => log::warn!("{}", err),
        }
    }

    fn update_derived(&mut self) {
        self.scene.layout.viz_rect = viz_rect(&self.config.display, self.scene.layout.sidebar_collapsed);
        self.update_leads();
        self.supervise_staleness();
        self.refresh_params();
        self.update_display_power();
        self.update_blinker();
    }

    fn update_leads(&mut self) {
        let intrinsics = self.config.camera.intrinsics();
        let scene = &mut self.scene;

        for (track, screen) in scene.leads.iter_mut().zip(scene.lead_screen.iter_mut()) {
            if track.measurement().is_some_and(|m| !m.is_plausible()) {
                *track = LeadTrack::NotTracked;
            }
            *screen = match track.measurement() {
                Some(m) if scene.world_objects_visible => {
                    intrinsics.project(&scene.extrinsic, Vec3::new(m.d_rel, m.y_rel, 0.0))
                }
                _ => None,
            };
        }
    }

    fn supervise_staleness(&mut self) {
        let frame = self.run.frame;
        let timing = &self.config.timing;

        let in_session = frame.saturating_sub(self.run.started_frame);
        if self.run.onroad && !self.scene.driver.frontview && in_session > timing.ticks(timing.controls_start_timeout_s) {
            match self.synchronizer.last_received(Topic::ControlsState) {
                Some(at) if at >= self.run.started_frame => {
                    let lag = frame - at;
                    if lag > timing.ticks(timing.controls_lag_timeout_s) {
                        if !self.run.controls_unresponsive {
                            log::error!("Controls unresponsive for {} ticks", lag);
                            self.run.controls_unresponsive = true;
                        }
                        self.scene.set_alert(
                            "TAKE CONTROL IMMEDIATELY",
                            "Controls Unresponsive",
                            AlertSize::Full,
                            AlertStatus::Critical,
                        );
                    } else {
                        self.run.controls_unresponsive = false;
                    }
                }
                _ => self.scene.set_alert(
                    "openpilot Unavailable",
                    "Waiting for controls to start",
                    AlertSize::Mid,
                    AlertStatus::Normal,
                ),
            }
        }

        let health_stale = self
            .synchronizer
            .age(Topic::HealthData, frame)
            .is_some_and(|age| age > timing.ticks(timing.health_timeout_s));
        if health_stale && self.scene.connectivity.hw_type != HwType::Unknown {
            log::warn!("Vehicle interface health timed out");
            self.scene.connectivity.hw_type = HwType::Unknown;
        }

        if self.scene.driver.frontview {
            let frontview_timeout = u64::from(timing.ui_freq_hz / 2);
            let stale = self
                .synchronizer
                .age(Topic::DriverMonitoringState, frame)
                .map_or(true, |age| age > frontview_timeout);
            if stale {
                self.scene.driver.frontview = false;
            }
        }
    }

    fn refresh_params(&mut self) {
        let frame = self.run.frame;
        let timing = &self.config.timing;
        let metric_period = timing.ticks(timing.metric_param_period_s).max(1);
        let athena_period = timing.ticks(timing.athena_param_period_s).max(1);

        if frame % metric_period == 0 {
            if let Err(err) = read_param(self.params.as_ref(), PARAM_IS_METRIC, &mut self.run.is_metric) {
                report_param_error(&err);
            }
        } else if frame % athena_period == 0 {
            let mut ping = 0u64;
            self.scene.connectivity.athena_status =
                match read_param(self.params.as_ref(), PARAM_LAST_ATHENA_PING, &mut ping) {
                    Ok(()) => {
                        self.run.last_athena_ping = Some(ping);
                        let now = u64::try_from(self.clock.now().as_nanos()).unwrap_or(u64::MAX);
                        let age = Duration::from_nanos(now.saturating_sub(ping));
                        if age < Duration::from_secs(u64::from(timing.athena_ping_timeout_s)) {
                            NetStatus::Connected
                        } else {
                            NetStatus::Error
                        }
                    }
                    Err(err) => {
                        report_param_error(&err);
                        self.run.last_athena_ping = None;
                        NetStatus::Disconnected
                    }
                };
        }
    }

    fn update_display_power(&mut self) {
        let run = &mut self.run;
        let active = run.onroad || std::mem::take(&mut run.touch_pending);

        if active {
            if !run.awake {
                log::info!("Display waking");
            }
            run.awake = true;
            run.awake_timeout = self.config.timing.ticks(self.config.timing.display_timeout_s);
        } else if run.awake_timeout > 0 {
            run.awake_timeout -= 1;
            if run.awake_timeout == 0 {
                log::info!("Display going to sleep");
                run.awake = false;
            }
        }

        if run.awake {
            let clipped = (run.signals.light_level * run.brightness_m + run.brightness_b).min(MAX_CLIPPED_BRIGHTNESS);
            run.smooth_brightness = (clipped * BRIGHTNESS_SMOOTHING
                + run.smooth_brightness * (1.0 - BRIGHTNESS_SMOOTHING))
                .min(MAX_BRIGHTNESS);
        }
    }

    fn update_blinker(&mut self) {
        let period = self.config.timing.blinker_period_ticks.max(1);
        let steering = &mut self.scene.steering;
        steering.blinker_blink_counter = if steering.left_blinker || steering.right_blinker {
            (steering.blinker_blink_counter + 1) % period
        } else {
            0
        };
    }

    fn update_status(&mut self) {
        let inputs = StatusInputs::new(
            self.run.onroad,
            self.scene.engaged,
            self.run.signals.longitudinal_control,
            &self.scene.alert,
        );
        if let Some(transition) = self.status.advance(&inputs) {
            if transition.entered_offroad() {
                self.scene.clear_onroad_state();
            }
        }
    }

    /// Publish the layout when it changed since the last announcement or the
    /// refresh interval ran out. A failed send is retried next tick.
    fn announce_layout(&mut self) {
        let layout = &self.scene.layout;
        let current = (layout.active_app, layout.sidebar_collapsed);
        if !self.announcer.due(current) {
            return;
        }

        let message = UiLayoutState { active_app: current.0, sidebar_collapsed: current.1 };
        match send_message(self.outbox.as_mut(), &message) {
            Ok(()) => {
                log::debug!("Announced layout {:?}, sidebar collapsed: {}", current.0, current.1);
                let timing = &self.config.timing;
                self.announcer.mark_sent(current, timing.ticks(timing.layout_refresh_s).max(1));
            }
            Err(err) => log::warn!("Failed to announce layout: {}", err),
        }
    }

    /// Handle a touch at display pixel `(x, y)`. Call between ticks.
    pub fn on_touch(&mut self, x: i32, y: i32) -> TouchAction {
        self.run.touch_pending = true;
        let action = classify_touch(
            &self.scene.layout,
            &self.config.display,
            self.run.onroad,
            self.scene.driver.frontview,
            x,
            y,
        );

        if action == TouchAction::ExitDriverView {
            if let Err(err) = write_param(self.params.as_mut(), PARAM_DRIVER_VIEW, &false) {
                log::warn!("Failed to leave driver view: {}", err);
            }
        } else if apply_touch(&mut self.scene.layout, action) {
            self.scene.layout.viz_rect = viz_rect(&self.config.display, self.scene.layout.sidebar_collapsed);
        }
        action
    }

    /// Release all frame handles and clear geometry. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.vision.disconnect();
        self.geometry.clear();
        log::info!("Dashboard shut down after {} ticks", self.run.frame);
    }

    /// Scene snapshot, valid until the next tick
    pub fn current_scene(&self) -> &Scene {
        &self.scene
    }

    /// Camera texture for `viewport`, [`TextureRef::NONE`] when that camera has no frame
    pub fn current_texture(&self, viewport: Viewport) -> TextureRef {
        if self.vision.connected_viewport() == Some(viewport) {
            self.vision.current_texture()
        } else {
            TextureRef::NONE
        }
    }

    /// Overlay geometry for `viewport`
    pub fn current_geometry(&self, viewport: Viewport) -> &ViewportGeometry {
        self.geometry.current(viewport)
    }

    /// Viewport the display should show
    pub fn active_viewport(&self) -> Viewport {
        if self.scene.driver.frontview {
            Viewport::Front
        } else {
            Viewport::Rear
        }
    }

    /// Everything a renderer needs for the active viewport
    pub fn render_frame(&self) -> RenderFrame<'_> {
        let viewport = self.active_viewport();
        RenderFrame {
            frame: self.run.frame,
            viewport,
            scene: &self.scene,
            status: self.status.status(),
            alert_visible: self.status.alert_visible(),
            texture: self.current_texture(viewport),
            geometry: self.current_geometry(viewport),
            brightness: self.run.brightness(),
        }
    }

    /// Current display status
    pub fn status(&self) -> UiStatus {
        self.status.status()
    }

    /// Whether alert text is visible this tick
    pub fn alert_visible(&self) -> bool {
        self.status.alert_visible()
    }

    /// Session and device state
    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    /// Groups updated by the last tick's synchronization
    pub fn last_updated(&self) -> UpdatedGroups {
        self.last_updated
    }

    /// Telemetry bookkeeping
    pub fn synchronizer(&self) -> &StateSynchronizer {
        &self.synchronizer
    }

    /// Frame ring
    pub fn vision(&self) -> &VisionFrameManager {
        &self.vision
    }

    /// Configuration in use
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Ticks that started later than the lateness threshold
    pub fn late_ticks(&self) -> u64 {
        self.timer.late_ticks()
    }
}

fn load_brightness_calibration(params: &mut dyn ParamStore) -> (f32, f32) {
    let mut b = DEFAULT_BRIGHTNESS_B;
    let mut m = DEFAULT_BRIGHTNESS_M;
    let read_b = read_param(params, PARAM_BRIGHTNESS_B, &mut b);
    let read_m = read_param(params, PARAM_BRIGHTNESS_M, &mut m);

    if let Err(err) = read_b.and(read_m) {
        log::warn!("Brightness calibration unusable ({}), restoring defaults", err);
        b = DEFAULT_BRIGHTNESS_B;
        m = DEFAULT_BRIGHTNESS_M;
        for (name, value) in [(PARAM_BRIGHTNESS_B, b), (PARAM_BRIGHTNESS_M, m)] {
            if let Err(err) = write_param(params, name, &value) {
                log::warn!("Failed to store {}: {}", name, err);
            }
        }
    }
    (b, m)
}

fn report_param_error(err: &ParamError) {
    match err {
        ParamError::NotFound(name) => log::trace!("Parameter {} not set", name),
        _ => log::warn!("{}", err),
    }
}

/// Drive `dashboard` at its configured rate until `keep_running` returns false.
///
/// Sleeps out the rest of each period; a tick that overruns is not made up
/// for. Shuts the dashboard down on exit.
pub fn run(
    dashboard: &mut Dashboard,
    renderer: &mut dyn SceneRenderer,
    mut keep_running: impl FnMut(&Dashboard) -> bool,
) {
    let period = dashboard.config().timing.tick_period();
    log::info!("Starting update loop, {:?} per tick", period);

    let mut deadline = Instant::now();
    while keep_running(&*dashboard) {
        dashboard.tick();
        if let Err(err) = renderer.render(&dashboard.render_frame()) {
            log::warn!("Renderer failed on tick {}: {}", dashboard.run_state().frame, err);
        }

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            deadline = now;
        }
    }

    dashboard.shutdown();
}
