//! End-to-end behavior of the update loop with in-process collaborators

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use dash_engine::foundation::time::ManualClock;
use dash_engine::messaging::{
    decode, BusPublisher, ControlsState, HealthData, LocalBus, MessageBus, RadarLead, RadarState, Topic,
    UiLayoutState,
};
use dash_engine::params::{FileParamStore, MemoryParamStore, ParamStore};
use dash_engine::render::{HeadlessImporter, RenderFrame, SceneRenderer, TextureRef};
use dash_engine::scene::{ActiveApp, HwType, TouchAction};
use dash_engine::status::UiStatus;
use dash_engine::vision::{
    CameraStream, ExternalBuffer, FrameBuffer, StreamDescriptor, StreamInfo, Viewport, VisionError,
};
use dash_engine::{Collaborators, Dashboard, PARAM_BRIGHTNESS_B, PARAM_BRIGHTNESS_M};
use dash_engine::core::DashboardConfig;

#[derive(Default)]
struct CameraScript {
    available: bool,
    buffers: Vec<ExternalBuffer>,
    pending: VecDeque<FrameBuffer>,
    lost: bool,
    connects: u32,
}

#[derive(Clone, Default)]
struct ScriptedCamera(Rc<RefCell<CameraScript>>);

impl ScriptedCamera {
    fn with_buffers(count: u64) -> Self {
        let camera = Self::default();
        {
            let mut script = camera.0.borrow_mut();
            script.available = true;
            script.buffers = (0..count).map(buffer).collect();
        }
        camera
    }

    fn push_frame(&self, index: usize, frame_id: u64) {
        let mut script = self.0.borrow_mut();
        let buffer = script.buffers[index];
        script.pending.push_back(FrameBuffer { index, buffer, frame_id });
    }
}

impl CameraStream for ScriptedCamera {
    fn connect(&mut self, _descriptor: &StreamDescriptor) -> Result<StreamInfo, VisionError> {
        let mut script = self.0.borrow_mut();
        if !script.available {
            return Err(VisionError::Unavailable("camera daemon not running".to_string()));
        }
        script.connects += 1;
        script.lost = false;
        Ok(StreamInfo { width: 64, height: 32, stride: 192, buffers: script.buffers.clone() })
    }

    fn poll_next_frame(&mut self) -> Result<Option<FrameBuffer>, VisionError> {
        let mut script = self.0.borrow_mut();
        if script.lost {
            return Err(VisionError::StreamLost("socket closed".to_string()));
        }
        Ok(script.pending.pop_front())
    }

    fn disconnect(&mut self) {
        self.0.borrow_mut().pending.clear();
    }
}

fn buffer(id: u64) -> ExternalBuffer {
    ExternalBuffer { id: id + 1, fd: 10 + id as i32, size: 192 * 32, offset: 0, stride: 192, width: 64, height: 32 }
}

struct Rig {
    publisher: BusPublisher,
    announced: LocalBus,
    clock: ManualClock,
    dashboard: Dashboard,
}

impl Rig {
    fn new(camera: ScriptedCamera, params: Box<dyn ParamStore>) -> Self {
        let (bus, publisher) = LocalBus::new();
        let (announced, outbox) = LocalBus::new();
        let clock = ManualClock::new(Duration::from_secs(10));
        let dashboard = Dashboard::new(
            DashboardConfig::default(),
            Collaborators {
                camera: Box::new(camera),
                importer: Box::new(HeadlessImporter::new()),
                bus: Box::new(bus),
                outbox: Box::new(outbox),
                params,
                clock: Box::new(clock.clone()),
            },
        )
        .unwrap();
        Self { publisher, announced, clock, dashboard }
    }

    fn tick(&mut self) {
        self.clock.advance(Duration::from_millis(50));
        self.dashboard.tick();
    }

    fn last_announced_layout(&mut self) -> Option<UiLayoutState> {
        let mut last = None;
        while let Some(payload) = self.announced.try_receive(Topic::UiLayoutState) {
            last = Some(decode(&payload).unwrap());
        }
        last
    }

    fn ignition(&self) {
        self.publisher
            .publish(&HealthData { hw_type: HwType::Dos, ignition_line: true, ignition_can: false })
            .unwrap();
    }
}

fn lead(d_rel: f32) -> RadarState {
    RadarState { lead_one: RadarLead { status: true, d_rel, y_rel: 0.5, v_rel: -2.0 }, ..RadarState::default() }
}

#[test]
fn test_engaged_within_one_tick() {
    let mut rig = Rig::new(ScriptedCamera::default(), Box::new(MemoryParamStore::new()));
    rig.ignition();
    rig.publisher.publish(&ControlsState { enabled: true, ..ControlsState::default() }).unwrap();
    rig.tick();

    assert!(rig.dashboard.run_state().onroad);
    assert_eq!(rig.dashboard.status(), UiStatus::Engaged);
    assert!(!rig.dashboard.current_scene().alert.is_active());
}

#[test]
fn test_engaged_with_longitudinal_control() {
    let mut rig = Rig::new(ScriptedCamera::default(), Box::new(MemoryParamStore::new()));
    rig.ignition();
    rig.publisher
        .publish(&dash_engine::messaging::CarParams { openpilot_longitudinal_control: true })
        .unwrap();
    rig.publisher.publish(&ControlsState { enabled: true, ..ControlsState::default() }).unwrap();
    rig.tick();

    assert_eq!(rig.dashboard.status(), UiStatus::EngagedLongitudinal);
}

#[test]
fn test_camera_that_never_connects() {
    let mut rig = Rig::new(ScriptedCamera::default(), Box::new(MemoryParamStore::new()));
    rig.ignition();
    for _ in 0..20 {
        rig.tick();
        assert_eq!(rig.dashboard.current_texture(Viewport::Rear), TextureRef::NONE);
        assert_eq!(rig.dashboard.render_frame().texture, TextureRef::NONE);
    }
    assert!(!rig.dashboard.vision().is_connected());
    assert_eq!(rig.dashboard.status(), UiStatus::Disengaged);
}

#[test]
fn test_frames_flow_and_are_released_when_session_ends() {
    let camera = ScriptedCamera::with_buffers(3);
    let mut rig = Rig::new(camera.clone(), Box::new(MemoryParamStore::new()));
    rig.ignition();
    rig.tick();
    assert!(rig.dashboard.vision().is_connected());
    assert_eq!(rig.dashboard.vision().live_handles(), 3);

    camera.push_frame(1, 100);
    rig.tick();
    let texture = rig.dashboard.current_texture(Viewport::Rear);
    assert!(!texture.is_none());
    assert_eq!(rig.dashboard.current_texture(Viewport::Front), TextureRef::NONE);

    // no new frame keeps the previous one on screen
    rig.tick();
    assert_eq!(rig.dashboard.current_texture(Viewport::Rear), texture);

    rig.publisher.publish(&HealthData::default()).unwrap();
    rig.tick();
    assert!(!rig.dashboard.vision().is_connected());
    assert_eq!(rig.dashboard.vision().live_handles(), 0);
    assert_eq!(rig.dashboard.current_texture(Viewport::Rear), TextureRef::NONE);
}

#[test]
fn test_lost_stream_reconnects() {
    let camera = ScriptedCamera::with_buffers(2);
    let mut rig = Rig::new(camera.clone(), Box::new(MemoryParamStore::new()));
    rig.ignition();
    rig.tick();
    assert_eq!(camera.0.borrow().connects, 1);

    camera.0.borrow_mut().lost = true;
    rig.tick();
    assert!(!rig.dashboard.vision().is_connected());

    rig.tick();
    assert!(rig.dashboard.vision().is_connected());
    assert_eq!(camera.0.borrow().connects, 2);
}

#[test]
fn test_lost_lead_is_invalid_on_same_tick() {
    let mut rig = Rig::new(ScriptedCamera::default(), Box::new(MemoryParamStore::new()));
    rig.ignition();
    rig.publisher.publish(&lead(35.0)).unwrap();
    rig.tick();
    assert_eq!(rig.dashboard.current_scene().leads[0].d_rel(), Some(35.0));

    rig.publisher.publish(&RadarState::default()).unwrap();
    rig.tick();
    let scene = rig.dashboard.current_scene();
    assert!(!scene.leads[0].is_tracked());
    assert_eq!(scene.leads[0].d_rel(), None);
    assert!(scene.lead_screen[0].is_none());
    assert!(rig.dashboard.current_geometry(Viewport::Rear).leads[0].is_none());
}

#[test]
fn test_malformed_payload_only_affects_its_topic() {
    let mut rig = Rig::new(ScriptedCamera::default(), Box::new(MemoryParamStore::new()));
    rig.ignition();
    rig.publisher.publish(&lead(20.0)).unwrap();
    rig.tick();

    rig.publisher.publish_raw(Topic::RadarState, vec![0xff; 3]).unwrap();
    rig.publisher.publish(&ControlsState { enabled: true, ..ControlsState::default() }).unwrap();
    rig.tick();

    let scene = rig.dashboard.current_scene();
    assert_eq!(scene.leads[0].d_rel(), Some(20.0));
    assert!(scene.engaged);
    assert_eq!(rig.dashboard.synchronizer().decode_failures(Topic::RadarState), 1);
    assert_eq!(rig.dashboard.synchronizer().decode_failures(Topic::ControlsState), 0);
}

#[test]
fn test_touch_layout_is_announced_on_next_tick() {
    let mut rig = Rig::new(ScriptedCamera::default(), Box::new(MemoryParamStore::new()));
    rig.tick();
    assert_eq!(
        rig.last_announced_layout(),
        Some(UiLayoutState { active_app: rig.dashboard.current_scene().layout.active_app, sidebar_collapsed: false })
    );

    rig.ignition();
    rig.tick();
    assert_eq!(rig.last_announced_layout(), Some(UiLayoutState { active_app: ActiveApp::None, sidebar_collapsed: true }));
    rig.tick();
    assert_eq!(rig.last_announced_layout(), None);

    assert_eq!(rig.dashboard.on_touch(900, 500), TouchAction::ToggleSidebar);
    rig.tick();
    let layout = rig.last_announced_layout().unwrap();
    assert!(!layout.sidebar_collapsed);
}

#[test]
fn test_late_ticks_do_not_catch_up() {
    let mut rig = Rig::new(ScriptedCamera::default(), Box::new(MemoryParamStore::new()));
    rig.tick();
    rig.clock.advance(Duration::from_millis(500));
    rig.tick();
    rig.tick();

    assert_eq!(rig.dashboard.run_state().frame, 3);
    assert_eq!(rig.dashboard.late_ticks(), 1);
}

#[test]
fn test_corrupted_brightness_is_repaired_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileParamStore::open(dir.path()).unwrap();
    store.write(PARAM_BRIGHTNESS_B, "bright").unwrap();
    store.write(PARAM_BRIGHTNESS_M, "2.5").unwrap();

    let rig = Rig::new(ScriptedCamera::default(), Box::new(store.clone()));
    assert_eq!(rig.dashboard.run_state().brightness_b, 5.0);
    assert_eq!(rig.dashboard.run_state().brightness_m, 1.3);
    assert_eq!(store.read(PARAM_BRIGHTNESS_B).unwrap(), "5");
    assert_eq!(store.read(PARAM_BRIGHTNESS_M).unwrap(), "1.3");
}

#[test]
fn test_renderer_sees_consistent_frame() {
    struct Recorder(Vec<(u64, UiStatus)>);

    impl SceneRenderer for Recorder {
        fn render(&mut self, frame: &RenderFrame<'_>) -> Result<(), Box<dyn std::error::Error>> {
            self.0.push((frame.frame, frame.status));
            Ok(())
        }
    }

    let mut rig = Rig::new(ScriptedCamera::default(), Box::new(MemoryParamStore::new()));
    rig.ignition();
    let mut recorder = Recorder(Vec::new());
    dash_engine::run(&mut rig.dashboard, &mut recorder, |d| d.run_state().frame < 3);

    assert_eq!(recorder.0.len(), 3);
    assert_eq!(recorder.0[0], (1, UiStatus::Disengaged));
    assert_eq!(recorder.0[2].0, 3);
}
