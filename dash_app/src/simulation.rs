//! Simulated camera and telemetry producers
//!
//! Both run on their own threads and talk to the UI thread only through
//! channels, the way the real camera daemon and bus publishers would.

use std::fs::{self, File};
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dash_engine::messaging::{
    BusPublisher, CarParams, CarState, ControlsState, GnssMeasurements, HealthData, LiveCalibration,
    ModelOutput, PathData, PublishError, RadarLead, RadarState, SensorEvents, ThermalData,
};
use dash_engine::scene::{AlertSize, AlertStatus, HwType};
use dash_engine::vision::{
    CameraStream, ExternalBuffer, FrameBuffer, StreamDescriptor, StreamInfo, VisionError,
};

const BYTES_PER_PIXEL: u32 = 3;

/// Camera producer cycling through file-backed buffers
pub struct SimulatedCamera {
    files: Vec<File>,
    buffers: Vec<ExternalBuffer>,
    width: u32,
    height: u32,
    stride: u32,
    period: Duration,
    frames: Option<Receiver<(usize, u64)>>,
    producer: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

impl SimulatedCamera {
    /// Allocate `slots` frame buffers of `width`x`height` RGB under `dir`
    pub fn new(dir: &Path, slots: usize, width: u32, height: u32, period: Duration) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stride = width * BYTES_PER_PIXEL;
        let size = u64::from(stride) * u64::from(height);

        let mut files = Vec::with_capacity(slots);
        let mut buffers = Vec::with_capacity(slots);
        for index in 0..slots {
            let file = File::options()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(dir.join(format!("frame_{index}.rgb")))?;
            file.set_len(size)?;
            buffers.push(ExternalBuffer {
                id: index as u64 + 1,
                fd: file.as_raw_fd(),
                size,
                offset: 0,
                stride,
                width,
                height,
            });
            files.push(file);
        }
        log::debug!("Allocated {} simulated camera buffers of {} bytes", files.len(), size);

        Ok(Self { files, buffers, width, height, stride, period, frames: None, producer: None })
    }
}

impl CameraStream for SimulatedCamera {
    fn connect(&mut self, descriptor: &StreamDescriptor) -> Result<StreamInfo, VisionError> {
        self.disconnect();

        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let slots = self.buffers.len();
        let period = self.period;
        let running = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("camera-{}", descriptor.name))
            .spawn(move || {
                let mut frame_id = 0u64;
                while !running.load(Ordering::Relaxed) {
                    let slot = (frame_id as usize) % slots;
                    if tx.send((slot, frame_id)).is_err() {
                        break;
                    }
                    frame_id += 1;
                    thread::sleep(period);
                }
            })
            .map_err(|e| VisionError::Unavailable(format!("cannot start camera thread: {e}")))?;

        self.frames = Some(rx);
        self.producer = Some((stop, handle));
        log::info!("Simulated camera {} streaming {} buffers", descriptor.name, self.files.len());

        Ok(StreamInfo { width: self.width, height: self.height, stride: self.stride, buffers: self.buffers.clone() })
    }

    fn poll_next_frame(&mut self) -> Result<Option<FrameBuffer>, VisionError> {
        let Some(frames) = &self.frames else {
            return Ok(None);
        };

        // only the newest frame is worth showing
        let mut latest = None;
        loop {
            match frames.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(VisionError::StreamLost("camera thread exited".to_string()));
                }
            }
        }

        Ok(latest.and_then(|(index, frame_id)| {
            self.buffers.get(index).map(|&buffer| FrameBuffer { index, buffer, frame_id })
        }))
    }

    fn disconnect(&mut self) {
        self.frames = None;
        if let Some((stop, handle)) = self.producer.take() {
            stop.store(true, Ordering::Relaxed);
            if handle.join().is_err() {
                log::error!("Camera thread panicked");
            }
        }
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Scripted drive: ignition after one second, engagement after three, a lead
/// closing in and a blinker burst along the way
pub fn spawn_telemetry(
    publisher: BusPublisher,
    period: Duration,
    stop: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("telemetry".to_string()).spawn(move || {
        let mut tick = 0u64;
        while !stop.load(Ordering::Relaxed) {
            match publish_tick(&publisher, tick) {
                Ok(()) => {}
                Err(PublishError::Disconnected(topic)) => {
                    log::debug!("Telemetry stopping, {} has no subscriber", topic);
                    break;
                }
                Err(err) => log::warn!("{}", err),
            }
            tick += 1;
            thread::sleep(period);
        }
    })
}

fn publish_tick(publisher: &BusPublisher, tick: u64) -> Result<(), PublishError> {
    let t = tick as f32 * 0.05;

    if tick % 100 == 0 {
        publisher.publish(&CarParams { openpilot_longitudinal_control: true })?;
        publisher.publish(&LiveCalibration {
            extrinsic_matrix: vec![0.0, -1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 1.22, 1.0, 0.0, 0.0, 0.0],
        })?;
        publisher.publish(&GnssMeasurements { satellite_count: 9 })?;
    }

    if tick % 10 == 0 {
        publisher.publish(&HealthData { hw_type: HwType::Uno, ignition_line: tick >= 20, ignition_can: false })?;
        publisher.publish(&ThermalData {
            cpu_temps: vec![48.0, 51.5 + (t * 0.3).sin(), 47.0, 49.0],
            battery_percent: 100,
            battery_charging: true,
            battery_status: "Charging".to_string(),
            started: tick >= 20,
        })?;
        publisher.publish(&SensorEvents { light: 60.0 + 40.0 * (t * 0.1).sin() })?;
    }

    if tick >= 20 {
        publisher.publish(&ControlsState {
            enabled: tick >= 60,
            alert_size: AlertSize::None,
            alert_status: AlertStatus::Normal,
            angle_steers: 3.0 * (t * 0.5).sin(),
            v_ego: 25.0,
            ..ControlsState::default()
        })?;

        let curve = 0.002 * (t * 0.2).sin();
        let line = |offset: f32| PathData {
            points: (0..50).map(|i| offset + curve * (i * i) as f32).collect(),
            prob: 0.9,
            std: 0.1,
        };
        publisher.publish(&ModelOutput { left_lane: line(1.8), path: line(0.0), right_lane: line(-1.8) })?;

        let d_rel = 40.0 - 10.0 * (t * 0.1).sin();
        publisher.publish(&RadarState {
            lead_one: RadarLead { status: true, d_rel, y_rel: 0.2, v_rel: -1.0 },
            lead_two: RadarLead::default(),
        })?;

        let blinking = (100..160).contains(&tick);
        publisher.publish(&CarState { left_blinker: blinking, steer_ratio: 15.0, ..CarState::default() })?;
    }

    Ok(())
}
