//! Geometry buffers
//!
//! Overlay vertex data for both camera viewports, rebuilt from the scene once
//! per tick. Each viewport is double-buffered: a rebuild writes the back copy
//! and publishes it only when complete, so readers never see a partial
//! rebuild.
//!
//! Ribbon rules:
//! - a lane ribbon walks one polyline outward on its `+normal` side, then back
//!   on its `-normal` side; the half width tapers to [`FAR_WIDTH_RATIO`] at the
//!   far end
//! - the road ribbon walks the left lane outward, then the right lane back;
//!   both sides are cut to the shorter one
//! - fewer than two points give an empty polygon

use crate::core::{CameraConfig, GeometryConfig};
use crate::foundation::collections::{fill_clipped, push_clipped, BoundedVec, DoubleBuffered};
use crate::foundation::math::{CameraIntrinsics, Rect, Vec2};
use crate::scene::{Polyline, Scene, LEAD_TRACK_COUNT};
use crate::vision::Viewport;

use super::projection::FrameTransform;
use super::vertex::{FrameVertex, OverlayVertex};

/// Maximum vertices of one overlay polygon
pub const MAX_POLYGON_VERTICES: usize = 98;

/// Maximum track markers on one side of the path
pub const MAX_MARKERS_PER_SIDE: usize = 50;

/// Maximum track markers per viewport
pub const MAX_TRACK_MARKERS: usize = 2 * MAX_MARKERS_PER_SIDE;

/// Ribbon half width at the far end relative to the near end
pub const FAR_WIDTH_RATIO: f32 = 0.2;

/// Filled polygon, vertices in traversal order
pub type Polygon = BoundedVec<OverlayVertex, MAX_POLYGON_VERTICES>;

/// Track marker points
pub type Markers = BoundedVec<OverlayVertex, MAX_TRACK_MARKERS>;

/// All vertex data of one viewport, in display pixels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewportGeometry {
    /// Left lane line ribbon
    pub left_lane: Polygon,
    /// Path ribbon
    pub path: Polygon,
    /// Right lane line ribbon
    pub right_lane: Polygon,
    /// Area between the lane lines
    pub road: Polygon,
    /// Markers along both sides of the path, left side first
    pub track: Markers,
    /// Lead vehicle positions
    pub leads: [Option<OverlayVertex>; LEAD_TRACK_COUNT],
    /// Textured quad of the camera frame
    pub frame_quad: [FrameVertex; 4],
}

impl ViewportGeometry {
    /// The filled polygons, road first
    pub fn polygons(&self) -> [&Polygon; 4] {
        [&self.road, &self.left_lane, &self.path, &self.right_lane]
    }

    /// Drop all overlays; the frame quad is kept
    pub fn clear_overlays(&mut self) {
        self.left_lane.clear();
        self.path.clear();
        self.right_lane.clear();
        self.road.clear();
        self.track.clear();
        self.leads = [None; LEAD_TRACK_COUNT];
    }
}

/// Screen-space unit normal of `points` at `i`, pointing to the right of travel
fn normal_at(points: &[Vec2], i: usize) -> Vec2 {
    let last = points.len() - 1;
    let tangent = points[(i + 1).min(last)] - points[i.saturating_sub(1)];
    let len = tangent.norm();
    if len <= f32::EPSILON {
        return Vec2::new(1.0, 0.0);
    }
    Vec2::new(-tangent.y, tangent.x) / len
}

/// Half width at point `i` of `n`
fn tapered(half_width: f32, i: usize, n: usize) -> f32 {
    let t = i as f32 / (n - 1) as f32;
    half_width * (1.0 - (1.0 - FAR_WIDTH_RATIO) * t)
}

/// Build a closed ribbon around one polyline
pub fn build_ribbon(points: &[Vec2], half_width: f32, out: &mut Polygon) {
    out.clear();
    let n = points.len().min(MAX_POLYGON_VERTICES / 2);
    if n < 2 {
        return;
    }
    let points = &points[..n];
    let offset = |i: usize| normal_at(points, i) * tapered(half_width, i, n);

    for i in 0..n {
        push_clipped(out, OverlayVertex::at(points[i] + offset(i)));
    }
    for i in (0..n).rev() {
        push_clipped(out, OverlayVertex::at(points[i] - offset(i)));
    }
}

/// Build the road polygon: left lane outward, right lane back
pub fn build_road(left: &[Vec2], right: &[Vec2], out: &mut Polygon) {
    out.clear();
    let m = left.len().min(right.len()).min(MAX_POLYGON_VERTICES / 2);
    if m < 2 {
        return;
    }
    for p in &left[..m] {
        push_clipped(out, OverlayVertex::at(*p));
    }
    for p in right[..m].iter().rev() {
        push_clipped(out, OverlayVertex::at(*p));
    }
}

/// Build track markers on both sides of the path.
///
/// With `cutoff_y` set, markers stop at the first path point above it on
/// screen (farther than the primary lead).
pub fn build_track(path: &[Vec2], half_width: f32, cutoff_y: Option<f32>, out: &mut Markers) {
    out.clear();
    let n = match cutoff_y {
        Some(y) => path.iter().take_while(|p| p.y >= y).count(),
        None => path.len(),
    }
    .min(MAX_MARKERS_PER_SIDE);
    if n < 2 {
        return;
    }
    let path = &path[..n];

    for i in 0..n {
        push_clipped(out, OverlayVertex::at(path[i] - normal_at(path, i) * half_width));
    }
    for i in (0..n).rev() {
        push_clipped(out, OverlayVertex::at(path[i] + normal_at(path, i) * half_width));
    }
}

/// Per-viewport overlay geometry
#[derive(Debug, Clone)]
pub struct GeometryBuffers {
    intrinsics: CameraIntrinsics,
    zoom: [f32; 2],
    widths: GeometryConfig,
    viewports: [DoubleBuffered<ViewportGeometry>; 2],
}

impl GeometryBuffers {
    /// Create empty buffers for both viewports
    pub fn new(camera: &CameraConfig, widths: &GeometryConfig) -> Self {
        Self {
            intrinsics: camera.intrinsics(),
            zoom: [camera.rear_zoom, camera.front_zoom],
            widths: widths.clone(),
            viewports: Default::default(),
        }
    }

    /// Frame transform of `viewport` into `viz`
    pub fn transform(&self, viewport: Viewport, viz: Rect) -> FrameTransform {
        FrameTransform::for_viewport(viewport, &self.intrinsics, viz, self.zoom[viewport.index()])
    }

    /// Recompute both viewports from `scene` and publish them
    pub fn rebuild(&mut self, scene: &Scene) {
        for viewport in Viewport::ALL {
            let transform = self.transform(viewport, scene.layout.viz_rect);
            let buffer = &mut self.viewports[viewport.index()];
            build_viewport(buffer.back_mut(), scene, &transform, &self.widths);
            buffer.publish();
        }
    }

    /// Last published geometry of `viewport`
    pub fn current(&self, viewport: Viewport) -> &ViewportGeometry {
        self.viewports[viewport.index()].front()
    }

    /// Reset both viewports to empty. Safe to call repeatedly.
    pub fn clear(&mut self) {
        for buffer in &mut self.viewports {
            *buffer = DoubleBuffered::default();
        }
    }
}

fn to_display(points: &Polyline, transform: &FrameTransform) -> Polyline {
    let mut out = Polyline::new();
    fill_clipped(&mut out, points.iter().map(|p| transform.apply(*p)));
    out
}

fn build_viewport(out: &mut ViewportGeometry, scene: &Scene, transform: &FrameTransform, widths: &GeometryConfig) {
    out.frame_quad = transform.frame_quad();
    if !scene.world_objects_visible {
        out.clear_overlays();
        return;
    }

    let left = to_display(&scene.path.left_lane, transform);
    let path = to_display(&scene.path.path, transform);
    let right = to_display(&scene.path.right_lane, transform);

    build_ribbon(&left, widths.lane_half_width_px, &mut out.left_lane);
    build_ribbon(&path, widths.path_half_width_px, &mut out.path);
    build_ribbon(&right, widths.lane_half_width_px, &mut out.right_lane);
    build_road(&left, &right, &mut out.road);

    out.leads = scene.lead_screen.map(|p| p.map(|p| OverlayVertex::at(transform.apply(p))));
    let cutoff = out.leads[0].map(|lead| lead.position[1]);
    build_track(&path, widths.track_half_width_px, cutoff, &mut out.track);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::PATH_POINT_CAPACITY;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn straight(n: usize) -> Vec<Vec2> {
        (0..n).map(|i| Vec2::new(500.0, 800.0 - 10.0 * i as f32)).collect()
    }

    #[test]
    fn test_short_input_gives_empty_polygon() {
        let mut out = Polygon::new();
        build_ribbon(&straight(1), 5.0, &mut out);
        assert!(out.is_empty());
        build_road(&straight(1), &straight(10), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_ribbon_tapers_to_far_end() {
        let mut out = Polygon::new();
        build_ribbon(&straight(5), 10.0, &mut out);
        assert_eq!(out.len(), 10);
        // near end: right side then left side
        assert_relative_eq!(out[0].position[0], 510.0);
        assert_relative_eq!(out[9].position[0], 490.0);
        // far end
        assert_relative_eq!(out[4].position[0], 502.0);
        assert_relative_eq!(out[5].position[0], 498.0);
    }

    #[test]
    fn test_road_truncates_to_shorter_side() {
        let left: Vec<Vec2> = straight(8).iter().map(|p| p - Vec2::new(100.0, 0.0)).collect();
        let right: Vec<Vec2> = straight(5).iter().map(|p| p + Vec2::new(100.0, 0.0)).collect();
        let mut out = Polygon::new();
        build_road(&left, &right, &mut out);

        assert_eq!(out.len(), 10);
        assert_eq!(out[4].point(), left[4]);
        assert_eq!(out[5].point(), right[4]);
        assert_eq!(out[9].point(), right[0]);
    }

    #[test]
    fn test_track_stops_at_lead() {
        let mut out = Markers::new();
        build_track(&straight(20), 14.0, Some(745.0), &mut out);
        // points at y = 800..750 are nearer than the lead
        assert_eq!(out.len(), 12);
        assert!(out.iter().all(|m| m.position[1] >= 745.0));
    }

    #[test]
    fn test_track_without_lead_uses_whole_path() {
        let mut out = Markers::new();
        build_track(&straight(PATH_POINT_CAPACITY), 14.0, None, &mut out);
        assert_eq!(out.len(), 2 * PATH_POINT_CAPACITY);
        assert_relative_eq!(out[0].position[0], 486.0);
    }

    #[test]
    fn test_rebuild_hides_overlays_until_calibrated() {
        let mut scene = Scene::default();
        scene.layout.viz_rect = Rect::new(10, 10, 1900, 1060);
        fill_clipped(&mut scene.path.path, straight(10));

        let mut buffers = GeometryBuffers::new(&CameraConfig::default(), &GeometryConfig::default());
        buffers.rebuild(&scene);
        assert!(buffers.current(Viewport::Rear).path.is_empty());
        assert_ne!(buffers.current(Viewport::Rear).frame_quad, [FrameVertex::default(); 4]);

        scene.world_objects_visible = true;
        buffers.rebuild(&scene);
        assert_eq!(buffers.current(Viewport::Rear).path.len(), 20);
        assert_eq!(buffers.current(Viewport::Front).path.len(), 20);
    }

    #[test]
    fn test_viewports_differ_by_projection() {
        let mut scene = Scene::default();
        scene.world_objects_visible = true;
        scene.layout.viz_rect = Rect::new(10, 10, 1900, 1060);
        fill_clipped(&mut scene.path.path, straight(10).iter().map(|p| p - Vec2::new(200.0, 0.0)));

        let mut buffers = GeometryBuffers::new(&CameraConfig::default(), &GeometryConfig::default());
        buffers.rebuild(&scene);

        let rear = buffers.current(Viewport::Rear).path[0].position;
        let front = buffers.current(Viewport::Front).path[0].position;
        assert_relative_eq!(rear[1], front[1]);
        assert!((rear[0] - front[0]).abs() > 1.0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut buffers = GeometryBuffers::new(&CameraConfig::default(), &GeometryConfig::default());
        buffers.rebuild(&Scene::default());
        buffers.clear();
        buffers.clear();
        assert_eq!(*buffers.current(Viewport::Rear), ViewportGeometry::default());
    }

    fn polyline(max: usize) -> impl Strategy<Value = Vec<Vec2>> {
        proptest::collection::vec((0.0f32..2000.0, 0.0f32..1200.0), 0..=max)
            .prop_map(|pts| pts.into_iter().map(|(x, y)| Vec2::new(x, y)).collect())
    }

    proptest! {
        #[test]
        fn prop_ribbon_bounded_and_ordered(points in polyline(PATH_POINT_CAPACITY), half_width in 0.5f32..30.0) {
            let mut out = Polygon::new();
            build_ribbon(&points, half_width, &mut out);

            let n = points.len();
            if n < 2 {
                prop_assert!(out.is_empty());
            } else {
                prop_assert_eq!(out.len(), 2 * n);
                prop_assert!(out.len() <= MAX_POLYGON_VERTICES);
                for (i, p) in points.iter().enumerate() {
                    let w = tapered(half_width, i, n);
                    let outward = (out[i].point() - p).norm();
                    let back = (out[2 * n - 1 - i].point() - p).norm();
                    prop_assert!((outward - w).abs() < 1e-2);
                    prop_assert!((back - w).abs() < 1e-2);
                }
            }
        }

        #[test]
        fn prop_road_bounded_and_ordered(left in polyline(PATH_POINT_CAPACITY), right in polyline(PATH_POINT_CAPACITY)) {
            let mut out = Polygon::new();
            build_road(&left, &right, &mut out);

            let m = left.len().min(right.len());
            if m < 2 {
                prop_assert!(out.is_empty());
            } else {
                prop_assert_eq!(out.len(), 2 * m);
                for i in 0..m {
                    prop_assert_eq!(out[i].point(), left[i]);
                    prop_assert_eq!(out[2 * m - 1 - i].point(), right[i]);
                }
            }
        }

        #[test]
        fn prop_track_within_capacity(path in polyline(2 * MAX_MARKERS_PER_SIDE), cutoff in proptest::option::of(0.0f32..1200.0)) {
            let mut out = Markers::new();
            build_track(&path, 14.0, cutoff, &mut out);
            prop_assert!(out.len() <= MAX_TRACK_MARKERS);
            prop_assert_eq!(out.len() % 2, 0);
        }
    }
}
