//! Screen layout: visualization rectangle and touch classification

use crate::core::DisplayConfig;
use crate::foundation::math::Rect;

use super::model::{ActiveApp, LayoutState};

/// Settings button on the expanded sidebar
pub const SETTINGS_BUTTON: Rect = Rect::new(50, 35, 200, 117);

/// Home button on the expanded sidebar
pub const HOME_BUTTON: Rect = Rect::new(60, 1080 - 180 - 40, 180, 180);

/// Compute the visualization rectangle.
///
/// The result is clamped so it always lies inside `(0, 0, width, height)`,
/// even for display sizes that cannot fit the border and sidebar.
pub fn viz_rect(display: &DisplayConfig, sidebar_collapsed: bool) -> Rect {
    let width = display.width.max(0);
    let height = display.height.max(0);
    let border = display.border.clamp(0, width.min(height) / 2);

    let mut rect = Rect::new(border, border, width - 2 * border, height - 2 * border);
    if !sidebar_collapsed {
        let shift = display.sidebar_width.clamp(0, rect.w);
        rect.x += shift;
        rect.w -= shift;
    }
    rect
}

/// What a touch at a given point asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchAction {
    /// Open the settings app
    OpenSettings,
    /// Show the home app (offroad)
    OpenHome,
    /// Collapse the sidebar and show the full visualization (onroad)
    CollapseToVisualization,
    /// Toggle the sidebar
    ToggleSidebar,
    /// Leave the driver camera preview
    ExitDriverView,
    /// Nothing to do
    Ignore,
}

/// Classify a touch. Sidebar buttons take precedence over the video area.
pub fn classify_touch(
    layout: &LayoutState,
    display: &DisplayConfig,
    onroad: bool,
    frontview: bool,
    x: i32,
    y: i32,
) -> TouchAction {
    if !layout.sidebar_collapsed && x <= display.sidebar_width {
        if SETTINGS_BUTTON.contains_point(x, y) {
            return TouchAction::OpenSettings;
        }
        if HOME_BUTTON.contains_point(x, y) {
            return if onroad { TouchAction::CollapseToVisualization } else { TouchAction::OpenHome };
        }
    }

    if onroad && x >= layout.viz_rect.x - display.border && layout.active_app != ActiveApp::Settings {
        return if frontview { TouchAction::ExitDriverView } else { TouchAction::ToggleSidebar };
    }

    TouchAction::Ignore
}

/// Apply a touch action to the layout. Returns `true` when the layout changed.
pub fn apply_touch(layout: &mut LayoutState, action: TouchAction) -> bool {
    let before = (layout.sidebar_collapsed, layout.active_app);
    match action {
        TouchAction::OpenSettings => layout.active_app = ActiveApp::Settings,
        TouchAction::OpenHome => layout.active_app = ActiveApp::Home,
        TouchAction::CollapseToVisualization => {
            layout.active_app = ActiveApp::None;
            layout.sidebar_collapsed = true;
        }
        TouchAction::ToggleSidebar => layout.sidebar_collapsed = !layout.sidebar_collapsed,
        TouchAction::ExitDriverView | TouchAction::Ignore => {}
    }
    before != (layout.sidebar_collapsed, layout.active_app)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display() -> DisplayConfig {
        DisplayConfig::default()
    }

    #[test]
    fn test_viz_rect_expanded_sidebar() {
        assert_eq!(viz_rect(&display(), false), Rect::new(310, 10, 1600, 1060));
    }

    #[test]
    fn test_viz_rect_collapsed_sidebar() {
        assert_eq!(viz_rect(&display(), true), Rect::new(10, 10, 1900, 1060));
    }

    #[test]
    fn test_viz_rect_stays_inside_tiny_display() {
        let tiny = DisplayConfig { width: 100, height: 40, sidebar_width: 300, border: 30 };
        let bounds = Rect::new(0, 0, tiny.width, tiny.height);
        for collapsed in [false, true] {
            assert!(bounds.contains_rect(&viz_rect(&tiny, collapsed)));
        }
    }

    #[test]
    fn test_touch_on_video_toggles_sidebar_onroad() {
        let mut layout = LayoutState {
            sidebar_collapsed: true,
            active_app: ActiveApp::None,
            viz_rect: viz_rect(&display(), true),
        };
        let action = classify_touch(&layout, &display(), true, false, 900, 500);
        assert_eq!(action, TouchAction::ToggleSidebar);
        assert!(apply_touch(&mut layout, action));
        assert!(!layout.sidebar_collapsed);
    }

    #[test]
    fn test_touch_on_home_button_depends_on_onroad() {
        let layout = LayoutState {
            sidebar_collapsed: false,
            active_app: ActiveApp::Home,
            viz_rect: viz_rect(&display(), false),
        };
        assert_eq!(classify_touch(&layout, &display(), false, false, 100, 900), TouchAction::OpenHome);
        assert_eq!(
            classify_touch(&layout, &display(), true, false, 100, 900),
            TouchAction::CollapseToVisualization
        );
    }

    #[test]
    fn test_touch_offroad_on_video_is_ignored() {
        let layout = LayoutState { viz_rect: viz_rect(&display(), false), ..LayoutState::default() };
        assert_eq!(classify_touch(&layout, &display(), false, false, 900, 500), TouchAction::Ignore);
    }
}
