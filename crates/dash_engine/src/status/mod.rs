//! # UI Status / Alert State Machine
//!
//! Derives one coarse display status per tick from session and telemetry
//! inputs and drives the alert blink timer. The timer advances once per
//! logical tick, so blinking follows the loop cadence, not the wall clock.

use crate::scene::{Alert, AlertStatus};

/// Coarse display status. Exactly one is active per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UiStatus {
    /// No drive session
    #[default]
    Offroad,
    /// Onroad, controls not engaged
    Disengaged,
    /// Controls engaged, lateral only
    Engaged,
    /// Controls engaged with longitudinal control
    EngagedLongitudinal,
    /// Alert asking for driver attention
    Warning,
    /// Critical alert
    Alert,
}

impl UiStatus {
    /// Rank in the conflict resolution order; higher wins
    pub const fn priority(self) -> u8 {
        match self {
            UiStatus::Offroad => 0,
            UiStatus::Disengaged => 1,
            UiStatus::Engaged | UiStatus::EngagedLongitudinal => 2,
            UiStatus::Warning => 3,
            UiStatus::Alert => 4,
        }
    }

    /// Whether the alert blink timer runs in this status
    pub const fn blinks(self) -> bool {
        matches!(self, UiStatus::Warning | UiStatus::Alert)
    }

    /// Whether controls are engaged
    pub const fn is_engaged(self) -> bool {
        matches!(self, UiStatus::Engaged | UiStatus::EngagedLongitudinal)
    }
}

/// Everything the status depends on
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusInputs {
    /// A drive session is active
    pub onroad: bool,
    /// Controls engaged
    pub engaged: bool,
    /// Longitudinal control available
    pub longitudinal_control: bool,
    /// An alert occupies the display
    pub alert_active: bool,
    /// Severity of that alert
    pub alert_status: AlertStatus,
    /// The alert asks for blinking
    pub alert_blinking: bool,
}

impl StatusInputs {
    /// Collect inputs from the session flags and the scene alert
    pub fn new(onroad: bool, engaged: bool, longitudinal_control: bool, alert: &Alert) -> Self {
        Self {
            onroad,
            engaged,
            longitudinal_control,
            alert_active: alert.is_active(),
            alert_status: alert.status,
            alert_blinking: alert.is_blinking(),
        }
    }
}

/// Resolve the status.
///
/// Offroad gates everything; then `Alert > Warning > Engaged(Longitudinal) > Disengaged`.
pub fn resolve(inputs: &StatusInputs) -> UiStatus {
    if !inputs.onroad {
        return UiStatus::Offroad;
    }
    if inputs.alert_active {
        match inputs.alert_status {
            AlertStatus::Critical => return UiStatus::Alert,
            AlertStatus::UserPrompt => return UiStatus::Warning,
            AlertStatus::Normal => {}
        }
    }
    match (inputs.engaged, inputs.longitudinal_control) {
        (true, true) => UiStatus::EngagedLongitudinal,
        (true, false) => UiStatus::Engaged,
        (false, _) => UiStatus::Disengaged,
    }
}

/// Alert text visibility toggled every `period` ticks
#[derive(Debug, Clone)]
pub struct AlertBlink {
    period: u32,
    counter: u32,
    visible: bool,
}

impl AlertBlink {
    /// Create a timer toggling every `period` ticks
    pub fn new(period: u32) -> Self {
        Self { period: period.max(1), counter: 0, visible: true }
    }

    /// Advance one tick
    pub fn tick(&mut self, blinking: bool) {
        if !blinking {
            self.reset();
            return;
        }
        self.counter += 1;
        if self.counter >= self.period {
            self.counter = 0;
            self.visible = !self.visible;
        }
    }

    /// Show the text and restart the period
    pub fn reset(&mut self) {
        self.counter = 0;
        self.visible = true;
    }

    /// Whether alert text is shown this tick
    pub fn visible(&self) -> bool {
        self.visible
    }
}

/// A status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    /// Previous status
    pub from: UiStatus,
    /// New status
    pub to: UiStatus,
}

impl StatusTransition {
    /// The machine just dropped to offroad
    pub fn entered_offroad(&self) -> bool {
        self.to == UiStatus::Offroad && self.from != UiStatus::Offroad
    }
}

/// The running state machine
#[derive(Debug, Clone)]
pub struct StatusMachine {
    status: UiStatus,
    blink: AlertBlink,
}

impl StatusMachine {
    /// Start offroad with the given blink period in ticks
    pub fn new(blink_period_ticks: u32) -> Self {
        Self { status: UiStatus::Offroad, blink: AlertBlink::new(blink_period_ticks) }
    }

    /// Advance one tick. Returns the transition, if the status changed.
    pub fn advance(&mut self, inputs: &StatusInputs) -> Option<StatusTransition> {
        let next = resolve(inputs);
        let transition = (next != self.status).then_some(StatusTransition { from: self.status, to: next });

        if let Some(t) = transition {
            log::debug!("Status {:?} -> {:?}", t.from, t.to);
            self.blink.reset();
        }
        self.status = next;
        self.blink.tick(next.blinks() && inputs.alert_blinking);

        transition
    }

    /// Current status
    pub fn status(&self) -> UiStatus {
        self.status
    }

    /// Whether alert text should be drawn this tick
    pub fn alert_visible(&self) -> bool {
        self.blink.visible()
    }

    /// Return to offroad, e.g. at session start or end
    pub fn reset(&mut self) {
        self.status = UiStatus::Offroad;
        self.blink.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn onroad() -> StatusInputs {
        StatusInputs { onroad: true, ..StatusInputs::default() }
    }

    #[test]
    fn test_engaged_without_longitudinal() {
        let inputs = StatusInputs { engaged: true, ..onroad() };
        assert_eq!(resolve(&inputs), UiStatus::Engaged);
    }

    #[test]
    fn test_engaged_with_longitudinal() {
        let inputs = StatusInputs { engaged: true, longitudinal_control: true, ..onroad() };
        assert_eq!(resolve(&inputs), UiStatus::EngagedLongitudinal);
    }

    #[test]
    fn test_inactive_alert_status_is_ignored() {
        let inputs = StatusInputs { alert_status: AlertStatus::Critical, ..onroad() };
        assert_eq!(resolve(&inputs), UiStatus::Disengaged);
    }

    #[test]
    fn test_blink_toggles_every_period() {
        let mut machine = StatusMachine::new(10);
        let inputs = StatusInputs {
            alert_active: true,
            alert_status: AlertStatus::Critical,
            alert_blinking: true,
            ..onroad()
        };

        let mut visibility = Vec::new();
        for _ in 0..30 {
            machine.advance(&inputs);
            visibility.push(machine.alert_visible());
        }
        assert!(visibility[..9].iter().all(|v| *v));
        assert!(visibility[9..19].iter().all(|v| !*v));
        assert!(visibility[19..29].iter().all(|v| *v));
    }

    #[test]
    fn test_no_blink_when_alert_is_steady() {
        let mut machine = StatusMachine::new(2);
        let inputs = StatusInputs { alert_active: true, alert_status: AlertStatus::UserPrompt, ..onroad() };
        for _ in 0..10 {
            machine.advance(&inputs);
            assert!(machine.alert_visible());
        }
        assert_eq!(machine.status(), UiStatus::Warning);
    }

    #[test]
    fn test_transition_reports_entering_offroad() {
        let mut machine = StatusMachine::new(10);
        machine.advance(&StatusInputs { engaged: true, ..onroad() });
        let t = machine.advance(&StatusInputs::default()).unwrap();
        assert!(t.entered_offroad());
        assert_eq!(t.from, UiStatus::Engaged);
        assert!(machine.advance(&StatusInputs::default()).is_none());
    }

    fn alert_status() -> impl Strategy<Value = AlertStatus> {
        prop_oneof![Just(AlertStatus::Normal), Just(AlertStatus::UserPrompt), Just(AlertStatus::Critical)]
    }

    fn inputs() -> impl Strategy<Value = StatusInputs> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), alert_status(), any::<bool>()).prop_map(
            |(onroad, engaged, longitudinal_control, alert_active, alert_status, alert_blinking)| StatusInputs {
                onroad,
                engaged,
                longitudinal_control,
                alert_active,
                alert_status,
                alert_blinking,
            },
        )
    }

    proptest! {
        #[test]
        fn prop_offroad_iff_not_onroad(inputs in inputs()) {
            prop_assert_eq!(resolve(&inputs) == UiStatus::Offroad, !inputs.onroad);
        }

        #[test]
        fn prop_critical_alert_dominates(inputs in inputs()) {
            let critical = StatusInputs { alert_active: true, alert_status: AlertStatus::Critical, ..inputs };
            if inputs.onroad {
                prop_assert_eq!(resolve(&critical), UiStatus::Alert);
            }
        }

        #[test]
        fn prop_alert_outranks_every_other_outcome(inputs in inputs()) {
            let status = resolve(&inputs);
            let critical = StatusInputs { alert_active: true, alert_status: AlertStatus::Critical, ..inputs };
            prop_assert!(resolve(&critical).priority() >= status.priority());
        }

        #[test]
        fn prop_machine_matches_resolver(seq in proptest::collection::vec(inputs(), 1..40)) {
            let mut machine = StatusMachine::new(10);
            for inputs in &seq {
                machine.advance(inputs);
                prop_assert_eq!(machine.status(), resolve(inputs));
            }
        }
    }
}
