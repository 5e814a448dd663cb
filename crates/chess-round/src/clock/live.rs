//! Locally ticking live clock, corrected by authoritative server pushes.

use chess_core::Color;
use std::time::Duration;
use tracing::debug;

use super::{Clock, ClockEvent, ClockTimes};

/// Two live clocks ticking locally between server updates.
///
/// The server is always right: [`reconcile`](Self::reconcile) overwrites the
/// local values, compensating only for the transit delay of the message.
/// Local decay never declares a timeout on its own; it raises
/// [`ClockEvent::Flagged`] and stops ticking until the server speaks.
#[derive(Debug, Clone)]
pub struct ClockSyncEngine {
    remaining: [Duration; 2],
    initial: Duration,
    increment: Duration,
    emergency: Duration,
    running: Option<Color>,
    /// Whether the next drop below the emergency threshold should be reported.
    armed: [bool; 2],
    halted: bool,
}

impl ClockSyncEngine {
    /// Creates an engine from a snapshot clock. Nothing runs until told to.
    pub fn start(initial: &Clock) -> Self {
        let remaining = [initial.white, initial.black];
        ClockSyncEngine {
            remaining,
            initial: initial.initial,
            increment: initial.increment,
            emergency: initial.emerg,
            running: None,
            armed: remaining.map(|r| r >= initial.emerg),
            halted: false,
        }
    }

    pub fn remaining(&self, color: Color) -> Duration {
        self.remaining[color.index()]
    }

    pub fn running(&self) -> Option<Color> {
        self.running
    }

    pub fn increment(&self) -> Duration {
        self.increment
    }

    /// True while `color` is below the emergency threshold.
    pub fn is_emergency(&self, color: Color) -> bool {
        self.remaining(color) < self.emergency
    }

    /// True once a running clock hit zero and local ticking stopped.
    pub fn is_flagged(&self) -> bool {
        self.halted
    }

    pub fn run(&mut self, color: Color) {
        self.running = Some(color);
    }

    pub fn pause(&mut self) {
        self.running = None;
    }

    /// Decrements the running side by `elapsed`, saturating at zero.
    pub fn tick(&mut self, elapsed: Duration) -> Vec<ClockEvent> {
        let mut events = Vec::new();
        let Some(color) = self.running else {
            return events;
        };
        if self.halted {
            return events;
        }

        let slot = &mut self.remaining[color.index()];
        *slot = slot.saturating_sub(elapsed);
        self.check_emergency(color, &mut events);
        self.check_flag(&mut events);
        events
    }

    /// Adopts the server clock. The side the message says is running has
    /// half the round trip taken off, since that much time passed while the
    /// message was in flight.
    pub fn reconcile(&mut self, server: &Clock, turn: Color, round_trip: Duration) -> Vec<ClockEvent> {
        self.initial = server.initial;
        self.increment = server.increment;
        self.emergency = server.emerg;
        let times = ClockTimes {
            white: server.white,
            black: server.black,
        };
        self.reconcile_times(&times, server.running.then_some(turn), round_trip)
    }

    /// Same as [`reconcile`](Self::reconcile) for pushes that only carry
    /// remaining times; `running` is the side the push implies is to move.
    pub fn reconcile_times(
        &mut self,
        times: &ClockTimes,
        running: Option<Color>,
        round_trip: Duration,
    ) -> Vec<ClockEvent> {
        let halted_color = if self.halted { self.running } else { None };
        let compensation = round_trip / 2;
        for color in Color::BOTH {
            let mut value = times.get(color);
            if running == Some(color) {
                value = value.saturating_sub(compensation);
            }
            let previous = self.remaining(color);
            if value > previous.saturating_add(self.increment) {
                debug!(
                    %color,
                    previous_ms = previous.as_millis() as u64,
                    server_ms = value.as_millis() as u64,
                    "clock jumped forward"
                );
            }
            self.remaining[color.index()] = value;
        }
        self.running = running;

        self.halted = false;
        let mut events = Vec::new();
        for color in Color::BOTH {
            self.check_emergency(color, &mut events);
        }
        match (halted_color, self.running) {
            // Already reported; only a positive correction resumes ticking.
            (Some(flagged), Some(running)) if flagged == running && self.remaining(running).is_zero() => {
                self.halted = true;
            }
            _ => self.check_flag(&mut events),
        }
        events
    }

    /// Credits the increment to `mover` and hands the move to the opponent.
    pub fn on_move_applied(&mut self, mover: Color) {
        let slot = &mut self.remaining[mover.index()];
        *slot = slot.saturating_add(self.increment);
        self.running = Some(mover.opposite());
        self.halted = false;
        let mut ignored = Vec::new();
        self.check_emergency(mover, &mut ignored);
    }

    /// Current values in wire form.
    pub fn snapshot(&self) -> Clock {
        Clock {
            white: self.remaining(Color::White),
            black: self.remaining(Color::Black),
            emerg: self.emergency,
            running: self.running.is_some(),
            initial: self.initial,
            increment: self.increment,
        }
    }

    fn check_emergency(&mut self, color: Color, events: &mut Vec<ClockEvent>) {
        let i = color.index();
        if self.remaining[i] >= self.emergency {
            self.armed[i] = true;
        } else if self.armed[i] {
            self.armed[i] = false;
            events.push(ClockEvent::Emergency(color));
        }
    }

    fn check_flag(&mut self, events: &mut Vec<ClockEvent>) {
        if let Some(color) = self.running {
            if self.remaining(color).is_zero() && !self.halted {
                self.halted = true;
                events.push(ClockEvent::Flagged(color));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clock(white_ms: u64, black_ms: u64, increment_ms: u64) -> Clock {
        Clock {
            white: Duration::from_millis(white_ms),
            black: Duration::from_millis(black_ms),
            emerg: Duration::from_millis(1_000),
            running: false,
            initial: Duration::from_millis(white_ms),
            increment: Duration::from_millis(increment_ms),
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn start_is_not_running() {
        let mut engine = ClockSyncEngine::start(&clock(5_000, 5_000, 0));
        assert_eq!(engine.running(), None);
        assert!(engine.tick(ms(500)).is_empty());
        assert_eq!(engine.remaining(Color::White), ms(5_000));
    }

    #[test]
    fn tick_decrements_only_running_side() {
        let mut engine = ClockSyncEngine::start(&clock(5_000, 5_000, 0));
        engine.run(Color::Black);
        engine.tick(ms(250));
        engine.tick(ms(250));
        assert_eq!(engine.remaining(Color::Black), ms(4_500));
        assert_eq!(engine.remaining(Color::White), ms(5_000));
    }

    #[test]
    fn move_applies_increment_and_flips_running() {
        let mut engine = ClockSyncEngine::start(&clock(5_000, 5_000, 2_000));
        engine.run(Color::White);
        engine.on_move_applied(Color::White);
        assert_eq!(engine.remaining(Color::White), ms(7_000));
        assert_eq!(engine.running(), Some(Color::Black));
    }

    #[test]
    fn emergency_fires_once_per_crossing() {
        let mut engine = ClockSyncEngine::start(&clock(1_300, 5_000, 1_000));
        engine.run(Color::White);
        assert!(engine.tick(ms(200)).is_empty());
        assert_eq!(engine.tick(ms(200)), vec![ClockEvent::Emergency(Color::White)]);
        assert!(engine.tick(ms(200)).is_empty());
        assert!(engine.is_emergency(Color::White));

        // Increment lifts white back above the threshold and re-arms it.
        engine.on_move_applied(Color::White);
        engine.on_move_applied(Color::Black);
        assert_eq!(engine.remaining(Color::White), ms(1_700));
        assert_eq!(engine.tick(ms(800)), vec![ClockEvent::Emergency(Color::White)]);
    }

    #[test]
    fn flag_stops_local_ticking() {
        let mut engine = ClockSyncEngine::start(&clock(300, 5_000, 0));
        engine.run(Color::White);
        // Started below the threshold, so there is no crossing to report.
        assert_eq!(engine.tick(ms(500)), vec![ClockEvent::Flagged(Color::White)]);
        assert!(engine.is_flagged());
        assert_eq!(engine.remaining(Color::White), Duration::ZERO);
        assert!(engine.tick(ms(500)).is_empty());
    }

    #[test]
    fn reconcile_overrides_local_drift() {
        let mut engine = ClockSyncEngine::start(&clock(60_000, 60_000, 0));
        engine.run(Color::White);
        for _ in 0..37 {
            engine.tick(ms(130));
        }

        let mut server = clock(58_000, 59_000, 0);
        server.running = true;
        engine.reconcile(&server, Color::White, ms(300));
        assert_eq!(engine.remaining(Color::White), ms(57_850));
        assert_eq!(engine.remaining(Color::Black), ms(59_000));
        assert_eq!(engine.running(), Some(Color::White));
    }

    #[test]
    fn reconcile_takes_running_from_message() {
        let mut engine = ClockSyncEngine::start(&clock(60_000, 60_000, 0));
        engine.run(Color::White);
        engine.reconcile(&clock(50_000, 50_000, 0), Color::White, ms(100));
        assert_eq!(engine.running(), None);
        assert_eq!(engine.remaining(Color::White), ms(50_000));
    }

    #[test]
    fn reconcile_accepts_forward_jump() {
        let mut engine = ClockSyncEngine::start(&clock(10_000, 10_000, 0));
        let times = ClockTimes {
            white: ms(40_000),
            black: ms(10_000),
        };
        engine.reconcile_times(&times, Some(Color::Black), Duration::ZERO);
        assert_eq!(engine.remaining(Color::White), ms(40_000));
    }

    #[test]
    fn positive_correction_revives_flagged_clock() {
        let mut engine = ClockSyncEngine::start(&clock(100, 5_000, 0));
        engine.run(Color::White);
        engine.tick(ms(200));
        assert!(engine.is_flagged());

        let times = ClockTimes {
            white: ms(2_000),
            black: ms(5_000),
        };
        engine.reconcile_times(&times, Some(Color::White), Duration::ZERO);
        assert!(!engine.is_flagged());
        engine.tick(ms(100));
        assert_eq!(engine.remaining(Color::White), ms(1_900));
    }

    #[test]
    fn zero_from_server_does_not_flag_twice() {
        let mut engine = ClockSyncEngine::start(&clock(100, 5_000, 0));
        engine.run(Color::White);
        assert!(engine.tick(ms(200)).contains(&ClockEvent::Flagged(Color::White)));

        let times = ClockTimes {
            white: Duration::ZERO,
            black: ms(5_000),
        };
        assert!(engine
            .reconcile_times(&times, Some(Color::White), Duration::ZERO)
            .is_empty());
        assert!(engine.is_flagged());
    }

    #[test]
    fn halted_clock_reports_other_side_reaching_zero() {
        let mut engine = ClockSyncEngine::start(&clock(100, 5_000, 0));
        engine.run(Color::White);
        assert_eq!(engine.tick(ms(200)), vec![ClockEvent::Flagged(Color::White)]);

        let times = ClockTimes {
            white: Duration::ZERO,
            black: Duration::ZERO,
        };
        let events = engine.reconcile_times(&times, Some(Color::Black), Duration::ZERO);
        assert!(events.contains(&ClockEvent::Flagged(Color::Black)));
        assert!(engine.is_flagged());
    }

    #[test]
    fn huge_server_values_saturate() {
        let mut server = clock(0, 0, 0);
        server.white = Duration::MAX;
        server.black = Duration::MAX;
        server.increment = Duration::MAX;
        let mut engine = ClockSyncEngine::start(&server);
        engine.reconcile(&server, Color::White, ms(100));
        engine.on_move_applied(Color::White);
        assert_eq!(engine.remaining(Color::White), Duration::MAX);
        assert_eq!(engine.running(), Some(Color::Black));
    }

    proptest! {
        #[test]
        fn tick_never_goes_below_zero(
            start in 0u64..10_000,
            ticks in proptest::collection::vec(0u64..2_000, 0..50),
        ) {
            let mut engine = ClockSyncEngine::start(&clock(start, start, 0));
            engine.run(Color::White);
            let mut expected = start;
            for t in ticks {
                engine.tick(ms(t));
                expected = expected.saturating_sub(t);
                prop_assert_eq!(engine.remaining(Color::White), ms(expected));
            }
        }

        #[test]
        fn reconcile_dominates_local_ticks(
            ticks in proptest::collection::vec(0u64..500, 0..40),
            white in 0u64..100_000,
            black in 0u64..100_000,
            round_trip in 0u64..2_000,
        ) {
            let mut engine = ClockSyncEngine::start(&clock(100_000, 100_000, 0));
            engine.run(Color::Black);
            for t in ticks {
                engine.tick(ms(t));
            }
            let mut server = clock(white, black, 0);
            server.running = true;
            engine.reconcile(&server, Color::Black, ms(round_trip));
            prop_assert_eq!(engine.remaining(Color::White), ms(white));
            prop_assert_eq!(engine.remaining(Color::Black), ms(black).saturating_sub(ms(round_trip) / 2));
        }
    }
}
