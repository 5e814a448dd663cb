//! Day-scale correspondence clock.
//!
//! There is no background timer: remaining time is recomputed lazily from
//! the last server values, the instant they were received, the instant of
//! the last move, and the wall clock.

use chess_core::Color;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::{ClockEvent, ClockTimes, CorrespondenceClock};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CorrespondenceClockModel {
    /// Remaining time as of `synced_at`.
    base: [Duration; 2],
    synced_at: DateTime<Utc>,
    moved_at: DateTime<Utc>,
    turn: Option<Color>,
    days_per_turn: u32,
    bar_time: Duration,
    emergency: Duration,
    increment: Duration,
    armed: [bool; 2],
    flagged: bool,
}

impl CorrespondenceClockModel {
    /// Creates a model from snapshot values received at `now`.
    ///
    /// The instant of the last move is unknown here, so the bar is treated
    /// as already elapsed.
    pub fn start(clock: &CorrespondenceClock, now: DateTime<Utc>) -> Self {
        let base = [clock.white, clock.black];
        CorrespondenceClockModel {
            base,
            synced_at: now,
            moved_at: before(now, clock.bar_time),
            turn: None,
            days_per_turn: clock.days_per_turn,
            bar_time: clock.bar_time,
            emergency: clock.emerg,
            increment: clock.increment,
            armed: base.map(|r| r >= clock.emerg),
            flagged: false,
        }
    }

    pub fn turn(&self) -> Option<Color> {
        self.turn
    }

    /// Remaining time for `color` at wall-clock `now`.
    pub fn remaining_at(&self, color: Color, now: DateTime<Utc>) -> Duration {
        let base = self.base[color.index()];
        if self.turn != Some(color) {
            return base;
        }
        let decay_from = self.synced_at.max(after(self.moved_at, self.bar_time));
        let elapsed = (now - decay_from).to_std().unwrap_or(Duration::ZERO);
        base.saturating_sub(elapsed)
    }

    /// Remaining time in whole days, for display.
    pub fn days_left(&self, color: Color, now: DateTime<Utc>) -> u64 {
        self.remaining_at(color, now).as_secs() / DAY.as_secs()
    }

    pub fn reconcile(
        &mut self,
        server: &CorrespondenceClock,
        turn: Option<Color>,
        round_trip: Duration,
        now: DateTime<Utc>,
    ) -> Vec<ClockEvent> {
        self.days_per_turn = server.days_per_turn;
        self.bar_time = server.bar_time;
        self.emergency = server.emerg;
        self.increment = server.increment;
        let times = ClockTimes {
            white: server.white,
            black: server.black,
        };
        self.reconcile_times(&times, turn, round_trip, now)
    }

    /// Adopts server values. They were measured half a round trip before
    /// `now`, so the sync instant is moved back by that much.
    pub fn reconcile_times(
        &mut self,
        times: &ClockTimes,
        turn: Option<Color>,
        round_trip: Duration,
        now: DateTime<Utc>,
    ) -> Vec<ClockEvent> {
        self.base = [times.white, times.black];
        self.synced_at = before(now, round_trip / 2);
        self.turn = turn;
        self.flagged = false;
        self.poll(now)
    }

    /// Credits the increment to `mover`, capped at `days_per_turn` days,
    /// and starts the bar for the opponent.
    pub fn on_move_applied(&mut self, mover: Color, now: DateTime<Utc>) {
        let mut spent = self.remaining_at(mover, now).saturating_add(self.increment);
        if self.days_per_turn > 0 {
            spent = spent.min(DAY * self.days_per_turn);
        }
        let opponent = mover.opposite();
        self.base[opponent.index()] = self.remaining_at(opponent, now);
        self.base[mover.index()] = spent;
        self.turn = Some(opponent);
        self.synced_at = now;
        self.moved_at = now;
        self.flagged = false;
        if spent >= self.emergency {
            self.armed[mover.index()] = true;
        }
    }

    /// Freezes both sides at their value as of `now`.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        self.base = Color::BOTH.map(|c| self.remaining_at(c, now));
        self.synced_at = now;
        self.turn = None;
    }

    /// Reports emergency crossings and flagging as of `now`.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<ClockEvent> {
        let mut events = Vec::new();
        for color in Color::BOTH {
            let i = color.index();
            let remaining = self.remaining_at(color, now);
            if remaining >= self.emergency {
                self.armed[i] = true;
            } else if self.armed[i] {
                self.armed[i] = false;
                events.push(ClockEvent::Emergency(color));
            }
            if self.turn == Some(color) && remaining.is_zero() && !self.flagged {
                self.flagged = true;
                events.push(ClockEvent::Flagged(color));
            }
        }
        events
    }

    /// Current values in wire form.
    pub fn snapshot(&self, now: DateTime<Utc>) -> CorrespondenceClock {
        CorrespondenceClock {
            white: self.remaining_at(Color::White, now),
            black: self.remaining_at(Color::Black, now),
            days_per_turn: self.days_per_turn,
            bar_time: self.bar_time,
            emerg: self.emergency,
            increment: self.increment,
        }
    }
}

fn after(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| t.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn before(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| t.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(hours)
    }

    fn hours(n: u64) -> Duration {
        Duration::from_secs(n * 3600)
    }

    fn two_day_clock() -> CorrespondenceClock {
        CorrespondenceClock {
            white: DAY * 2,
            black: DAY * 2,
            days_per_turn: 2,
            bar_time: hours(1),
            emerg: hours(12),
            increment: Duration::ZERO,
        }
    }

    #[test]
    fn idle_until_turn_is_known() {
        let model = CorrespondenceClockModel::start(&two_day_clock(), at(0));
        assert_eq!(model.remaining_at(Color::White, at(30)), DAY * 2);
        assert_eq!(model.days_left(Color::White, at(30)), 2);
    }

    #[test]
    fn bar_time_delays_decay_after_a_move() {
        let mut model = CorrespondenceClockModel::start(&two_day_clock(), at(0));
        model.on_move_applied(Color::White, at(0));
        assert_eq!(model.turn(), Some(Color::Black));

        // Inside the bar nothing is spent.
        assert_eq!(model.remaining_at(Color::Black, at(1)), DAY * 2);
        // Afterwards decay counts only from the end of the bar.
        assert_eq!(model.remaining_at(Color::Black, at(25)), DAY * 2 - hours(24));
        assert_eq!(model.days_left(Color::Black, at(25)), 1);
        assert_eq!(model.remaining_at(Color::White, at(25)), DAY * 2);
    }

    #[test]
    fn snapshot_decay_starts_immediately() {
        let mut model = CorrespondenceClockModel::start(&two_day_clock(), at(0));
        model.reconcile(&two_day_clock(), Some(Color::White), Duration::ZERO, at(0));
        assert_eq!(model.remaining_at(Color::White, at(6)), DAY * 2 - hours(6));
    }

    #[test]
    fn increment_is_capped_by_days_per_turn() {
        let mut clock = two_day_clock();
        clock.increment = DAY;
        let mut model = CorrespondenceClockModel::start(&clock, at(0));
        model.reconcile(&clock, Some(Color::White), Duration::ZERO, at(0));
        model.on_move_applied(Color::White, at(10));
        assert_eq!(model.remaining_at(Color::White, at(10)), DAY * 2);
    }

    #[test]
    fn reconcile_backdates_by_half_round_trip() {
        let mut model = CorrespondenceClockModel::start(&two_day_clock(), at(0));
        let times = ClockTimes {
            white: hours(20),
            black: hours(30),
        };
        model.reconcile_times(&times, Some(Color::Black), Duration::from_secs(4), at(5));
        assert_eq!(
            model.remaining_at(Color::Black, at(5)),
            hours(30) - Duration::from_secs(2)
        );
        assert_eq!(model.remaining_at(Color::White, at(5)), hours(20));
    }

    #[test]
    fn poll_reports_emergency_then_flag_once() {
        let mut model = CorrespondenceClockModel::start(&two_day_clock(), at(0));
        model.reconcile(&two_day_clock(), Some(Color::White), Duration::ZERO, at(0));
        assert!(model.poll(at(30)).is_empty());
        assert_eq!(model.poll(at(37)), vec![ClockEvent::Emergency(Color::White)]);
        assert!(model.poll(at(40)).is_empty());
        assert_eq!(model.poll(at(48)), vec![ClockEvent::Flagged(Color::White)]);
        assert!(model.poll(at(60)).is_empty());
    }

    #[test]
    fn uncapped_increment_saturates() {
        let mut clock = two_day_clock();
        clock.days_per_turn = 0;
        clock.white = Duration::MAX;
        clock.increment = Duration::MAX;
        let mut model = CorrespondenceClockModel::start(&clock, at(0));
        model.reconcile(&clock, Some(Color::White), Duration::ZERO, at(0));
        model.on_move_applied(Color::White, at(1));
        assert_eq!(model.remaining_at(Color::White, at(1)), Duration::MAX);
    }

    #[test]
    fn pause_freezes_values() {
        let mut model = CorrespondenceClockModel::start(&two_day_clock(), at(0));
        model.reconcile(&two_day_clock(), Some(Color::White), Duration::ZERO, at(0));
        model.pause(at(10));
        assert_eq!(model.remaining_at(Color::White, at(40)), DAY * 2 - hours(10));
        assert_eq!(model.snapshot(at(40)).white, DAY * 2 - hours(10));
    }
}
