use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState<'a> {
    Idle,
    Tracking(&'a str),
}

/// What a flush at a given instant has to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushPlan {
    /// Nothing is tracked.
    Idle,
    /// Less than a second has passed. The remainder stays in the window.
    Carry,
    /// The clock went backwards. Nothing is credited and the window restarts.
    Restart { at: DateTime<Utc> },
    Credit {
        rule: Arc<str>,
        seconds: u64,
        /// New start of the window once the credit is stored.
        advance_to: DateTime<Utc>,
        /// The window was longer than the allowed maximum and got cut.
        capped: bool,
    },
}

/// Transient state of the tracker. `window_start` is the last instant up to which time has been
/// accounted for `current_rule`.
#[derive(Debug, Clone)]
pub struct Session {
    current_rule: Option<Arc<str>>,
    window_start: DateTime<Utc>,
}

impl Session {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current_rule: None,
            window_start: now,
        }
    }

    pub fn state(&self) -> TrackingState<'_> {
        match &self.current_rule {
            Some(rule) => TrackingState::Tracking(rule),
            None => TrackingState::Idle,
        }
    }

    pub fn current_rule(&self) -> Option<&Arc<str>> {
        self.current_rule.as_ref()
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn is_tracking(&self, rule: Option<&str>) -> bool {
        self.current_rule.as_deref() == rule
    }

    /// Starts a fresh window for `rule`. The previous window must have been flushed already.
    pub fn switch_to(&mut self, rule: Option<Arc<str>>, now: DateTime<Utc>) {
        self.current_rule = rule;
        self.window_start = now;
    }

    pub fn advance_to(&mut self, instant: DateTime<Utc>) {
        self.window_start = instant;
    }

    pub fn plan_flush(&self, now: DateTime<Utc>, max_flush: Duration) -> FlushPlan {
        let Some(rule) = &self.current_rule else {
            return FlushPlan::Idle;
        };
        let elapsed = now - self.window_start;
        if elapsed < Duration::zero() {
            return FlushPlan::Restart { at: now };
        }
        let seconds = elapsed.num_seconds();
        if seconds == 0 {
            return FlushPlan::Carry;
        }
        if elapsed > max_flush {
            return FlushPlan::Credit {
                rule: rule.clone(),
                seconds: max_flush.num_seconds().unsigned_abs(),
                advance_to: now,
                capped: true,
            };
        }
        FlushPlan::Credit {
            rule: rule.clone(),
            seconds: seconds.unsigned_abs(),
            advance_to: self.window_start + Duration::seconds(seconds),
            capped: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::utils::clock::test_clock::TEST_START_DATE;

    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    fn tracking(rule: &str) -> Session {
        let mut session = Session::new(start());
        session.switch_to(Some(rule.into()), start());
        session
    }

    #[test]
    fn test_idle_session_has_nothing_to_flush() {
        let session = Session::new(start());

        assert_eq!(session.state(), TrackingState::Idle);
        assert_eq!(
            session.plan_flush(start() + Duration::hours(1), Duration::minutes(15)),
            FlushPlan::Idle
        );
    }

    #[test]
    fn test_credit_keeps_fractional_remainder() {
        let session = tracking("github.com");

        let plan = session.plan_flush(start() + Duration::milliseconds(12_700), Duration::minutes(15));

        assert_eq!(
            plan,
            FlushPlan::Credit {
                rule: "github.com".into(),
                seconds: 12,
                advance_to: start() + Duration::seconds(12),
                capped: false,
            }
        );
    }

    #[test]
    fn test_sub_second_and_backwards_clock() {
        let session = tracking("github.com");

        assert_eq!(
            session.plan_flush(start() + Duration::milliseconds(999), Duration::minutes(15)),
            FlushPlan::Carry
        );
        let earlier = start() - Duration::seconds(3);
        assert_eq!(
            session.plan_flush(earlier, Duration::minutes(15)),
            FlushPlan::Restart { at: earlier }
        );
    }

    #[test]
    fn test_long_gap_is_capped() {
        let session = tracking("github.com");
        let now = start() + Duration::days(3);

        assert_eq!(
            session.plan_flush(now, Duration::minutes(15)),
            FlushPlan::Credit {
                rule: "github.com".into(),
                seconds: 900,
                advance_to: now,
                capped: true,
            }
        );
    }

    #[test]
    fn test_switch_restarts_window() {
        let mut session = tracking("github.com");
        let later = start() + Duration::seconds(7);

        session.switch_to(Some("jira.com".into()), later);

        assert_eq!(session.state(), TrackingState::Tracking("jira.com"));
        assert!(session.is_tracking(Some("jira.com")));
        assert_eq!(session.window_start(), later);
    }
}
