//! Daily trade time frame
//!
//! Converts quote time into the exchange's local clock and reports each
//! daily milestone once, in order: bell, cancel, go-neutral, close.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{CoreError, CoreResult};

/// One-shot session boundary signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Regular hours open
    BellHeard,
    /// Withdraw working entries
    Cancel,
    /// Flatten open positions
    GoNeutral,
    /// Regular hours close
    RhClose,
    /// Host requested a software reset
    SoftwareReset,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::BellHeard => write!(f, "BELL"),
            SessionEvent::Cancel => write!(f, "CANCEL"),
            SessionEvent::GoNeutral => write!(f, "GO_NEUTRAL"),
            SessionEvent::RhClose => write!(f, "RH_CLOSE"),
            SessionEvent::SoftwareReset => write!(f, "SOFTWARE_RESET"),
        }
    }
}

/// Result of advancing the schedule to a timestamp
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTick {
    pub events: Vec<SessionEvent>,
    pub in_regular_hours: bool,
}

#[derive(Debug, Clone)]
pub struct SessionSchedule {
    tz: Tz,
    milestones: [(NaiveTime, SessionEvent); 4],
    bell: NaiveTime,
    close: NaiveTime,
    day: Option<NaiveDate>,
    /// Index of the next milestone for `day`
    next: usize,
}

impl SessionSchedule {
    pub fn new(config: &SessionConfig) -> CoreResult<Self> {
        config.validate()?;
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|_| CoreError::UnknownTimezone(config.timezone.clone()))?;

        Ok(Self {
            tz,
            milestones: [
                (config.bell, SessionEvent::BellHeard),
                (config.cancel, SessionEvent::Cancel),
                (config.go_neutral, SessionEvent::GoNeutral),
                (config.close, SessionEvent::RhClose),
            ],
            bell: config.bell,
            close: config.close,
            day: None,
            next: 0,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Report milestones crossed since the previous call.
    ///
    /// A day first seen after its close produces no events.
    pub fn advance(&mut self, timestamp: DateTime<Utc>) -> SessionTick {
        let local = timestamp.with_timezone(&self.tz);
        let date = local.date_naive();
        let time = local.time();

        if self.day != Some(date) {
            self.day = Some(date);
            self.next = if time >= self.close { self.milestones.len() } else { 0 };
            debug!("Session day {} starts at {}", date, time);
        }

        let mut events = Vec::new();
        while let Some((at, event)) = self.milestones.get(self.next) {
            if time < *at {
                break;
            }
            events.push(*event);
            self.next += 1;
        }

        SessionTick {
            events,
            in_regular_hours: time >= self.bell && time < self.close,
        }
    }
}
