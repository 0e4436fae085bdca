use serde::Serialize;
use std::fmt;

/// One step of supervision. States that own a client carry it, so a client can
/// only be returned from `Ready`.
#[derive(Debug)]
pub enum State<C> {
    Start,
    ProbeSocket,
    QueryRunning(C),
    KillOutdated(C),
    SpawnNew,
    AwaitReady,
    Ready(C),
    Degraded,
    Aborted(AbortReason),
}

impl<C> State<C> {
    pub fn kind(&self) -> StateKind {
        match self {
            State::Start => StateKind::Start,
            State::ProbeSocket => StateKind::ProbeSocket,
            State::QueryRunning(_) => StateKind::QueryRunning,
            State::KillOutdated(_) => StateKind::KillOutdated,
            State::SpawnNew => StateKind::SpawnNew,
            State::AwaitReady => StateKind::AwaitReady,
            State::Ready(_) => StateKind::Ready,
            State::Degraded => StateKind::Degraded,
            State::Aborted(_) => StateKind::Aborted,
        }
    }

    /// The client and outcome of a terminal state, or the state itself when
    /// supervision has more steps to take.
    pub fn finish(self) -> Result<(Option<C>, Outcome), Self> {
        match self {
            State::Ready(client) => Ok((Some(client), Outcome::Ready)),
            State::Degraded => Ok((None, Outcome::Degraded)),
            State::Aborted(reason) => Ok((None, Outcome::Aborted(reason))),
            other => Err(other),
        }
    }
}

/// State names without payloads, recorded as the supervision trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Start,
    ProbeSocket,
    QueryRunning,
    KillOutdated,
    SpawnNew,
    AwaitReady,
    Ready,
    Degraded,
    Aborted,
}

/// Why supervision gave up on the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The database needs manual action
    IncompatibleStorage,
    /// A socket exists but nothing usable answers on it
    Unresponsive,
    /// An outdated daemon would not report its pid
    PidUnavailable,
    /// An outdated daemon could not be killed
    KillFailed,
    /// No daemon came online within the wait budget
    TimedOut,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AbortReason::IncompatibleStorage => "database needs upgrade",
            AbortReason::Unresponsive => "daemon not responding",
            AbortReason::PidUnavailable => "outdated daemon pid unavailable",
            AbortReason::KillFailed => "outdated daemon could not be killed",
            AbortReason::TimedOut => "daemon did not come online",
        };
        f.write_str(text)
    }
}

/// Terminal result of one `ensure` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Ready,
    Degraded,
    Aborted(AbortReason),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready => f.write_str("ready"),
            Outcome::Degraded => f.write_str("degraded (no daemon configured)"),
            Outcome::Aborted(reason) => write!(f, "unavailable ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ready_degraded_and_aborted_finish() {
        let states: Vec<State<()>> = vec![
            State::Start,
            State::ProbeSocket,
            State::QueryRunning(()),
            State::KillOutdated(()),
            State::SpawnNew,
            State::AwaitReady,
        ];
        for state in states {
            let kind = state.kind();
            let back = state.finish().unwrap_err();
            assert_eq!(back.kind(), kind);
        }

        assert_eq!(State::Ready(7).finish().unwrap(), (Some(7), Outcome::Ready));
        assert_eq!(State::<u8>::Degraded.finish().unwrap(), (None, Outcome::Degraded));
        assert_eq!(
            State::<u8>::Aborted(AbortReason::TimedOut).finish().unwrap(),
            (None, Outcome::Aborted(AbortReason::TimedOut))
        );
    }

    #[test]
    fn kind_drops_payload() {
        assert_eq!(State::QueryRunning(42).kind(), StateKind::QueryRunning);
        assert_eq!(
            State::<u8>::Aborted(AbortReason::KillFailed).kind(),
            StateKind::Aborted
        );
    }

    #[test]
    fn outcome_serializes_with_reason() {
        let json = serde_json::to_string(&Outcome::Aborted(AbortReason::TimedOut)).unwrap();
        assert_eq!(json, r#"{"outcome":"aborted","reason":"timed_out"}"#);
        let json = serde_json::to_string(&Outcome::Ready).unwrap();
        assert_eq!(json, r#"{"outcome":"ready"}"#);
    }
}
