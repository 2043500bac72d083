//! Job progress derived from the engine's execution message log.
//!
//! Progress is the share of terminal execution messages among all messages
//! seen so far for a job. The ratio can dip when the engine appends new
//! non-terminal messages, so [`ProgressAccumulator`] holds the high-water
//! mark and never reports a lower value than it already has.

/// Execution messages that mark a unit of work as finished.
pub const TERMINAL_EVENTS: &[&str] = &[
    "execution_cached",
    "executed",
    "execution_success",
    "execution_error",
    "execution_interrupted",
];

/// Whether `event` counts as a terminal execution message.
pub fn is_terminal_event(event: &str) -> bool {
    TERMINAL_EVENTS.contains(&event)
}

/// Terminal message count over total message count, clamped to `0.0..=1.0`.
///
/// Returns `0.0` when there are no messages yet.
pub fn message_ratio<'a, I>(events: I) -> f64
where
    I: IntoIterator<Item = &'a str>,
{
    let (terminal, total) = events.into_iter().fold((0usize, 0usize), |(t, n), e| {
        (t + usize::from(is_terminal_event(e)), n + 1)
    });

    if total == 0 {
        return 0.0;
    }
    (terminal as f64 / total as f64).clamp(0.0, 1.0)
}

/// Per-job progress tracker with monotonic output.
#[derive(Debug, Default, Clone)]
pub struct ProgressAccumulator {
    reported: f64,
}

impl ProgressAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the current message log into the tracker and return the value to
    /// report.
    pub fn update<'a, I>(&mut self, events: I) -> f64
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ratio = message_ratio(events);
        if ratio > self.reported {
            self.reported = ratio;
        }
        self.reported
    }

    /// Highest progress reported so far.
    pub fn current(&self) -> f64 {
        self.reported
    }
}
