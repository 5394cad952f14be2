use chrono::{DateTime, Utc};

/// Source of "now" for rate-limit windows and token lifetimes
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    /// Frozen instant, used to keep tests inside a single rate-limit window
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }
}
