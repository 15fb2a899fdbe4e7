use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

use crate::{
    config::WindowLimit,
    protocol::{ConnId, TrafficClass},
};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
    touched: Instant,
}

/// Fixed-window counters, one per connection and traffic class.
#[derive(Debug)]
pub struct RateLimiter {
    ordinary: WindowLimit,
    media: WindowLimit,
    stale_factor: u32,
    windows: HashMap<(ConnId, TrafficClass), Window>,
}

impl RateLimiter {
    pub fn new(ordinary: WindowLimit, media: WindowLimit, stale_factor: u32) -> Self {
        Self {
            ordinary,
            media,
            stale_factor: stale_factor.max(1),
            windows: HashMap::new(),
        }
    }

    fn limit(&self, class: TrafficClass) -> WindowLimit {
        match class {
            TrafficClass::Ordinary => self.ordinary,
            TrafficClass::Media => self.media,
        }
    }

    /// Counts one event. On rejection returns how long until the window resets.
    pub fn check(&mut self, handle: ConnId, class: TrafficClass, now: Instant) -> Result<(), Duration> {
        let limit = self.limit(class);
        let window = self.windows.entry((handle, class)).or_insert(Window {
            count: 0,
            started: now,
            touched: now,
        });

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= limit.window {
            window.count = 0;
            window.started = now;
        }
        window.count = window.count.saturating_add(1);
        window.touched = now;

        if window.count <= limit.max_events {
            Ok(())
        } else {
            Err(limit.window.saturating_sub(now.saturating_duration_since(window.started)))
        }
    }

    pub fn allow(&mut self, handle: ConnId, is_media: bool, now: Instant) -> bool {
        let class = if is_media { TrafficClass::Media } else { TrafficClass::Ordinary };
        self.check(handle, class, now).is_ok()
    }

    pub fn forget(&mut self, handle: ConnId) {
        self.windows.remove(&(handle, TrafficClass::Ordinary));
        self.windows.remove(&(handle, TrafficClass::Media));
    }

    /// Drops windows nobody has touched for `stale_factor` window lengths.
    pub fn purge_stale(&mut self, now: Instant) -> usize {
        let (ordinary, media, factor) = (self.ordinary, self.media, self.stale_factor);
        let before = self.windows.len();
        self.windows.retain(|(_, class), window| {
            let limit = match class {
                TrafficClass::Ordinary => ordinary,
                TrafficClass::Media => media,
            };
            now.saturating_duration_since(window.touched) < limit.window.saturating_mul(factor)
        });
        before - self.windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
