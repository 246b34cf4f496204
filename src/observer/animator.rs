use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::ring::Point;

/// Default number of events kept alive at once.
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Requests moving between nodes.
    Transfer,
    /// Anti-entropy synchronization.
    Sync,
    /// Cleanup of entries a node no longer owns.
    Cleanup,
}

/// How long an event of some category lives, how long it spends fading out
/// at the end, and how heavy it is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub ttl: Duration,
    pub fade: Duration,
    pub weight: f64,
}

/// Category to style mapping. It belongs to whoever draws the events and is
/// handed to the engine through configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleTable {
    pub transfer: Style,
    pub sync: Style,
    pub cleanup: Style,
}

impl StyleTable {
    pub fn get(&self, category: Category) -> &Style {
        match category {
            Category::Transfer => &self.transfer,
            Category::Sync => &self.sync,
            Category::Cleanup => &self.cleanup,
        }
    }
}

impl Default for StyleTable {
    fn default() -> Self {
        Self {
            transfer: Style {
                ttl: Duration::from_millis(500),
                fade: Duration::from_millis(300),
                weight: 1.,
            },
            sync: Style {
                ttl: Duration::from_millis(2000),
                fade: Duration::from_millis(500),
                weight: 3.,
            },
            cleanup: Style {
                ttl: Duration::from_millis(2000),
                fade: Duration::from_millis(500),
                weight: 3.,
            },
        }
    }
}

/// A transient line (or curve, when `control` is set) between two points on
/// the ring.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationEvent {
    pub source: Point,
    pub destination: Point,
    pub control: Option<Point>,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub fade: Duration,
    pub category: Category,
    pub weight: f64,
}

impl AnimationEvent {
    pub fn new(
        category: Category,
        style: &Style,
        source: Point,
        destination: Point,
        control: Option<Point>,
        now: Instant,
    ) -> Self {
        Self {
            source,
            destination,
            control,
            created_at: now,
            expires_at: now + style.ttl,
            fade: style.fade.min(style.ttl),
            category,
            weight: style.weight,
        }
    }

    pub fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }

    /// Opacity at `now`: one until the final fade window, then falling
    /// linearly to zero at expiry.
    pub fn alpha(&self, now: Instant) -> f64 {
        let remaining = self.expires_at.saturating_duration_since(now);
        if self.fade.is_zero() || remaining >= self.fade {
            return 1.;
        }
        remaining.as_secs_f64() / self.fade.as_secs_f64()
    }
}

/// An event that is still alive at a tick, with its opacity at that tick.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEvent {
    pub event: AnimationEvent,
    pub alpha: f64,
}

/// Bounded queue of animation events. Once full, new events are dropped and
/// older ones are left to expire.
#[derive(Debug)]
pub struct EventAnimator {
    events: Vec<AnimationEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventAnimator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Queues `event` unless the queue is full. Returns whether it was kept.
    pub fn enqueue(&mut self, event: AnimationEvent) -> bool {
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            trace!(category = ?event.category, dropped = self.dropped, "animation queue full, dropping event");
            return false;
        }
        self.events.push(event);
        true
    }

    /// Forgets expired events and returns the live ones with their opacity.
    pub fn tick(&mut self, now: Instant) -> Vec<LiveEvent> {
        let before = self.events.len();
        self.events.retain(|event| event.is_live(now));
        if self.events.len() < before {
            trace!(expired = before - self.events.len(), live = self.events.len(), "expired animation events");
        }
        self.events
            .iter()
            .map(|event| LiveEvent {
                event: event.clone(),
                alpha: event.alpha(now),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events turned away because the queue was full, since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for EventAnimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(style: &Style, x: f64, now: Instant) -> AnimationEvent {
        AnimationEvent::new(
            Category::Transfer,
            style,
            Point::from(x, 0.),
            Point::from(0., x),
            None,
            now,
        )
    }

    #[test]
    fn fades_then_expires() {
        let styles = StyleTable::default();
        let t0 = Instant::now();
        let mut animator = EventAnimator::new();
        assert!(animator.enqueue(event(&styles.transfer, 1., t0)));

        let live = animator.tick(t0 + Duration::from_millis(100));
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].alpha, 1.);

        let live = animator.tick(t0 + Duration::from_millis(400));
        assert_eq!(live.len(), 1);
        assert!(live[0].alpha < 1.);
        assert!((live[0].alpha - 1. / 3.).abs() < 1e-9);

        let live = animator.tick(t0 + Duration::from_millis(600));
        assert!(live.is_empty());
        assert!(animator.is_empty());
    }

    #[test]
    fn expires_exactly_at_deadline() {
        let styles = StyleTable::default();
        let t0 = Instant::now();
        let mut animator = EventAnimator::new();
        animator.enqueue(event(&styles.transfer, 1., t0));
        assert!(animator.tick(t0 + styles.transfer.ttl).is_empty());
    }

    #[test]
    fn drops_newest_when_full() {
        let styles = StyleTable::default();
        let t0 = Instant::now();
        let mut animator = EventAnimator::new();
        let accepted = (0..60)
            .filter(|i| animator.enqueue(event(&styles.sync, *i as f64, t0)))
            .count();
        assert_eq!(accepted, 50);
        assert_eq!(animator.len(), 50);
        assert_eq!(animator.dropped(), 10);

        let live = animator.tick(t0);
        let kept: Vec<f64> = live.iter().map(|l| l.event.source.x).collect();
        let first: Vec<f64> = (0..50).map(|i| i as f64).collect();
        assert_eq!(kept, first);
    }

    #[test]
    fn room_frees_up_after_expiry() {
        let styles = StyleTable::default();
        let t0 = Instant::now();
        let mut animator = EventAnimator::with_capacity(1);
        assert!(animator.enqueue(event(&styles.transfer, 1., t0)));
        assert!(!animator.enqueue(event(&styles.transfer, 2., t0)));

        let later = t0 + Duration::from_secs(1);
        animator.tick(later);
        assert!(animator.enqueue(event(&styles.transfer, 3., later)));
    }

    #[test]
    fn fade_is_clamped_to_ttl() {
        let style = Style {
            ttl: Duration::from_millis(100),
            fade: Duration::from_millis(400),
            weight: 2.,
        };
        let t0 = Instant::now();
        let event = event(&style, 1., t0);
        assert_eq!(event.fade, style.ttl);
        assert!((event.alpha(t0 + Duration::from_millis(50)) - 0.5).abs() < 1e-9);
        assert_eq!(event.weight, 2.);
    }
}
