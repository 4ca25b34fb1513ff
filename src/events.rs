//! In-process typed publish/subscribe.
//!
//! Delivery is synchronous on the publishing thread, in registration order.
//! The subscriber list is copied before delivery, so handlers may subscribe
//! or unsubscribe (themselves included) while an event is in flight.

use std::any::{Any, TypeId};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::display::DisplayId;
use crate::surface::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    event_type: TypeId,
    handler: Handler,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: Any + Send + Sync,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler = Arc::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(event);
            }
        });
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                event_type: TypeId::of::<E>(),
                handler,
            });
        id
    }

    /// Like [`EventBus::subscribe`], but the subscription ends when the
    /// returned handle drops.
    pub fn subscribe_scoped<E, F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        E: Any + Send + Sync,
        F: Fn(&E) + Send + Sync + 'static,
    {
        Subscription {
            bus: Arc::downgrade(self),
            id: self.subscribe(handler),
        }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Delivers `event` to every current subscriber of `E`. Returns how many
    /// handlers ran.
    pub fn publish<E>(&self, event: E) -> usize
    where
        E: Any + Send + Sync,
    {
        let event_type = TypeId::of::<E>();
        let handlers: Vec<Handler> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.event_type == event_type)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        tracing::trace!(
            event = std::any::type_name::<E>(),
            subscribers = handlers.len(),
            "publishing event"
        );
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    pub fn subscriber_count<E: Any>(&self) -> usize {
        let event_type = TypeId::of::<E>();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Unsubscribes on drop.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeSide {
    Left,
    Top,
    Right,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewMode {
    Show,
    Hide,
    Toggle,
    /// Show every frame so the user can pick one.
    ShowForSelection,
}

/// Drag handle moved the frame by a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMoved {
    pub surface: SurfaceId,
    pub dx: i32,
    pub dy: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMoveFinished {
    pub surface: SurfaceId,
}

/// Resize handle on `side` dragged by `velocity` pixels; `is_up` marks the
/// final event of the gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameResized {
    pub surface: SurfaceId,
    pub side: ResizeSide,
    pub velocity: i32,
    pub is_up: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameResizeFinished {
    pub surface: SurfaceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAttachmentChanged {
    pub surface: SurfaceId,
    pub attached: bool,
}

/// Answer to a "remove this frame?" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveFrameConfirmed {
    pub confirmed: bool,
    pub surface: Option<SurfaceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CenterFrame {
    pub surface: SurfaceId,
    pub axis: Axis,
}

/// Touch down/up on the frame; the surface keeps the screen awake while down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIntercept {
    pub surface: SurfaceId,
    pub down: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempHide {
    pub surface: SurfaceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewFrames {
    pub show: PreviewMode,
    pub request_code: Option<i32>,
    pub include_main_frame: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSelected {
    pub surface: Option<SurfaceId>,
    pub request_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenDrawer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseDrawer;

/// Reported by the drawer surface when it appears or goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawerVisibilityChanged {
    pub open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenPowerChanged {
    pub display: DisplayId,
    pub on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockscreenDismissed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationCountChanged {
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugIdsUpdated {
    pub display: DisplayId,
    pub ids: Arc<BTreeSet<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn delivers_only_to_matching_type_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |event: &TempHide| {
                seen.lock().unwrap().push((tag, event.surface));
            });
        }
        let other = Arc::new(AtomicUsize::new(0));
        let other_count = Arc::clone(&other);
        bus.subscribe(move |_: &CloseDrawer| {
            other_count.fetch_add(1, Ordering::SeqCst);
        });

        let delivered = bus.publish(TempHide {
            surface: SurfaceId::MAIN,
        });
        assert_eq!(delivered, 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("first", SurfaceId::MAIN), ("second", SurfaceId::MAIN)]
        );
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_can_unsubscribe_itself_mid_delivery() {
        let bus = Arc::new(EventBus::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(Mutex::new(None::<SubscriptionId>));

        let bus_for_handler = Arc::downgrade(&bus);
        let own_id_for_handler = Arc::clone(&own_id);
        let calls_for_first = Arc::clone(&calls);
        let id = bus.subscribe(move |_: &CloseDrawer| {
            calls_for_first.fetch_add(1, Ordering::SeqCst);
            if let (Some(bus), Some(id)) = (bus_for_handler.upgrade(), *own_id_for_handler.lock().unwrap()) {
                bus.unsubscribe(id);
            }
        });
        *own_id.lock().unwrap() = Some(id);

        let calls_for_second = Arc::clone(&calls);
        bus.subscribe(move |_: &CloseDrawer| {
            calls_for_second.fetch_add(10, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(CloseDrawer), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        assert_eq!(bus.publish(CloseDrawer), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn subscribing_during_delivery_takes_effect_next_time() {
        let bus = Arc::new(EventBus::new());
        let weak = Arc::downgrade(&bus);
        bus.subscribe(move |_: &OpenDrawer| {
            if let Some(bus) = weak.upgrade() {
                bus.subscribe(|_: &OpenDrawer| {});
            }
        });
        assert_eq!(bus.publish(OpenDrawer), 1);
        assert_eq!(bus.subscriber_count::<OpenDrawer>(), 2);
    }

    #[test]
    fn scoped_subscription_ends_on_drop() {
        let bus = Arc::new(EventBus::new());
        let subscription = bus.subscribe_scoped(|_: &LockscreenDismissed| {});
        assert_eq!(bus.subscriber_count::<LockscreenDismissed>(), 1);
        drop(subscription);
        assert_eq!(bus.subscriber_count::<LockscreenDismissed>(), 0);
        assert_eq!(bus.publish(LockscreenDismissed), 0);
    }
}
