//! Typed change notification with a scoped re-entrancy guard.
//!
//! Sources (series, tables) own a [`ChangeNotifier`] and expose it through
//! [`ChangeSource`]. Listeners receive a shared reference to the source after
//! each externally visible mutation. While a [`SuppressionGuard`] is alive the
//! source does not broadcast, which lets a table mutate its own members
//! without re-entering its change handler.

use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Receives change notifications from a source of type `S`.
///
/// Closures `FnMut(&S) + Send` implement this trait directly.
pub trait ChangeListener<S: ?Sized>: Send {
    fn on_changed(&mut self, source: &S);
}

impl<S: ?Sized, F> ChangeListener<S> for F
where
    F: FnMut(&S) + Send,
{
    fn on_changed(&mut self, source: &S) {
        self(source);
    }
}

/// Handle returned by listener registration, used for deregistration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(u64);

struct ListenerEntry<S: ?Sized> {
    id: ListenerId,
    listener: Box<dyn ChangeListener<S>>,
}

/// Listener registry plus the `propagate` flag of one source.
///
/// Cloning yields an empty registry: listeners belong to the instance they
/// were registered on.
pub struct ChangeNotifier<S: ?Sized> {
    listeners: Vec<ListenerEntry<S>>,
    next_id: u64,
    propagate: bool,
}

impl<S: ?Sized> ChangeNotifier<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
            propagate: true,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn ChangeListener<S>>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push(ListenerEntry { id, listener });
        id
    }

    /// Removes a listener. Returns `true` when it was registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        if let Some(position) = self.listeners.iter().position(|entry| entry.id == id) {
            self.listeners.remove(position);
            return true;
        }
        false
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_propagating(&self) -> bool {
        self.propagate
    }
}

impl<S: ?Sized> Default for ChangeNotifier<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> Clone for ChangeNotifier<S> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<S: ?Sized> fmt::Debug for ChangeNotifier<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listeners.len())
            .field("propagate", &self.propagate)
            .finish()
    }
}

/// A value that owns a [`ChangeNotifier`] addressed to itself.
pub trait ChangeSource: Sized {
    fn notifier(&self) -> &ChangeNotifier<Self>;
    fn notifier_mut(&mut self) -> &mut ChangeNotifier<Self>;

    /// Broadcasts a change to every listener unless notifications are
    /// currently suppressed. Returns `true` when the broadcast happened.
    fn fire_changed(&mut self) -> bool {
        if !self.notifier().propagate {
            trace!("change notification suppressed");
            return false;
        }

        // Listeners only see `&Self`, so none can be added or removed while
        // the registry is detached.
        let listeners = std::mem::take(&mut self.notifier_mut().listeners);
        let mut dispatch = DetachedListeners {
            source: self,
            listeners,
        };
        let DetachedListeners { source, listeners } = &mut dispatch;
        for entry in listeners.iter_mut() {
            entry.listener.on_changed(&**source);
        }
        true
    }

    /// Suppresses broadcasts until the returned guard is dropped.
    fn suppress_events(&mut self) -> SuppressionGuard<'_, Self> {
        SuppressionGuard::new(self)
    }
}

/// Registry taken out of a source for one broadcast. Dropping it puts the
/// listeners back, also when a listener panics.
struct DetachedListeners<'a, S: ChangeSource> {
    source: &'a mut S,
    listeners: Vec<ListenerEntry<S>>,
}

impl<S: ChangeSource> Drop for DetachedListeners<'_, S> {
    fn drop(&mut self) {
        self.source.notifier_mut().listeners = std::mem::take(&mut self.listeners);
    }
}

/// Scoped suppression of change broadcasts.
///
/// Dereferences to the source so the suppressed mutations are written
/// through the guard. The previous `propagate` state is restored on drop,
/// including on early return and unwinding.
pub struct SuppressionGuard<'a, S: ChangeSource> {
    source: &'a mut S,
    saved: bool,
}

impl<'a, S: ChangeSource> SuppressionGuard<'a, S> {
    fn new(source: &'a mut S) -> Self {
        let notifier = source.notifier_mut();
        let saved = notifier.propagate;
        notifier.propagate = false;
        Self { source, saved }
    }
}

impl<S: ChangeSource> Deref for SuppressionGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: ChangeSource> DerefMut for SuppressionGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: ChangeSource> Drop for SuppressionGuard<'_, S> {
    fn drop(&mut self) {
        self.source.notifier_mut().propagate = self.saved;
    }
}
