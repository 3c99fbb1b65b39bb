use crate::error::PietResult;
use std::collections::BTreeMap;
use std::fmt;

/// Handle returned by every `subscribe*` method; pass it back to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Ordered callback registry.
///
/// Ids are handed out monotonically, so iterating the map visits listeners in registration
/// order. Removal is keyed by id rather than by listener identity.
pub struct Subscribers<F: ?Sized> {
    next_id: u64,
    entries: BTreeMap<u64, Box<F>>,
}

impl<F: ?Sized> Subscribers<F> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<F>) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, listener);
        SubscriptionId(id)
    }

    /// Returns `false` when the id was unknown (already removed).
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.entries.remove(&id.0).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<F>> {
        self.entries.values_mut()
    }
}

impl<F: ?Sized> Default for Subscribers<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for Subscribers<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Notifications emitted by edit-tracked entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditNotice {
    /// First edit since the last checkpoint/cancel; a snapshot has just been captured.
    Begin,
    Checkpoint,
    Cancel,
    /// A property is about to change. Fired before the new value is applied.
    PendingPropertyEdit(&'static str),
    PropertyEdit(&'static str),
}

pub type EditListener = dyn FnMut(&EditNotice) -> PietResult<()>;

/// Deliver `notice` to every listener in registration order, stopping at the first error.
pub(crate) fn dispatch_edit(
    listeners: &mut Subscribers<EditListener>,
    notice: EditNotice,
) -> PietResult<()> {
    log::trace!("dispatching {notice:?} to {} listener(s)", listeners.len());
    for listener in listeners.iter_mut() {
        listener(&notice)?;
    }
    Ok(())
}
