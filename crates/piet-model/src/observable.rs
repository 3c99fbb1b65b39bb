use crate::edit::{EditTracker, Editable};
use crate::error::PietResult;
use crate::events::{dispatch_edit, EditListener, EditNotice, Subscribers, SubscriptionId};
use std::fmt;

/// Old and new value delivered to change listeners.
#[derive(Debug)]
pub struct ValueChange<'a, T> {
    pub old_value: &'a T,
    pub new_value: &'a T,
}

pub type ChangeListener<T> = dyn FnMut(&ValueChange<'_, T>);

/// An edit-tracked scalar.
///
/// Setting the value always notifies change listeners; the first set after a checkpoint also
/// captures the previous value and fires `EditNotice::Begin`.
pub struct Observable<T> {
    value: T,
    edits: EditTracker<T>,
    change_listeners: Subscribers<ChangeListener<T>>,
    edit_listeners: Subscribers<EditListener>,
}

impl<T: Clone> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            edits: EditTracker::new(),
            change_listeners: Subscribers::new(),
            edit_listeners: Subscribers::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) -> PietResult<()> {
        if self.edits.begin_with(|| self.value.clone()) {
            if let Err(err) = dispatch_edit(&mut self.edit_listeners, EditNotice::Begin) {
                self.edits.abandon();
                return Err(err);
            }
        }
        let old_value = std::mem::replace(&mut self.value, value);
        self.notify_change(&old_value);
        Ok(())
    }

    pub fn subscribe_changes(&mut self, listener: Box<ChangeListener<T>>) -> SubscriptionId {
        self.change_listeners.subscribe(listener)
    }

    pub fn unsubscribe_changes(&mut self, id: SubscriptionId) -> bool {
        self.change_listeners.unsubscribe(id)
    }

    fn notify_change(&mut self, old_value: &T) {
        let change = ValueChange {
            old_value,
            new_value: &self.value,
        };
        for listener in self.change_listeners.iter_mut() {
            listener(&change);
        }
    }
}

impl<T: Clone> Editable for Observable<T> {
    fn is_dirty(&self) -> bool {
        self.edits.is_dirty()
    }

    fn checkpoint_edits(&mut self) -> PietResult<()> {
        if self.edits.checkpoint() {
            dispatch_edit(&mut self.edit_listeners, EditNotice::Checkpoint)?;
        }
        Ok(())
    }

    fn cancel_edits(&mut self) -> PietResult<()> {
        let Some(previous) = self.edits.cancel() else {
            return Ok(());
        };
        let old_value = std::mem::replace(&mut self.value, previous);
        self.notify_change(&old_value);
        dispatch_edit(&mut self.edit_listeners, EditNotice::Cancel)
    }

    fn subscribe_edits(&mut self, listener: Box<EditListener>) -> SubscriptionId {
        self.edit_listeners.subscribe(listener)
    }

    fn unsubscribe_edits(&mut self, id: SubscriptionId) -> bool {
        self.edit_listeners.unsubscribe(id)
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.value)
            .field("dirty", &self.edits.is_dirty())
            .finish()
    }
}
