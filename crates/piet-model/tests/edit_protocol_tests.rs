mod common;

use common::*;
use piet_model::{
    EditNotice, Editable, Observable, PietError, Query, QueryFilter, QueryLevel, QueryMeasure,
    ValueChange,
};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn query_cancel_restores_state_at_first_edit() {
    let mut query = Query::default();
    query
        .measures_mut()
        .add(QueryMeasure::new(STORE_SQFT))
        .unwrap();
    query.checkpoint_edits().unwrap();
    let baseline = query.state().clone();

    query
        .measures_mut()
        .add(QueryMeasure::new(GROCERY_SQFT))
        .unwrap();
    query
        .levels_mut()
        .add(QueryLevel::new(STORE_COUNTRY))
        .unwrap();
    query
        .filters_mut()
        .add(QueryFilter::including(STORE_COUNTRY, ["USA"]))
        .unwrap();
    query.set_non_empty(false).unwrap();
    assert!(query.is_dirty());

    query.cancel_edits().unwrap();
    assert!(!query.is_dirty());
    assert_eq!(query.state(), &baseline);
}

#[test]
fn query_begin_fires_once_per_session() {
    let mut query = Query::default();
    let (seen, listener) = recording_listener();
    query.subscribe_edits(listener);

    query
        .measures_mut()
        .add(QueryMeasure::new(STORE_SQFT))
        .unwrap();
    query
        .levels_mut()
        .add(QueryLevel::new(STORE_TYPE))
        .unwrap();
    query.checkpoint_edits().unwrap();
    query.set_non_empty(false).unwrap();
    query.cancel_edits().unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            EditNotice::Begin,
            EditNotice::PendingPropertyEdit("measures"),
            EditNotice::PropertyEdit("measures"),
            EditNotice::PendingPropertyEdit("levels"),
            EditNotice::PropertyEdit("levels"),
            EditNotice::Checkpoint,
            EditNotice::Begin,
            EditNotice::PendingPropertyEdit("nonEmpty"),
            EditNotice::PropertyEdit("nonEmpty"),
            EditNotice::Cancel,
        ]
    );
    assert!(query.non_empty());
}

#[test]
fn later_edits_in_a_session_send_only_property_notices() {
    let mut query = Query::default();
    query
        .measures_mut()
        .add(QueryMeasure::new(STORE_SQFT))
        .unwrap();
    let (seen, listener) = recording_listener();
    query.subscribe_edits(listener);

    query
        .filters_mut()
        .add(QueryFilter::including(STORE_COUNTRY, ["USA"]))
        .unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            EditNotice::PendingPropertyEdit("filters"),
            EditNotice::PropertyEdit("filters"),
        ]
    );
}

#[test]
fn rejected_property_edit_rolls_the_query_back() {
    let mut query = Query::default();
    query.subscribe_edits(Box::new(|notice: &EditNotice| match notice {
        EditNotice::PropertyEdit(_) => Err(PietError::Listener("frozen".into())),
        _ => Ok(()),
    }));

    assert!(query
        .measures_mut()
        .add(QueryMeasure::new(STORE_SQFT))
        .is_err());
    assert!(query.measures().is_empty());
    assert!(!query.is_dirty());
}

#[test]
fn checkpoint_and_cancel_are_noops_when_clean() {
    let mut query = Query::default();
    let (seen, listener) = recording_listener();
    query.subscribe_edits(listener);

    query.checkpoint_edits().unwrap();
    query.cancel_edits().unwrap();

    assert!(seen.borrow().is_empty());
    assert!(!query.is_dirty());
}

#[test]
fn rejected_begin_keeps_the_query_clean() {
    let mut query = Query::default();
    query.subscribe_edits(Box::new(|notice: &EditNotice| match notice {
        EditNotice::Begin => Err(PietError::Listener("locked".into())),
        _ => Ok(()),
    }));

    assert!(query
        .measures_mut()
        .add(QueryMeasure::new(STORE_SQFT))
        .is_err());
    assert!(!query.is_dirty());
    assert!(query.measures().is_empty());
}

#[test]
fn vetoed_first_edit_does_not_leave_a_session_open() {
    let mut query = Query::default();
    query.subscribe(Box::new(|notice: &piet_model::QueryNotice<'_>| {
        match notice.phase {
            piet_model::ChangePhase::Changed => Err(PietError::Listener("no".into())),
            _ => Ok(()),
        }
    }));

    assert!(query.set_non_empty(false).is_err());
    assert!(!query.is_dirty());
    assert!(query.non_empty());
}

#[test]
fn observable_notifies_old_and_new_values() {
    let mut value = Observable::new(1u8);
    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&changes);
    value.subscribe_changes(Box::new(move |change: &ValueChange<'_, u8>| {
        sink.borrow_mut().push((*change.old_value, *change.new_value));
    }));

    value.set(2).unwrap();
    value.set(3).unwrap();

    assert_eq!(*changes.borrow(), vec![(1, 2), (2, 3)]);
    assert_eq!(*value.get(), 3);
}

#[test]
fn observable_cancel_restores_and_reports_the_restore() {
    let mut value = Observable::new("draft".to_string());
    let (seen, listener) = recording_listener();
    value.subscribe_edits(listener);
    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&changes);
    value.subscribe_changes(Box::new(move |change: &ValueChange<'_, String>| {
        sink.borrow_mut().push(change.new_value.clone());
    }));

    value.set("first".to_string()).unwrap();
    value.set("second".to_string()).unwrap();
    value.cancel_edits().unwrap();

    assert_eq!(value.get(), "draft");
    assert_eq!(*changes.borrow(), vec!["first", "second", "draft"]);
    assert_eq!(*seen.borrow(), vec![EditNotice::Begin, EditNotice::Cancel]);
}

#[test]
fn observable_checkpoint_sets_a_new_baseline() {
    let mut value = Observable::new(false);
    value.set(true).unwrap();
    value.checkpoint_edits().unwrap();
    assert!(!value.is_dirty());

    value.set(false).unwrap();
    value.cancel_edits().unwrap();
    assert!(*value.get());
}
