use piet_model::{EditNotice, Editable, PietError, Settings, TableFontIncrease};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn defaults() {
    let settings = Settings::default();
    assert!(settings.row_highlight());
    assert_eq!(settings.table_font_increase(), TableFontIncrease::One);
    assert!(settings.non_empty_by_default());
    assert!(!settings.is_dirty());
}

#[test]
fn document_uses_camel_case_and_numeric_font_increase() {
    let mut settings = Settings::default();
    settings
        .set_table_font_increase(TableFontIncrease::Three)
        .unwrap();
    settings.set_row_highlight(false).unwrap();

    assert_eq!(
        settings.to_json().unwrap(),
        json!({
            "rowHighlight": false,
            "tableFontIncrease": 3,
            "nonEmptyByDefault": true
        })
    );
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let settings = Settings::from_json(json!({ "tableFontIncrease": 2 })).unwrap();
    assert!(settings.row_highlight());
    assert_eq!(settings.table_font_increase(), TableFontIncrease::Two);
    assert!(settings.non_empty_by_default());
}

#[test]
fn out_of_range_font_increase_is_rejected() {
    let err = Settings::from_json(json!({ "tableFontIncrease": 4 })).unwrap_err();
    assert!(matches!(err, PietError::Json(_)));
    assert!(err.to_string().contains("tableFontIncrease"));

    assert!(TableFontIncrease::try_from(0).is_err());
    assert_eq!(TableFontIncrease::try_from(2).unwrap(), TableFontIncrease::Two);
}

#[test]
fn cancel_restores_every_preference() {
    let mut settings = Settings::default();
    settings.set_row_highlight(false).unwrap();
    settings.set_non_empty_by_default(false).unwrap();
    assert!(settings.is_dirty());

    settings.cancel_edits().unwrap();
    assert!(!settings.is_dirty());
    assert!(settings.row_highlight());
    assert!(settings.non_empty_by_default());
}

#[test]
fn checkpoint_keeps_the_edited_values() {
    let mut settings = Settings::default();
    settings
        .set_table_font_increase(TableFontIncrease::Two)
        .unwrap();
    settings.checkpoint_edits().unwrap();
    settings.cancel_edits().unwrap();
    assert_eq!(settings.table_font_increase(), TableFontIncrease::Two);
}

#[test]
fn edit_listener_hears_one_session_across_preferences() {
    let mut settings = Settings::default();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let id = settings.subscribe_edits(Box::new(move |notice: &EditNotice| {
        sink.borrow_mut().push(*notice);
        Ok(())
    }));

    settings.set_row_highlight(false).unwrap();
    settings.set_non_empty_by_default(false).unwrap();
    settings.cancel_edits().unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![
            EditNotice::Begin,
            EditNotice::PendingPropertyEdit("rowHighlight"),
            EditNotice::PropertyEdit("rowHighlight"),
            EditNotice::PendingPropertyEdit("nonEmptyByDefault"),
            EditNotice::PropertyEdit("nonEmptyByDefault"),
            EditNotice::Cancel,
        ]
    );

    assert!(settings.unsubscribe_edits(id));
    settings.set_row_highlight(false).unwrap();
    settings.checkpoint_edits().unwrap();
    assert_eq!(seen.borrow().len(), 6);
}

#[test]
fn each_listener_gets_its_own_subscription() {
    let mut settings = Settings::default();
    let (first_seen, second_seen) = (Rc::new(RefCell::new(0)), Rc::new(RefCell::new(0)));
    let first_sink = Rc::clone(&first_seen);
    let first = settings.subscribe_edits(Box::new(move |_: &EditNotice| {
        *first_sink.borrow_mut() += 1;
        Ok(())
    }));
    let second_sink = Rc::clone(&second_seen);
    let second = settings.subscribe_edits(Box::new(move |_: &EditNotice| {
        *second_sink.borrow_mut() += 1;
        Ok(())
    }));
    assert_ne!(first, second);

    assert!(settings.unsubscribe_edits(first));
    assert!(!settings.unsubscribe_edits(first));
    settings
        .set_table_font_increase(TableFontIncrease::Two)
        .unwrap();
    settings.checkpoint_edits().unwrap();

    assert_eq!(*first_seen.borrow(), 0);
    assert_eq!(*second_seen.borrow(), 4);
}

#[test]
fn rejected_preference_edit_is_rolled_back() {
    let mut settings = Settings::default();
    settings.subscribe_edits(Box::new(|notice: &EditNotice| match notice {
        EditNotice::PropertyEdit("tableFontIncrease") => {
            Err(PietError::Listener("fixed size".into()))
        }
        _ => Ok(()),
    }));

    assert!(settings
        .set_table_font_increase(TableFontIncrease::Three)
        .is_err());
    assert_eq!(settings.table_font_increase(), TableFontIncrease::One);
    assert!(!settings.is_dirty());
}
