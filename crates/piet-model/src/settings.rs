//! Workspace preferences.

use crate::edit::Editable;
use crate::error::{PietError, PietResult};
use crate::events::{dispatch_edit, EditListener, EditNotice, Subscribers, SubscriptionId};
use crate::observable::Observable;
use serde::{Deserialize, Serialize};

/// How much the result table font is enlarged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TableFontIncrease {
    #[default]
    One,
    Two,
    Three,
}

impl TryFrom<u8> for TableFontIncrease {
    type Error = PietError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TableFontIncrease::One),
            2 => Ok(TableFontIncrease::Two),
            3 => Ok(TableFontIncrease::Three),
            other => Err(PietError::InvalidSettings(format!(
                "tableFontIncrease must be 1, 2 or 3 (got {other})"
            ))),
        }
    }
}

impl From<TableFontIncrease> for u8 {
    fn from(value: TableFontIncrease) -> Self {
        match value {
            TableFontIncrease::One => 1,
            TableFontIncrease::Two => 2,
            TableFontIncrease::Three => 3,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Persisted form of [`Settings`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDocument {
    #[serde(default = "default_true")]
    pub row_highlight: bool,
    #[serde(default)]
    pub table_font_increase: TableFontIncrease,
    #[serde(default = "default_true")]
    pub non_empty_by_default: bool,
}

impl Default for SettingsDocument {
    fn default() -> Self {
        Self {
            row_highlight: true,
            table_font_increase: TableFontIncrease::default(),
            non_empty_by_default: true,
        }
    }
}

/// Edit-tracked workspace preferences.
///
/// Each preference is an [`Observable`]; the settings are dirty while any of them is, and
/// checkpoint/cancel apply to all of them. Edit listeners subscribe to the settings as a whole
/// and hear one `Begin` per session, with property notices naming the preference.
#[derive(Debug)]
pub struct Settings {
    row_highlight: Observable<bool>,
    table_font_increase: Observable<TableFontIncrease>,
    non_empty_by_default: Observable<bool>,
    listeners: Subscribers<EditListener>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_document(SettingsDocument::default())
    }
}

impl Settings {
    pub fn from_document(document: SettingsDocument) -> Self {
        Self {
            row_highlight: Observable::new(document.row_highlight),
            table_font_increase: Observable::new(document.table_font_increase),
            non_empty_by_default: Observable::new(document.non_empty_by_default),
            listeners: Subscribers::new(),
        }
    }

    pub fn to_document(&self) -> SettingsDocument {
        SettingsDocument {
            row_highlight: self.row_highlight(),
            table_font_increase: self.table_font_increase(),
            non_empty_by_default: self.non_empty_by_default(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> PietResult<Self> {
        Ok(Self::from_document(serde_json::from_value(value)?))
    }

    pub fn to_json(&self) -> PietResult<serde_json::Value> {
        Ok(serde_json::to_value(self.to_document())?)
    }

    pub fn row_highlight(&self) -> bool {
        *self.row_highlight.get()
    }

    pub fn table_font_increase(&self) -> TableFontIncrease {
        *self.table_font_increase.get()
    }

    /// Initial `non_empty` flag of new analyses.
    pub fn non_empty_by_default(&self) -> bool {
        *self.non_empty_by_default.get()
    }

    pub fn set_row_highlight(&mut self, value: bool) -> PietResult<()> {
        let was_clean = !self.is_dirty();
        edit_preference(
            &mut self.listeners,
            was_clean,
            "rowHighlight",
            &mut self.row_highlight,
            value,
        )
    }

    pub fn set_table_font_increase(&mut self, value: TableFontIncrease) -> PietResult<()> {
        let was_clean = !self.is_dirty();
        edit_preference(
            &mut self.listeners,
            was_clean,
            "tableFontIncrease",
            &mut self.table_font_increase,
            value,
        )
    }

    pub fn set_non_empty_by_default(&mut self, value: bool) -> PietResult<()> {
        let was_clean = !self.is_dirty();
        edit_preference(
            &mut self.listeners,
            was_clean,
            "nonEmptyByDefault",
            &mut self.non_empty_by_default,
            value,
        )
    }

    fn editables(&mut self) -> [&mut dyn Editable; 3] {
        [
            &mut self.row_highlight,
            &mut self.table_font_increase,
            &mut self.non_empty_by_default,
        ]
    }
}

/// Set one preference, bracketed by the settings-level edit notices.
///
/// A rejected `PropertyEdit` puts the preference back the way it was.
fn edit_preference<T: Clone>(
    listeners: &mut Subscribers<EditListener>,
    was_clean: bool,
    property: &'static str,
    field: &mut Observable<T>,
    value: T,
) -> PietResult<()> {
    if was_clean {
        log::debug!("settings edit session started by {property}");
        dispatch_edit(listeners, EditNotice::Begin)?;
    }
    dispatch_edit(listeners, EditNotice::PendingPropertyEdit(property))?;
    let was_dirty = field.is_dirty();
    let previous = field.get().clone();
    field.set(value)?;
    if let Err(err) = dispatch_edit(listeners, EditNotice::PropertyEdit(property)) {
        log::warn!("settings edit of {property} rejected: {err}");
        if was_dirty {
            field.set(previous)?;
        } else {
            field.cancel_edits()?;
        }
        return Err(err);
    }
    Ok(())
}

impl Editable for Settings {
    fn is_dirty(&self) -> bool {
        self.row_highlight.is_dirty()
            || self.table_font_increase.is_dirty()
            || self.non_empty_by_default.is_dirty()
    }

    fn checkpoint_edits(&mut self) -> PietResult<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        for field in self.editables() {
            field.checkpoint_edits()?;
        }
        dispatch_edit(&mut self.listeners, EditNotice::Checkpoint)
    }

    fn cancel_edits(&mut self) -> PietResult<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        log::debug!("cancelling settings edits");
        for field in self.editables() {
            field.cancel_edits()?;
        }
        dispatch_edit(&mut self.listeners, EditNotice::Cancel)
    }

    fn subscribe_edits(&mut self, listener: Box<EditListener>) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe_edits(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }
}
