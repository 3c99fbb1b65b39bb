//! A named, persistable analysis: one dataset plus the query built against it.
//!
//! The analysis is the unit users checkpoint and cancel. It listens to its own query so that any
//! query mutation opens the analysis edit session before the mutation is applied; cancelling the
//! analysis rolls back both the header (name, description) and the query.

use crate::dataset::Dataset;
use crate::edit::{EditTracker, Editable};
use crate::error::{PietError, PietResult};
use crate::events::{dispatch_edit, EditListener, EditNotice, Subscribers, SubscriptionId};
use crate::query::{
    ChangePhase, Collection, Query, QueryChange, QueryFilter, QueryLevel, QueryMeasure,
    QueryNotice, QueryState,
};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq, Eq)]
struct AnalysisHeader {
    name: String,
    description: Option<String>,
}

/// The value an edit replaced, replayed by [`Analysis::undo`].
#[derive(Clone, Debug)]
enum UndoAction {
    Name(String),
    Description(Option<String>),
    NonEmpty(bool),
    Measures(Vec<QueryMeasure>),
    Levels(Vec<QueryLevel>),
    Filters(Vec<QueryFilter>),
}

impl UndoAction {
    /// Capture what `change` is about to overwrite in `query`.
    fn before(change: &QueryChange, query: &QueryState) -> Self {
        match change {
            QueryChange::NonEmpty(_) => UndoAction::NonEmpty(query.non_empty),
            QueryChange::List { collection, .. } => match collection {
                Collection::Measures => UndoAction::Measures(query.measures.clone()),
                Collection::Levels => UndoAction::Levels(query.levels.clone()),
                Collection::Filters => UndoAction::Filters(query.filters.clone()),
            },
        }
    }
}

/// Property name reported to analysis edit listeners for a query change.
fn query_property(change: &QueryChange) -> &'static str {
    match change {
        QueryChange::NonEmpty(_) => "nonEmpty",
        QueryChange::List { .. } => "query",
    }
}

/// State shared between the analysis and the hook it registers on its query.
struct AnalysisCore {
    header: AnalysisHeader,
    edits: EditTracker<AnalysisHeader>,
    listeners: Subscribers<EditListener>,
    undo: Option<UndoAction>,
    replaying_undo: bool,
    /// Captured at `WillChange`, committed to `undo` once the query reports `Changed`.
    pending_undo: Option<UndoAction>,
    /// The undo slot a committed query change displaced, restored if the change is aborted.
    displaced_undo: Option<Option<UndoAction>>,
    /// Whether the query change in flight opened the analysis session.
    opened_by_query: bool,
}

impl AnalysisCore {
    /// Returns whether this call opened the session.
    fn begin_edit(&mut self) -> PietResult<bool> {
        if !self.edits.begin_with(|| self.header.clone()) {
            return Ok(false);
        }
        log::debug!("analysis {:?}: edit session started", self.header.name);
        if let Err(err) = dispatch_edit(&mut self.listeners, EditNotice::Begin) {
            self.edits.abandon();
            return Err(err);
        }
        Ok(true)
    }

    fn dispatch(&mut self, notice: EditNotice) -> PietResult<()> {
        dispatch_edit(&mut self.listeners, notice)
    }

    fn record_undo(&mut self, action: UndoAction) {
        if !self.replaying_undo {
            self.undo = Some(action);
        }
    }

    fn on_query_notice(&mut self, notice: &QueryNotice<'_>) -> PietResult<()> {
        let property = query_property(notice.change);
        match notice.phase {
            ChangePhase::WillChange => {
                self.pending_undo = None;
                self.displaced_undo = None;
                self.opened_by_query = false;
                self.opened_by_query = self.begin_edit()?;
                self.dispatch(EditNotice::PendingPropertyEdit(property))?;
                if !self.replaying_undo {
                    self.pending_undo = Some(UndoAction::before(notice.change, notice.query));
                }
                Ok(())
            }
            ChangePhase::Changed => {
                self.dispatch(EditNotice::PropertyEdit(property))?;
                if let Some(action) = self.pending_undo.take() {
                    self.displaced_undo = Some(self.undo.replace(action));
                }
                Ok(())
            }
            ChangePhase::Aborted => {
                self.pending_undo = None;
                if let Some(previous) = self.displaced_undo.take() {
                    self.undo = previous;
                }
                if std::mem::take(&mut self.opened_by_query) {
                    log::debug!("analysis {:?}: abandoning session of aborted query change", self.header.name);
                    self.edits.abandon();
                }
                Ok(())
            }
        }
    }
}

pub struct Analysis {
    id: Option<String>,
    dataset: Rc<Dataset>,
    query: Query,
    core: Rc<RefCell<AnalysisCore>>,
}

impl Analysis {
    /// A fresh analysis with an empty query bound to `dataset`.
    pub fn new(name: impl Into<String>, dataset: Rc<Dataset>) -> Self {
        let query = Query::for_dataset(&dataset);
        Self::assemble(None, name.into(), None, dataset, query)
    }

    /// Like [`Analysis::new`], seeding query defaults from workspace settings.
    pub fn with_settings(name: impl Into<String>, dataset: Rc<Dataset>, settings: &Settings) -> Self {
        let mut state = Query::for_dataset(&dataset).state().clone();
        state.non_empty = settings.non_empty_by_default();
        Self::assemble(None, name.into(), None, dataset, Query::from_state(state))
    }

    fn assemble(
        id: Option<String>,
        name: String,
        description: Option<String>,
        dataset: Rc<Dataset>,
        mut query: Query,
    ) -> Self {
        let core = Rc::new(RefCell::new(AnalysisCore {
            header: AnalysisHeader { name, description },
            edits: EditTracker::new(),
            listeners: Subscribers::new(),
            undo: None,
            replaying_undo: false,
            pending_undo: None,
            displaced_undo: None,
            opened_by_query: false,
        }));
        let hook_core = Rc::clone(&core);
        query.subscribe(Box::new(move |notice: &QueryNotice<'_>| {
            hook_core.borrow_mut().on_query_notice(notice)
        }));
        Self {
            id,
            dataset,
            query,
            core,
        }
    }

    /// Storage identifier; `None` until the analysis has been stored.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assigned by storage. Not an edit.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn is_stored(&self) -> bool {
        self.id.is_some()
    }

    pub fn name(&self) -> String {
        self.core.borrow().header.name.clone()
    }

    pub fn description(&self) -> Option<String> {
        self.core.borrow().header.description.clone()
    }

    pub fn dataset(&self) -> &Rc<Dataset> {
        &self.dataset
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Mutations made through the returned query join this analysis's edit session.
    pub fn query_mut(&mut self) -> &mut Query {
        &mut self.query
    }

    pub fn non_empty(&self) -> bool {
        self.query.non_empty()
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> PietResult<()> {
        let name = name.into();
        self.edit_header("name", |header| {
            UndoAction::Name(std::mem::replace(&mut header.name, name))
        })
    }

    pub fn set_description(&mut self, description: Option<String>) -> PietResult<()> {
        self.edit_header("description", |header| {
            UndoAction::Description(std::mem::replace(&mut header.description, description))
        })
    }

    /// Routed through the query, so hooks on it observe the change too.
    pub fn set_non_empty(&mut self, non_empty: bool) -> PietResult<()> {
        self.query.set_non_empty(non_empty)
    }

    fn edit_header(
        &mut self,
        property: &'static str,
        apply: impl FnOnce(&mut AnalysisHeader) -> UndoAction,
    ) -> PietResult<()> {
        let mut core = self.core.borrow_mut();
        let began = core.begin_edit()?;
        let previous_header = core.header.clone();
        let previous_undo = core.undo.clone();
        let result = core
            .dispatch(EditNotice::PendingPropertyEdit(property))
            .and_then(|()| {
                let undo = apply(&mut core.header);
                core.record_undo(undo);
                core.dispatch(EditNotice::PropertyEdit(property))
            });
        if let Err(err) = result {
            log::warn!("analysis {:?}: {property} edit rejected: {err}", previous_header.name);
            core.header = previous_header;
            core.undo = previous_undo;
            if began {
                core.edits.abandon();
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn undo_available(&self) -> bool {
        self.core.borrow().undo.is_some()
    }

    /// Revert the most recent edit. Returns `false` when there was nothing to undo.
    ///
    /// Undo is a single level: the replayed edit does not itself become undoable.
    pub fn undo(&mut self) -> PietResult<bool> {
        let Some(action) = self.core.borrow_mut().undo.take() else {
            return Ok(false);
        };
        log::debug!("analysis {:?}: undo {action:?}", self.name());

        self.core.borrow_mut().replaying_undo = true;
        let result = self.replay(action.clone());
        let mut core = self.core.borrow_mut();
        core.replaying_undo = false;
        if result.is_err() {
            core.undo = Some(action);
        }
        result.map(|()| true)
    }

    fn replay(&mut self, action: UndoAction) -> PietResult<()> {
        match action {
            UndoAction::Name(name) => self.set_name(name),
            UndoAction::Description(description) => self.set_description(description),
            UndoAction::NonEmpty(non_empty) => self.set_non_empty(non_empty),
            UndoAction::Measures(items) => self.query.measures_mut().set(items).map(drop),
            UndoAction::Levels(items) => self.query.levels_mut().set(items).map(drop),
            UndoAction::Filters(items) => self.query.filters_mut().set(items).map(drop),
        }
    }

    /// Compile the query against this analysis's dataset.
    pub fn as_mdx(&self) -> PietResult<Option<String>> {
        self.query.as_mdx(&self.dataset)
    }

    /// A dirty analysis carries its last checkpoint so that a reload can still cancel.
    pub fn to_document(&self) -> AnalysisDocument {
        let core = self.core.borrow();
        let edit_checkpoint = (core.edits.is_dirty() || self.query.is_dirty()).then(|| {
            let header = core.edits.snapshot().unwrap_or(&core.header);
            AnalysisCheckpoint {
                name: header.name.clone(),
                description: header.description.clone(),
                query: self
                    .query
                    .edit_snapshot()
                    .unwrap_or(self.query.state())
                    .clone(),
            }
        });
        AnalysisDocument {
            id: self.id.clone(),
            name: core.header.name.clone(),
            description: core.header.description.clone(),
            dataset_ref: DatasetRef {
                id: self.dataset.id().to_string(),
                cube: self.dataset.name().to_string(),
                measure_group_name: self.dataset.measure_group_name().map(str::to_string),
            },
            query: self.query.state().clone(),
            edit_checkpoint,
        }
    }

    /// Rebuild an analysis, resolving its dataset reference against `catalog`.
    ///
    /// The result is clean unless the document carries an edit checkpoint, in which case the
    /// session is reopened with that checkpoint as its baseline.
    pub fn from_document(document: AnalysisDocument, catalog: &[Rc<Dataset>]) -> PietResult<Self> {
        let AnalysisDocument {
            id,
            name,
            description,
            dataset_ref,
            query,
            edit_checkpoint,
        } = document;
        query.validate()?;
        if let Some(checkpoint) = &edit_checkpoint {
            checkpoint.query.validate()?;
        }
        let dataset = catalog
            .iter()
            .find(|d| dataset_ref.matches(d))
            .cloned()
            .ok_or_else(|| {
                log::warn!(
                    "analysis {name:?} references unknown dataset {}:{}",
                    dataset_ref.id,
                    dataset_ref.cube
                );
                PietError::DatasetNotFound {
                    id: dataset_ref.id.clone(),
                    cube: dataset_ref.cube.clone(),
                }
            })?;
        let mut query = Query::from_state(query);
        if let Some(checkpoint) = edit_checkpoint {
            log::debug!("analysis {name:?}: resuming edit session from document");
            query.resume_edits(checkpoint.query);
            let header = AnalysisHeader {
                name: checkpoint.name,
                description: checkpoint.description,
            };
            let analysis = Self::assemble(id, name, description, dataset, query);
            analysis.core.borrow_mut().edits.begin_with(|| header);
            return Ok(analysis);
        }
        Ok(Self::assemble(id, name, description, dataset, query))
    }

    pub fn to_json(&self) -> PietResult<serde_json::Value> {
        Ok(serde_json::to_value(self.to_document())?)
    }

    pub fn from_json(value: serde_json::Value, catalog: &[Rc<Dataset>]) -> PietResult<Self> {
        Self::from_document(serde_json::from_value(value)?, catalog)
    }
}

impl Editable for Analysis {
    fn is_dirty(&self) -> bool {
        self.core.borrow().edits.is_dirty() || self.query.is_dirty()
    }

    fn checkpoint_edits(&mut self) -> PietResult<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        {
            let mut core = self.core.borrow_mut();
            core.edits.checkpoint();
            core.undo = None;
        }
        self.query.checkpoint_edits()?;
        log::debug!("analysis {:?}: checkpoint", self.name());
        self.core.borrow_mut().dispatch(EditNotice::Checkpoint)
    }

    fn cancel_edits(&mut self) -> PietResult<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        {
            let mut core = self.core.borrow_mut();
            if let Some(header) = core.edits.cancel() {
                core.header = header;
            }
            core.undo = None;
        }
        self.query.cancel_edits()?;
        log::debug!("analysis {:?}: edits cancelled", self.name());
        self.core.borrow_mut().dispatch(EditNotice::Cancel)
    }

    fn subscribe_edits(&mut self, listener: Box<EditListener>) -> SubscriptionId {
        self.core.borrow_mut().listeners.subscribe(listener)
    }

    fn unsubscribe_edits(&mut self, id: SubscriptionId) -> bool {
        self.core.borrow_mut().listeners.unsubscribe(id)
    }
}

impl fmt::Debug for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("Analysis")
            .field("id", &self.id)
            .field("name", &core.header.name)
            .field("description", &core.header.description)
            .field("dataset", &self.dataset.name())
            .field("query", &self.query)
            .finish()
    }
}

/// Persisted form of an [`Analysis`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub dataset_ref: DatasetRef,
    #[serde(rename = "_query")]
    pub query: QueryState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_checkpoint: Option<AnalysisCheckpoint>,
}

/// Header and query as of the last checkpoint of a dirty analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisCheckpoint {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "_query")]
    pub query: QueryState,
}

/// Identifies a dataset by metadata source and cube name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef {
    pub id: String,
    pub cube: String,
    /// Compared only when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_group_name: Option<String>,
}

impl DatasetRef {
    pub fn matches(&self, dataset: &Dataset) -> bool {
        dataset.id() == self.id
            && dataset.name() == self.cube
            && self
                .measure_group_name
                .as_deref()
                .map_or(true, |group| dataset.measure_group_name() == Some(group))
    }
}
