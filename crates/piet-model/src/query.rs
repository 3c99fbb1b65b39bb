//! Query components and the observable query that owns them.
//!
//! A [`Query`] holds three ordered collections (measures, levels, filters) plus the `non_empty`
//! flag. All mutation goes through [`ComponentEditor`]s (or [`Query::set_non_empty`]) which run a
//! two-phase protocol:
//!
//! 1. every hook registered with [`Query::subscribe`] sees a [`ChangePhase::WillChange`] notice
//!    carrying the *pre-change* query, in registration order;
//! 2. the mutation is applied;
//! 3. every hook sees a [`ChangePhase::Changed`] notice carrying the updated query.
//!
//! A hook error in either phase aborts the operation and leaves the collection exactly as it was
//! before the call; hooks then receive a [`ChangePhase::Aborted`] notice. Edit listeners see
//! `PendingPropertyEdit` before and `PropertyEdit` after every mutation, preceded by `Begin` on
//! the first edit of a session.

use crate::dataset::Dataset;
use crate::edit::{EditTracker, Editable};
use crate::error::{PietError, PietResult};
use crate::events::{dispatch_edit, EditListener, EditNotice, Subscribers, SubscriptionId};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::marker::PhantomData;

const fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryMeasure {
    #[serde(rename = "_uniqueName")]
    unique_name: String,
}

impl QueryMeasure {
    pub fn new(unique_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
        }
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn set_unique_name(&mut self, unique_name: impl Into<String>) {
        self.unique_name = unique_name.into();
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryLevel {
    #[serde(rename = "_uniqueName")]
    unique_name: String,
    #[serde(rename = "_rowOrientation", default = "default_true")]
    row_orientation: bool,
    #[serde(rename = "_sumSelected", default)]
    sum_selected: bool,
}

impl QueryLevel {
    /// A row-oriented level.
    pub fn new(unique_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            row_orientation: true,
            sum_selected: false,
        }
    }

    pub fn with_row_orientation(mut self, row_orientation: bool) -> Self {
        self.row_orientation = row_orientation;
        self
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn row_orientation(&self) -> bool {
        self.row_orientation
    }

    pub fn sum_selected(&self) -> bool {
        self.sum_selected
    }

    pub fn set_unique_name(&mut self, unique_name: impl Into<String>) {
        self.unique_name = unique_name.into();
    }

    /// Returns `true` when the orientation changed.
    pub fn set_row_orientation(&mut self, row_orientation: bool) -> bool {
        let changed = self.row_orientation != row_orientation;
        self.row_orientation = row_orientation;
        changed
    }

    pub fn set_sum_selected(&mut self, sum_selected: bool) -> bool {
        let changed = self.sum_selected != sum_selected;
        self.sum_selected = sum_selected;
        changed
    }
}

/// Restricts (or excludes) the members of one level.
///
/// Member names are kept in insertion order without duplicates. A filter without members is
/// inactive regardless of `include`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(rename = "_levelUniqueName")]
    level_unique_name: String,
    #[serde(rename = "_include", default = "default_true")]
    include: bool,
    #[serde(rename = "_filterOnlyHierarchy", default)]
    filter_only_hierarchy: bool,
    #[serde(
        rename = "levelMemberNames",
        default,
        deserialize_with = "deserialize_member_names"
    )]
    level_member_names: Vec<String>,
}

fn deserialize_member_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let names = Vec::<String>::deserialize(deserializer)?;
    Ok(dedup_preserving_order(names))
}

fn dedup_preserving_order(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

impl QueryFilter {
    pub fn new(level_unique_name: impl Into<String>, include: bool) -> Self {
        Self {
            level_unique_name: level_unique_name.into(),
            include,
            filter_only_hierarchy: false,
            level_member_names: Vec::new(),
        }
    }

    /// Keep only the named members.
    pub fn including<I, S>(level_unique_name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = Self::new(level_unique_name, true);
        filter.set_member_names(members);
        filter
    }

    /// Keep every member except the named ones.
    pub fn excluding<I, S>(level_unique_name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = Self::new(level_unique_name, false);
        filter.set_member_names(members);
        filter
    }

    pub fn level_unique_name(&self) -> &str {
        &self.level_unique_name
    }

    pub fn include(&self) -> bool {
        self.include
    }

    pub fn filter_only_hierarchy(&self) -> bool {
        self.filter_only_hierarchy
    }

    pub fn member_names(&self) -> &[String] {
        &self.level_member_names
    }

    pub fn is_active(&self) -> bool {
        !self.level_member_names.is_empty()
    }

    pub fn set_include(&mut self, include: bool) {
        self.include = include;
    }

    pub fn set_filter_only_hierarchy(&mut self, filter_only_hierarchy: bool) {
        self.filter_only_hierarchy = filter_only_hierarchy;
    }

    /// Returns `false` if the member was already present.
    pub fn add_member(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.level_member_names.contains(&name) {
            return false;
        }
        self.level_member_names.push(name);
        true
    }

    pub fn remove_member(&mut self, name: &str) -> bool {
        let before = self.level_member_names.len();
        self.level_member_names.retain(|m| m != name);
        self.level_member_names.len() != before
    }

    pub fn set_member_names<I, S>(&mut self, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.level_member_names = dedup_preserving_order(members.into_iter().map(Into::into));
    }
}

/// Plain value form of a query: the persisted JSON shape and the unit of checkpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    #[serde(default = "default_true")]
    pub non_empty: bool,
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(rename = "_measures", default)]
    pub measures: Vec<QueryMeasure>,
    #[serde(rename = "_levels", default)]
    pub levels: Vec<QueryLevel>,
    #[serde(rename = "_filters", default)]
    pub filters: Vec<QueryFilter>,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            non_empty: true,
            dataset_name: None,
            measures: Vec::new(),
            levels: Vec::new(),
            filters: Vec::new(),
        }
    }
}

impl QueryState {
    /// Check the invariants the editors enforce: at most one filter per level.
    pub fn validate(&self) -> PietResult<()> {
        QueryFilter::validate(&[], &self.filters)
    }

    /// Linear scan; queries carry tens of filters at most.
    pub fn find_filter(&self, level_unique_name: &str) -> Option<&QueryFilter> {
        self.filters
            .iter()
            .find(|f| f.level_unique_name == level_unique_name)
    }

    pub fn row_levels(&self) -> impl Iterator<Item = &QueryLevel> {
        self.levels.iter().filter(|l| l.row_orientation)
    }

    pub fn column_levels(&self) -> impl Iterator<Item = &QueryLevel> {
        self.levels.iter().filter(|l| !l.row_orientation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    Measures,
    Levels,
    Filters,
}

impl Collection {
    pub fn property_name(self) -> &'static str {
        match self {
            Collection::Measures => "measures",
            Collection::Levels => "levels",
            Collection::Filters => "filters",
        }
    }
}

/// What a collection mutation does, expressed against the pre-change contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListChange {
    Add { index: usize },
    AddAll { index: usize, count: usize },
    Remove { index: usize },
    Update { index: usize },
    Set { len: usize },
    Clear { removed: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryChange {
    List {
        collection: Collection,
        change: ListChange,
    },
    NonEmpty(bool),
}

impl QueryChange {
    pub fn property_name(&self) -> &'static str {
        match self {
            QueryChange::List { collection, .. } => collection.property_name(),
            QueryChange::NonEmpty(_) => "nonEmpty",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangePhase {
    WillChange,
    Changed,
    /// The change was vetoed after `WillChange` and the query is back to its previous contents.
    Aborted,
}

#[derive(Debug)]
pub struct QueryNotice<'a> {
    pub phase: ChangePhase,
    pub change: &'a QueryChange,
    /// Query contents before the change (`WillChange`, `Aborted`) or after it (`Changed`).
    pub query: &'a QueryState,
}

pub type QueryHook = dyn FnMut(&QueryNotice<'_>) -> PietResult<()>;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::QueryMeasure {}
    impl Sealed for super::QueryLevel {}
    impl Sealed for super::QueryFilter {}
}

/// Binds a component type to its collection inside [`QueryState`].
pub trait QueryComponent: Clone + PartialEq + sealed::Sealed {
    const COLLECTION: Collection;

    fn items(state: &QueryState) -> &Vec<Self>;

    fn items_mut(state: &mut QueryState) -> &mut Vec<Self>;

    /// Check that `incoming` may join `existing`.
    fn validate(_existing: &[Self], _incoming: &[Self]) -> PietResult<()> {
        Ok(())
    }
}

impl QueryComponent for QueryMeasure {
    const COLLECTION: Collection = Collection::Measures;

    fn items(state: &QueryState) -> &Vec<Self> {
        &state.measures
    }

    fn items_mut(state: &mut QueryState) -> &mut Vec<Self> {
        &mut state.measures
    }
}

impl QueryComponent for QueryLevel {
    const COLLECTION: Collection = Collection::Levels;

    fn items(state: &QueryState) -> &Vec<Self> {
        &state.levels
    }

    fn items_mut(state: &mut QueryState) -> &mut Vec<Self> {
        &mut state.levels
    }
}

impl QueryComponent for QueryFilter {
    const COLLECTION: Collection = Collection::Filters;

    fn items(state: &QueryState) -> &Vec<Self> {
        &state.filters
    }

    fn items_mut(state: &mut QueryState) -> &mut Vec<Self> {
        &mut state.filters
    }

    /// At most one filter per level.
    fn validate(existing: &[Self], incoming: &[Self]) -> PietResult<()> {
        for (idx, filter) in incoming.iter().enumerate() {
            let level = filter.level_unique_name.as_str();
            let clash = existing.iter().any(|f| f.level_unique_name == level)
                || incoming[..idx].iter().any(|f| f.level_unique_name == level);
            if clash {
                return Err(PietError::DuplicateFilter {
                    level: level.to_string(),
                });
            }
        }
        Ok(())
    }
}

pub struct Query {
    state: QueryState,
    hooks: Subscribers<QueryHook>,
    edits: EditTracker<QueryState>,
    edit_listeners: Subscribers<EditListener>,
}

impl Query {
    pub fn new(dataset_name: Option<String>) -> Self {
        Self::from_state(QueryState {
            dataset_name,
            ..QueryState::default()
        })
    }

    pub fn for_dataset(dataset: &Dataset) -> Self {
        Self::new(Some(dataset.name().to_string()))
    }

    pub fn from_state(state: QueryState) -> Self {
        Self {
            state,
            hooks: Subscribers::new(),
            edits: EditTracker::new(),
            edit_listeners: Subscribers::new(),
        }
    }

    /// Rejects documents carrying more than one filter for a level.
    pub fn from_json(value: serde_json::Value) -> PietResult<Self> {
        let state: QueryState = serde_json::from_value(value)?;
        state.validate()?;
        Ok(Self::from_state(state))
    }

    pub fn to_json(&self) -> PietResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.state)?)
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn measures(&self) -> &[QueryMeasure] {
        &self.state.measures
    }

    pub fn levels(&self) -> &[QueryLevel] {
        &self.state.levels
    }

    pub fn filters(&self) -> &[QueryFilter] {
        &self.state.filters
    }

    pub fn non_empty(&self) -> bool {
        self.state.non_empty
    }

    pub fn dataset_name(&self) -> Option<&str> {
        self.state.dataset_name.as_deref()
    }

    pub fn row_levels(&self) -> impl Iterator<Item = &QueryLevel> {
        self.state.row_levels()
    }

    pub fn column_levels(&self) -> impl Iterator<Item = &QueryLevel> {
        self.state.column_levels()
    }

    pub fn find_filter(&self, level_unique_name: &str) -> Option<&QueryFilter> {
        self.state.find_filter(level_unique_name)
    }

    pub fn measures_mut(&mut self) -> ComponentEditor<'_, QueryMeasure> {
        ComponentEditor::new(self)
    }

    pub fn levels_mut(&mut self) -> ComponentEditor<'_, QueryLevel> {
        ComponentEditor::new(self)
    }

    pub fn filters_mut(&mut self) -> ComponentEditor<'_, QueryFilter> {
        ComponentEditor::new(self)
    }

    /// Setting the current value is not an edit.
    pub fn set_non_empty(&mut self, non_empty: bool) -> PietResult<()> {
        if self.state.non_empty == non_empty {
            return Ok(());
        }
        self.apply(QueryChange::NonEmpty(non_empty), |state| {
            state.non_empty = non_empty;
            Ok(())
        })
    }

    pub fn subscribe(&mut self, hook: Box<QueryHook>) -> SubscriptionId {
        self.hooks.subscribe(hook)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.hooks.unsubscribe(id)
    }

    pub(crate) fn edit_snapshot(&self) -> Option<&QueryState> {
        self.edits.snapshot()
    }

    /// Reopen an edit session persisted with `snapshot` as its baseline. Fires nothing.
    pub(crate) fn resume_edits(&mut self, snapshot: QueryState) {
        self.edits.begin_with(|| snapshot);
    }

    /// Compile to MDX; `Ok(None)` while the query is not executable yet.
    pub fn as_mdx(&self, dataset: &Dataset) -> PietResult<Option<String>> {
        crate::mdx::compile_mdx(&self.state, dataset)
    }

    fn apply<R>(
        &mut self,
        change: QueryChange,
        mutate: impl FnOnce(&mut QueryState) -> PietResult<R>,
    ) -> PietResult<R> {
        if let Err(err) = self.notify(ChangePhase::WillChange, &change) {
            self.notify_aborted(&change);
            return Err(err);
        }

        let began = self.edits.begin_with(|| self.state.clone());
        if began {
            log::debug!("query edit session started by {change:?}");
        }
        let property = change.property_name();
        let previous = self.state.clone();
        let result = if began {
            dispatch_edit(&mut self.edit_listeners, EditNotice::Begin)
        } else {
            Ok(())
        }
        .and_then(|()| {
            dispatch_edit(
                &mut self.edit_listeners,
                EditNotice::PendingPropertyEdit(property),
            )
        })
        .and_then(|()| mutate(&mut self.state))
        .and_then(|out| self.notify(ChangePhase::Changed, &change).map(|()| out))
        .and_then(|out| {
            dispatch_edit(&mut self.edit_listeners, EditNotice::PropertyEdit(property))
                .map(|()| out)
        });

        if result.is_err() {
            log::warn!("rolling back aborted query change {change:?}");
            self.state = previous;
            if began {
                self.edits.abandon();
            }
            self.notify_aborted(&change);
        }
        result
    }

    fn notify(&mut self, phase: ChangePhase, change: &QueryChange) -> PietResult<()> {
        let notice = QueryNotice {
            phase,
            change,
            query: &self.state,
        };
        log::trace!("{phase:?} {change:?} -> {} hook(s)", self.hooks.len());
        for hook in self.hooks.iter_mut() {
            if let Err(err) = hook(&notice) {
                log::warn!("query hook rejected {change:?} at {phase:?}: {err}");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Every hook hears about the rollback; their errors cannot undo it.
    fn notify_aborted(&mut self, change: &QueryChange) {
        let notice = QueryNotice {
            phase: ChangePhase::Aborted,
            change,
            query: &self.state,
        };
        for hook in self.hooks.iter_mut() {
            if let Err(err) = hook(&notice) {
                log::warn!("query hook failed on aborted {change:?}: {err}");
            }
        }
    }
}

impl Editable for Query {
    fn is_dirty(&self) -> bool {
        self.edits.is_dirty()
    }

    fn checkpoint_edits(&mut self) -> PietResult<()> {
        if self.edits.checkpoint() {
            dispatch_edit(&mut self.edit_listeners, EditNotice::Checkpoint)?;
        }
        Ok(())
    }

    /// Restores the snapshot without running the two-phase hooks; a rollback is not an edit.
    fn cancel_edits(&mut self) -> PietResult<()> {
        let Some(previous) = self.edits.cancel() else {
            return Ok(());
        };
        self.state = previous;
        dispatch_edit(&mut self.edit_listeners, EditNotice::Cancel)
    }

    fn subscribe_edits(&mut self, listener: Box<EditListener>) -> SubscriptionId {
        self.edit_listeners.subscribe(listener)
    }

    fn unsubscribe_edits(&mut self, id: SubscriptionId) -> bool {
        self.edit_listeners.unsubscribe(id)
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("state", &self.state)
            .field("dirty", &self.edits.is_dirty())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Mutating view over one of a query's collections.
pub struct ComponentEditor<'q, T> {
    query: &'q mut Query,
    component: PhantomData<T>,
}

impl<'q, T: QueryComponent> ComponentEditor<'q, T> {
    fn new(query: &'q mut Query) -> Self {
        Self {
            query,
            component: PhantomData,
        }
    }

    pub fn items(&self) -> &[T] {
        T::items(&self.query.state)
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items().get(index)
    }

    fn change(change: ListChange) -> QueryChange {
        QueryChange::List {
            collection: T::COLLECTION,
            change,
        }
    }

    fn check_index(&self, index: usize) -> PietResult<()> {
        let len = self.len();
        if index >= len {
            return Err(PietError::IndexOutOfBounds { index, len });
        }
        Ok(())
    }

    pub fn add(&mut self, item: T) -> PietResult<()> {
        T::validate(self.items(), std::slice::from_ref(&item))?;
        let index = self.len();
        self.query
            .apply(Self::change(ListChange::Add { index }), move |state| {
                T::items_mut(state).push(item);
                Ok(())
            })
    }

    /// Appends in order; returns the number of items added.
    pub fn add_all(&mut self, items: Vec<T>) -> PietResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        T::validate(self.items(), &items)?;
        let index = self.len();
        let count = items.len();
        self.query.apply(
            Self::change(ListChange::AddAll { index, count }),
            move |state| {
                T::items_mut(state).extend(items);
                Ok(count)
            },
        )
    }

    pub fn remove_at(&mut self, index: usize) -> PietResult<T> {
        self.check_index(index)?;
        self.query
            .apply(Self::change(ListChange::Remove { index }), move |state| {
                Ok(T::items_mut(state).remove(index))
            })
    }

    /// Remove the first item equal to `item`; `Ok(false)` (and no notification) when absent.
    pub fn remove(&mut self, item: &T) -> PietResult<bool> {
        match self.items().iter().position(|existing| existing == item) {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Atomically replace the whole collection.
    pub fn set(&mut self, items: Vec<T>) -> PietResult<usize> {
        T::validate(&[], &items)?;
        let len = items.len();
        self.query
            .apply(Self::change(ListChange::Set { len }), move |state| {
                *T::items_mut(state) = items;
                Ok(len)
            })
    }

    /// Returns the number of items removed.
    pub fn clear(&mut self) -> PietResult<usize> {
        let removed = self.len();
        self.query
            .apply(Self::change(ListChange::Clear { removed }), move |state| {
                T::items_mut(state).clear();
                Ok(removed)
            })
    }

    /// Edit one component in place.
    pub fn update<R>(&mut self, index: usize, edit: impl FnOnce(&mut T) -> R) -> PietResult<R> {
        self.check_index(index)?;
        self.query
            .apply(Self::change(ListChange::Update { index }), move |state| {
                let items = T::items_mut(state);
                let mut item = items[index].clone();
                let out = edit(&mut item);
                let mut others = items.clone();
                others.remove(index);
                T::validate(&others, std::slice::from_ref(&item))?;
                items[index] = item;
                Ok(out)
            })
    }
}

impl ComponentEditor<'_, QueryFilter> {
    pub fn position_for_level(&self, level_unique_name: &str) -> Option<usize> {
        self.items()
            .iter()
            .position(|f| f.level_unique_name == level_unique_name)
    }

    /// Replace the filter for `filter`'s level, or append it when the level has none.
    pub fn put(&mut self, filter: QueryFilter) -> PietResult<()> {
        match self.position_for_level(&filter.level_unique_name) {
            Some(index) => self.update(index, move |existing| *existing = filter),
            None => self.add(filter),
        }
    }

    pub fn remove_for_level(&mut self, level_unique_name: &str) -> PietResult<Option<QueryFilter>> {
        match self.position_for_level(level_unique_name) {
            Some(index) => self.remove_at(index).map(Some),
            None => Ok(None),
        }
    }
}
