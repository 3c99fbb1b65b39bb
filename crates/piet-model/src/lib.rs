mod analysis;
mod dataset;
mod edit;
mod error;
mod events;
mod mdx;
mod observable;
mod query;
mod settings;

pub use crate::analysis::{Analysis, AnalysisCheckpoint, AnalysisDocument, DatasetRef};
pub use crate::dataset::{
    Dataset, Dimension, Hierarchy, Level, LevelPosition, Measure, MEASURES_DIMENSION,
};
pub use crate::mdx::compile_mdx;
pub use crate::query::{
    ChangePhase, Collection, ComponentEditor, ListChange, Query, QueryChange, QueryComponent,
    QueryFilter, QueryHook, QueryLevel, QueryMeasure, QueryNotice, QueryState,
};
pub use crate::settings::{Settings, SettingsDocument, TableFontIncrease};

pub use crate::edit::{EditTracker, Editable};
pub use crate::events::{EditListener, EditNotice, Subscribers, SubscriptionId};
pub use crate::observable::{ChangeListener, Observable, ValueChange};

pub use crate::error::{PietError, PietResult, ReferenceKind};
