//! Read-only dataset (cube) metadata.
//!
//! A [`Dataset`] describes one cube: its dimensions, their hierarchies, each hierarchy's levels
//! ordered from the root (coarsest) to the leaf (finest), and the cube's measures. Everything is
//! addressed by MDX unique name, and the query model joins to this metadata on those names.
//!
//! Datasets are loaded from the JSON produced by mondrian-rest's `getMetadata` endpoint (one
//! dataset per cube) via [`Dataset::load_from_metadata`].

use crate::error::{PietError, PietResult, ReferenceKind};
use serde::Deserialize;
use std::collections::HashMap;

/// Name of the synthetic dimension that carries the cube's measures.
pub const MEASURES_DIMENSION: &str = "Measures";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Measure {
    pub name: String,
    pub unique_name: String,
    pub caption: Option<String>,
    pub visible: bool,
    pub calculated: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Level {
    pub name: String,
    pub unique_name: String,
    pub caption: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hierarchy {
    pub name: String,
    pub unique_name: String,
    pub caption: Option<String>,
    pub has_all: bool,
    /// Root-to-leaf order.
    pub levels: Vec<Level>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub unique_name: String,
    pub caption: Option<String>,
    pub dimension_type: Option<String>,
    pub hierarchies: Vec<Hierarchy>,
}

/// Where a level sits inside the dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LevelSlot {
    dimension: usize,
    hierarchy: usize,
    depth: usize,
}

/// A level resolved against its hierarchy.
#[derive(Clone, Copy, Debug)]
pub struct LevelPosition<'a> {
    pub hierarchy: &'a Hierarchy,
    pub level: &'a Level,
    /// Index in `hierarchy.levels`; 0 is the root.
    pub depth: usize,
}

#[derive(Clone, Debug)]
pub struct Dataset {
    id: String,
    name: String,
    description: Option<String>,
    schema_name: Option<String>,
    measure_group_name: Option<String>,
    dimensions: Vec<Dimension>,
    measures: Vec<Measure>,
    levels: HashMap<String, LevelSlot>,
    hierarchies: HashMap<String, (usize, usize)>,
    measure_index: HashMap<String, usize>,
}

impl Dataset {
    /// Build a dataset, indexing every unique name.
    ///
    /// Duplicate unique names are rejected since lookups would otherwise be ambiguous.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        dimensions: Vec<Dimension>,
        measures: Vec<Measure>,
    ) -> PietResult<Self> {
        let name = name.into();
        let mut levels = HashMap::new();
        let mut hierarchies = HashMap::new();
        let mut measure_index = HashMap::new();

        for (d, dimension) in dimensions.iter().enumerate() {
            for (h, hierarchy) in dimension.hierarchies.iter().enumerate() {
                if hierarchies
                    .insert(hierarchy.unique_name.clone(), (d, h))
                    .is_some()
                {
                    return Err(duplicate(&name, &hierarchy.unique_name));
                }
                for (depth, level) in hierarchy.levels.iter().enumerate() {
                    let slot = LevelSlot {
                        dimension: d,
                        hierarchy: h,
                        depth,
                    };
                    if levels.insert(level.unique_name.clone(), slot).is_some() {
                        return Err(duplicate(&name, &level.unique_name));
                    }
                }
            }
        }
        for (idx, measure) in measures.iter().enumerate() {
            if measure_index
                .insert(measure.unique_name.clone(), idx)
                .is_some()
            {
                return Err(duplicate(&name, &measure.unique_name));
            }
        }

        Ok(Self {
            id: id.into(),
            name,
            description: None,
            schema_name: None,
            measure_group_name: None,
            dimensions,
            measures,
            levels,
            hierarchies,
            measure_index,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_schema_name(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = Some(schema_name.into());
        self
    }

    /// Narrows the dataset to one measure group of a virtual cube.
    pub fn with_measure_group_name(mut self, measure_group_name: impl Into<String>) -> Self {
        self.measure_group_name = Some(measure_group_name.into());
        self
    }

    /// Parse mondrian-rest metadata JSON into one dataset per cube.
    pub fn load_from_metadata(json: &str, id: &str) -> PietResult<Vec<Dataset>> {
        let schema: SchemaMetadata = serde_json::from_str(json)?;
        schema
            .cubes
            .into_iter()
            .map(|cube| cube.into_dataset(id, schema.name.as_deref()))
            .collect()
    }

    /// Metadata source identifier (the mondrian-rest metadata URL).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cube name; the `FROM` target of compiled MDX.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    pub fn measure_group_name(&self) -> Option<&str> {
        self.measure_group_name.as_deref()
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn find_measure(&self, unique_name: &str) -> Option<&Measure> {
        self.measure_index
            .get(unique_name)
            .map(|&idx| &self.measures[idx])
    }

    pub fn find_hierarchy(&self, unique_name: &str) -> Option<&Hierarchy> {
        self.hierarchies
            .get(unique_name)
            .map(|&(d, h)| &self.dimensions[d].hierarchies[h])
    }

    pub fn find_level(&self, unique_name: &str) -> Option<&Level> {
        self.level_position(unique_name).map(|pos| pos.level)
    }

    pub fn hierarchy_of_level(&self, level_unique_name: &str) -> Option<&Hierarchy> {
        self.level_position(level_unique_name)
            .map(|pos| pos.hierarchy)
    }

    pub fn level_position(&self, unique_name: &str) -> Option<LevelPosition<'_>> {
        let slot = self.levels.get(unique_name)?;
        let hierarchy = &self.dimensions[slot.dimension].hierarchies[slot.hierarchy];
        Some(LevelPosition {
            hierarchy,
            level: &hierarchy.levels[slot.depth],
            depth: slot.depth,
        })
    }

    pub(crate) fn require_level(&self, unique_name: &str) -> PietResult<LevelPosition<'_>> {
        self.level_position(unique_name).ok_or_else(|| {
            log::warn!("level {unique_name} does not resolve in dataset {}", self.name);
            PietError::unresolved(ReferenceKind::Level, unique_name)
        })
    }

    pub(crate) fn require_measure(&self, unique_name: &str) -> PietResult<&Measure> {
        self.find_measure(unique_name).ok_or_else(|| {
            log::warn!("measure {unique_name} does not resolve in dataset {}", self.name);
            PietError::unresolved(ReferenceKind::Measure, unique_name)
        })
    }
}

fn duplicate(dataset: &str, unique_name: &str) -> PietError {
    PietError::InvalidMetadata(format!(
        "duplicate unique name {unique_name} in dataset {dataset}"
    ))
}

/// `[a].[b]` path form used for unique names the metadata does not spell out.
fn bracket_path(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| format!("[{p}]"))
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Deserialize)]
struct SchemaMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    cubes: Vec<CubeMetadata>,
}

#[derive(Debug, Deserialize)]
struct CubeMetadata {
    name: String,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    measures: Vec<MeasureMetadata>,
    #[serde(default)]
    dimensions: Vec<DimensionMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeasureMetadata {
    name: String,
    #[serde(default)]
    unique_name: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default)]
    calculated: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DimensionMetadata {
    name: String,
    #[serde(default)]
    unique_name: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default, rename = "type")]
    dimension_type: Option<String>,
    #[serde(default)]
    hierarchies: Vec<HierarchyMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HierarchyMetadata {
    name: String,
    #[serde(default)]
    unique_name: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default = "default_true")]
    has_all: bool,
    #[serde(default)]
    levels: Vec<LevelMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LevelMetadata {
    name: String,
    #[serde(default)]
    unique_name: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

const fn default_true() -> bool {
    true
}

impl CubeMetadata {
    fn into_dataset(self, id: &str, schema_name: Option<&str>) -> PietResult<Dataset> {
        let measures = self
            .measures
            .into_iter()
            .map(|m| Measure {
                unique_name: m
                    .unique_name
                    .unwrap_or_else(|| bracket_path(&[MEASURES_DIMENSION, m.name.as_str()])),
                name: m.name,
                caption: m.caption,
                visible: m.visible,
                calculated: m.calculated,
            })
            .collect();

        let dimensions = self
            .dimensions
            .into_iter()
            .filter(|d| !is_measures_dimension(d))
            .map(DimensionMetadata::into_dimension)
            .collect();

        let mut dataset = Dataset::new(id, self.name, dimensions, measures)?;
        dataset.description = self.caption;
        dataset.schema_name = schema_name.map(str::to_string);
        Ok(dataset)
    }
}

fn is_measures_dimension(dimension: &DimensionMetadata) -> bool {
    dimension.name == MEASURES_DIMENSION
        || dimension
            .dimension_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("MEASURE"))
}

impl DimensionMetadata {
    fn into_dimension(self) -> Dimension {
        let dimension_name = self.name;
        let hierarchies = self
            .hierarchies
            .into_iter()
            .map(|h| {
                let hierarchy_unique = h
                    .unique_name
                    .unwrap_or_else(|| bracket_path(&[dimension_name.as_str(), h.name.as_str()]));
                let levels = h
                    .levels
                    .into_iter()
                    .map(|l| Level {
                        unique_name: l
                            .unique_name
                            .unwrap_or_else(|| bracket_path(&[
                            dimension_name.as_str(),
                            h.name.as_str(),
                            l.name.as_str(),
                        ])),
                        name: l.name,
                        caption: l.caption,
                    })
                    .collect();
                Hierarchy {
                    name: h.name,
                    unique_name: hierarchy_unique,
                    caption: h.caption,
                    has_all: h.has_all,
                    levels,
                }
            })
            .collect();

        Dimension {
            unique_name: self
                .unique_name
                .unwrap_or_else(|| bracket_path(&[dimension_name.as_str()])),
            name: dimension_name,
            caption: self.caption,
            dimension_type: self.dimension_type,
            hierarchies,
        }
    }
}
