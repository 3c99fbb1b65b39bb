//! MDX statement generation.
//!
//! The compiler is a pure function of the query state and the dataset it is compiled against:
//! set order is insertion order except for levels that share a hierarchy, which are grouped into
//! a single `Hierarchize` block in the dataset's root-to-leaf order.

use crate::dataset::{Dataset, LevelPosition};
use crate::error::{PietError, PietResult};
use crate::query::{QueryFilter, QueryLevel, QueryState};

/// Compile `query` into an MDX `SELECT` against `dataset`.
///
/// Returns `Ok(None)` while the query has no measures or no row levels.
pub fn compile_mdx(query: &QueryState, dataset: &Dataset) -> PietResult<Option<String>> {
    MdxCompiler::new(query, dataset).compile()
}

struct MdxCompiler<'a> {
    query: &'a QueryState,
    dataset: &'a Dataset,
}

/// A query level resolved against the dataset.
struct ResolvedLevel<'a> {
    level: &'a QueryLevel,
    position: LevelPosition<'a>,
}

impl<'a> MdxCompiler<'a> {
    fn new(query: &'a QueryState, dataset: &'a Dataset) -> Self {
        Self { query, dataset }
    }

    fn compile(&self) -> PietResult<Option<String>> {
        if let Some(name) = self.query.dataset_name.as_deref() {
            if name != self.dataset.name() {
                return Err(PietError::DatasetMismatch {
                    query: name.to_string(),
                    dataset: self.dataset.name().to_string(),
                });
            }
        }

        for measure in &self.query.measures {
            self.dataset.require_measure(measure.unique_name())?;
        }
        for filter in &self.query.filters {
            self.dataset.require_level(filter.level_unique_name())?;
        }
        let mut column_levels = Vec::new();
        let mut row_levels = Vec::new();
        for level in &self.query.levels {
            let resolved = ResolvedLevel {
                level,
                position: self.dataset.require_level(level.unique_name())?,
            };
            if level.row_orientation() {
                row_levels.push(resolved);
            } else {
                column_levels.push(resolved);
            }
        }

        if self.query.measures.is_empty() || row_levels.is_empty() {
            return Ok(None);
        }

        let measures = format!(
            "{{{}}}",
            self.query
                .measures
                .iter()
                .map(|m| m.unique_name())
                .collect::<Vec<_>>()
                .join(",")
        );
        let columns = match self.levels(column_levels) {
            None => measures,
            Some(levels) => {
                let prefix = if self.query.non_empty { "NonEmpty" } else { "" };
                format!("{prefix}CrossJoin({levels},{measures})")
            }
        };
        // `row_levels` is non-empty here.
        let rows = self.levels(row_levels).unwrap_or_default();

        let non_empty = if self.query.non_empty { "NON EMPTY " } else { "" };
        let mdx = format!(
            "SELECT {non_empty}{columns} ON COLUMNS, {non_empty}{rows} ON ROWS FROM [{}]",
            self.dataset.name()
        );
        log::debug!("compiled MDX for {}: {mdx}", self.dataset.name());
        Ok(Some(mdx))
    }

    fn join_verb(&self) -> &'static str {
        if self.query.non_empty {
            "NonEmptyCrossJoin"
        } else {
            "CrossJoin"
        }
    }

    fn levels(&self, mut levels: Vec<ResolvedLevel<'a>>) -> Option<String> {
        match levels.len() {
            0 => return None,
            1 => return Some(format!("{{{}}}", self.member_set(levels[0].level))),
            _ => {}
        }

        let first = levels.remove(0);
        let hierarchy = first.position.hierarchy.unique_name.as_str();
        let (mut siblings, rest): (Vec<_>, Vec<_>) = levels
            .into_iter()
            .partition(|l| l.position.hierarchy.unique_name == hierarchy);

        if siblings.is_empty() {
            let first_set = self.member_set(first.level);
            let rest = self.levels(rest).unwrap_or_default();
            return Some(format!("{}({{{first_set}}},{rest})", self.join_verb()));
        }

        siblings.insert(0, first);
        siblings.sort_by_key(|l| l.position.depth);
        let block = self.sibling_block(&siblings);
        Some(match self.levels(rest) {
            None => block,
            Some(rest) => format!("{}({block},{rest})", self.join_verb()),
        })
    }

    /// `Hierarchize` over levels of one hierarchy, ordered root to leaf.
    fn sibling_block(&self, siblings: &[ResolvedLevel<'_>]) -> String {
        let filtered: Vec<Option<String>> = siblings
            .iter()
            .map(|l| self.filtered_set(l.level))
            .collect();

        let mut scoped = false;
        let mut entries = Vec::with_capacity(siblings.len());
        for (idx, sibling) in siblings.iter().enumerate() {
            let entry = match &filtered[idx] {
                Some(set) => set.clone(),
                None => {
                    let mut set = format!("{}.Members", sibling.level.unique_name());
                    for coarser in filtered[..idx].iter().rev().flatten() {
                        set = format!("Exists({{{set}}},{{{coarser}}})");
                        scoped = true;
                    }
                    set
                }
            };
            entries.push(format!("{{{entry}}}"));
        }

        let block = format!("Hierarchize({{{}}})", entries.join(","));
        if scoped {
            format!("VisualTotals({block})")
        } else {
            block
        }
    }

    fn member_set(&self, level: &QueryLevel) -> String {
        self.filtered_set(level)
            .unwrap_or_else(|| format!("{}.Members", level.unique_name()))
    }

    /// The member set of an active filter on `level`, if there is one.
    fn filtered_set(&self, level: &QueryLevel) -> Option<String> {
        let filter = self
            .query
            .find_filter(level.unique_name())
            .filter(|f| f.is_active())?;
        Some(filter_set(filter))
    }
}

fn filter_set(filter: &QueryFilter) -> String {
    let level = filter.level_unique_name();
    let members = filter
        .member_names()
        .iter()
        .map(|name| member(level, name))
        .collect::<Vec<_>>()
        .join(",");
    if filter.include() {
        members
    } else {
        format!("Except({level}.Members,{{{members}}})")
    }
}

fn member(level: &str, name: &str) -> String {
    format!("{level}.[{}]", name.replace(']', "]]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_brackets_in_member_names_are_doubled() {
        assert_eq!(
            member("[Store].[Stores].[Store City]", "Odd]Name"),
            "[Store].[Stores].[Store City].[Odd]]Name]"
        );
    }

    #[test]
    fn exclude_filter_wraps_members_in_except() {
        let filter = QueryFilter::excluding("[Store Type].[Store Type].[Store Type]", ["Gourmet"]);
        assert_eq!(
            filter_set(&filter),
            "Except([Store Type].[Store Type].[Store Type].Members,\
             {[Store Type].[Store Type].[Store Type].[Gourmet]})"
        );
    }
}
