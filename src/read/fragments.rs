//! Fragment Expander
//!
//! Flattens fragment spreads and inline fragments of one selection level into
//! the ordered list of fields that apply to a concrete type.

use crate::document::{Field, FragmentDefinition, Selection, SelectionSet};
use crate::error::ReadError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supertype (interface or union) -> concrete subtypes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PossibleTypes(HashMap<String, Vec<String>>);

impl PossibleTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subtypes<I, S>(mut self, supertype: impl Into<String>, subtypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(supertype.into())
            .or_default()
            .extend(subtypes.into_iter().map(Into::into));
        self
    }

    /// Whether a fragment on `condition` applies to a record of `typename`.
    pub fn matches(&self, condition: &str, typename: &str) -> bool {
        condition == typename
            || self
                .0
                .get(condition)
                .is_some_and(|subtypes| subtypes.iter().any(|s| s == typename))
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

impl From<HashMap<String, Vec<String>>> for PossibleTypes {
    fn from(map: HashMap<String, Vec<String>>) -> Self {
        PossibleTypes(map)
    }
}

/// Expand `selection_set` against `typename`.
///
/// Fields keep their first-seen position; a later field with the same response
/// key replaces the earlier one. A typed fragment never applies when the
/// typename is unknown.
pub fn expand_selections<'a>(
    selection_set: &'a SelectionSet,
    typename: Option<&str>,
    fragments: &'a HashMap<String, FragmentDefinition>,
    possible_types: &PossibleTypes,
) -> Result<Vec<&'a Field>, ReadError> {
    let mut fields = Vec::new();
    let mut active_spreads = Vec::new();
    collect(
        selection_set,
        typename,
        fragments,
        possible_types,
        &mut active_spreads,
        &mut fields,
    )?;
    Ok(fields)
}

fn collect<'a>(
    selection_set: &'a SelectionSet,
    typename: Option<&str>,
    fragments: &'a HashMap<String, FragmentDefinition>,
    possible_types: &PossibleTypes,
    active_spreads: &mut Vec<&'a str>,
    out: &mut Vec<&'a Field>,
) -> Result<(), ReadError> {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => push_field(out, field),
            Selection::InlineFragment(inline) => {
                if applies(inline.type_condition.as_deref(), typename, possible_types) {
                    collect(
                        &inline.selection_set,
                        typename,
                        fragments,
                        possible_types,
                        active_spreads,
                        out,
                    )?;
                }
            }
            Selection::FragmentSpread(spread) => {
                let definition = fragments
                    .get(&spread.name)
                    .ok_or_else(|| ReadError::UnknownFragment(spread.name.clone()))?;
                // Cyclic spreads are invalid documents; stop instead of recursing forever.
                if active_spreads.contains(&definition.name.as_str()) {
                    continue;
                }
                if applies(Some(&definition.type_condition), typename, possible_types) {
                    active_spreads.push(&definition.name);
                    collect(
                        &definition.selection_set,
                        typename,
                        fragments,
                        possible_types,
                        active_spreads,
                        out,
                    )?;
                    active_spreads.pop();
                }
            }
        }
    }
    Ok(())
}

fn applies(condition: Option<&str>, typename: Option<&str>, possible_types: &PossibleTypes) -> bool {
    match (condition, typename) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(condition), Some(typename)) => possible_types.matches(condition, typename),
    }
}

fn push_field<'a>(out: &mut Vec<&'a Field>, field: &'a Field) {
    match out
        .iter_mut()
        .find(|existing| existing.response_key() == field.response_key())
    {
        Some(existing) => *existing = field,
        None => out.push(field),
    }
}
