//! Tool-call reconciliation.
//!
//! Providers stream a tool call as a header fragment (ordinal `index`, `id`,
//! function name) followed by argument fragments that usually carry only the
//! index.  Some providers reuse an index to continue a call that was first
//! announced elsewhere, so the table keeps two indexes over one arena of
//! states:
//!
//! - `by_ordinal` maps the provider's index to the arena slot currently
//!   bound to it (primary);
//! - `by_id` maps a provider-assigned identifier to its slot (lookaside).
//!
//! A separate `started` set makes [`StreamEvent::ToolUseStart`] idempotent
//! per identifier.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::llm::chunk::ToolCallFragment;
use crate::llm::types::{StreamEvent, ToolCall};

/// One tool call being assembled from fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallState {
    pub id: String,
    pub name: String,
    /// Append-only argument text.
    pub arguments: String,
    pub call_type: String,
    pub finished: bool,
}

impl ToolCallState {
    fn to_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            input: self.arguments.clone(),
            call_type: self.call_type.clone(),
            finished: true,
        }
    }
}

/// Dual-indexed arena of tool-call states for one stream.
#[derive(Debug, Default)]
pub struct ToolCallTable {
    states: Vec<ToolCallState>,
    by_ordinal: BTreeMap<u32, usize>,
    by_id: HashMap<String, usize>,
    started: HashSet<String>,
}

impl ToolCallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any tool call is reachable from an ordinal slot.
    pub fn is_empty(&self) -> bool {
        self.by_ordinal.is_empty()
    }

    /// Merge one fragment.  Returns a start event the first time an
    /// identifier is seen; argument growth is silent.
    pub fn apply(&mut self, fragment: &ToolCallFragment) -> Option<StreamEvent> {
        let Some(&slot) = self.by_ordinal.get(&fragment.index) else {
            return self.start(fragment);
        };

        match fragment.id() {
            Some(id) if id != self.states[slot].id => match self.by_id.get(id).copied() {
                // The provider continues a known call under a different index.
                Some(known) => {
                    self.states[known].arguments.push_str(fragment.arguments());
                    self.by_ordinal.insert(fragment.index, known);
                    None
                }
                // Unseen id: the slot is overwritten and its old state is no
                // longer reachable.
                None => self.start(fragment),
            },
            _ => {
                self.states[slot].arguments.push_str(fragment.arguments());
                None
            }
        }
    }

    fn start(&mut self, fragment: &ToolCallFragment) -> Option<StreamEvent> {
        let (Some(id), Some(name)) = (fragment.id(), fragment.name()) else {
            tracing::debug!(
                index = fragment.index,
                id = fragment.id().unwrap_or(""),
                "dropping tool call fragment without id and name"
            );
            return None;
        };

        // A repeated header at a fresh index rebinds to the existing call so
        // identifiers stay unique within the response.
        if let Some(&known) = self.by_id.get(id) {
            self.states[known].arguments.push_str(fragment.arguments());
            self.by_ordinal.insert(fragment.index, known);
            return None;
        }

        let slot = self.states.len();
        self.states.push(ToolCallState {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments: fragment.arguments().to_owned(),
            call_type: fragment
                .call_type
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "function".to_owned()),
            finished: false,
        });
        self.by_ordinal.insert(fragment.index, slot);
        self.by_id.insert(id.to_owned(), slot);

        if self.started.insert(id.to_owned()) {
            Some(StreamEvent::ToolUseStart {
                id: id.to_owned(),
                name: name.to_owned(),
            })
        } else {
            None
        }
    }

    /// Mark every tracked call finished.  Emits nothing.
    pub fn mark_all_finished(&mut self) {
        for state in &mut self.states {
            state.finished = true;
        }
    }

    /// Look up a call by identifier.
    pub fn get(&self, id: &str) -> Option<&ToolCallState> {
        self.by_id.get(id).map(|&slot| &self.states[slot])
    }

    /// Reachable calls in ordinal order, each listed once, rendered as
    /// finished records.
    pub fn finished_calls(&self) -> Vec<ToolCall> {
        let mut seen = HashSet::new();
        self.by_ordinal
            .values()
            .filter(|slot| seen.insert(**slot))
            .map(|&slot| self.states[slot].to_tool_call())
            .collect()
    }
}
