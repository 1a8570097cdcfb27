use context_protocol::{HoverContext, Location, Position, Uri};
use std::time::Duration;
use tokio::time::Instant;

/// A symbol-bounded part of a document, as reported by a [`crate::SymbolProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSection {
    pub fuzzy_name: Option<String>,
    pub location: Location,
}

/// Hydration state of one section.
///
/// ```text
/// Unhydrated ──enter──> Loading ──ok──> Hydrated ──edit/reload──> Stale
///      ^                   │                │                       │
///      └──────error────────┘                └───enter after 1 min───┴──> Loading (keeps data)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SectionState {
    Unhydrated,
    Loading {
        since: Instant,
        /// Context served while the refresh is pending
        previous: Option<Vec<HoverContext>>,
        /// Marked dirty while loading; the result lands as `Stale`
        stale: bool,
    },
    Hydrated {
        context: Vec<HoverContext>,
        since: Instant,
    },
    Stale {
        context: Vec<HoverContext>,
        since: Instant,
    },
}

impl SectionState {
    pub fn is_hydrated(&self) -> bool {
        !matches!(self, Self::Unhydrated)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. } | Self::Loading { stale: true, .. })
    }

    /// Context to serve right now, including stale or still-refreshing data.
    pub fn graph_context(&self) -> Option<&[HoverContext]> {
        match self {
            Self::Hydrated { context, .. } | Self::Stale { context, .. } => Some(context),
            Self::Loading { previous, .. } => previous.as_deref(),
            Self::Unhydrated => None,
        }
    }

    /// `in_flight` tells whether a fetch for this section is still running; a `Loading` section
    /// whose fetch was abandoned is refreshed on the next visit.
    pub fn needs_refresh(&self, now: Instant, max_age: Duration, in_flight: bool) -> bool {
        match self {
            Self::Unhydrated | Self::Stale { .. } => true,
            Self::Hydrated { since, .. } => now.duration_since(*since) > max_age,
            Self::Loading { .. } => !in_flight,
        }
    }

    pub fn begin_loading(&mut self, now: Instant) {
        let previous = match std::mem::replace(self, Self::Unhydrated) {
            Self::Hydrated { context, .. } | Self::Stale { context, .. } => Some(context),
            Self::Loading { previous, .. } => previous,
            Self::Unhydrated => None,
        };
        *self = Self::Loading {
            since: now,
            previous,
            stale: false,
        };
    }

    /// Returns false when the section was not loading (the result is then dropped).
    pub fn finish_loading(&mut self, context: Vec<HoverContext>) -> bool {
        let Self::Loading { since, stale, .. } = *self else {
            return false;
        };
        *self = if stale {
            Self::Stale { context, since }
        } else {
            Self::Hydrated { context, since }
        };
        true
    }

    pub fn fail(&mut self) {
        *self = Self::Unhydrated;
    }

    pub fn mark_stale(&mut self) {
        match std::mem::replace(self, Self::Unhydrated) {
            Self::Hydrated { context, since } | Self::Stale { context, since } => {
                *self = Self::Stale { context, since };
            }
            Self::Loading { since, previous, .. } => {
                *self = Self::Loading {
                    since,
                    previous,
                    stale: true,
                };
            }
            Self::Unhydrated => {}
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Section {
    pub fuzzy_name: Option<String>,
    pub location: Location,
    pub state: SectionState,
}

impl Section {
    pub fn name(&self) -> &str {
        self.fuzzy_name.as_deref().unwrap_or("unknown")
    }
}

impl From<DocumentSection> for Section {
    fn from(section: DocumentSection) -> Self {
        Self {
            fuzzy_name: section.fuzzy_name,
            location: section.location,
            state: SectionState::Unhydrated,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ActiveDocument {
    pub uri: Uri,
    pub language_id: String,
    pub sections: Vec<Section>,
    pub last_revalidate_at: Instant,
    pub last_lines: u32,
}

impl ActiveDocument {
    pub fn section_at(&self, position: Position) -> Option<&Section> {
        self.sections
            .iter()
            .find(|section| section.location.range.contains(position))
    }

    pub fn section_at_mut(&mut self, position: Position) -> Option<&mut Section> {
        self.sections
            .iter_mut()
            .find(|section| section.location.range.contains(position))
    }

    pub fn section_by_key(&self, key: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.location.key() == key)
    }

    pub fn section_by_key_mut(&mut self, key: &str) -> Option<&mut Section> {
        self.sections
            .iter_mut()
            .find(|section| section.location.key() == key)
    }

    /// Merge freshly computed sections by location key. Surviving sections keep their context,
    /// are marked stale and take the new range; vanished ones are dropped; new ones are appended.
    pub fn merge_sections(&mut self, fresh: Vec<DocumentSection>) {
        let mut fresh_by_key: Vec<(String, DocumentSection)> = fresh
            .into_iter()
            .map(|section| (section.location.key(), section))
            .collect();

        self.sections.retain_mut(|existing| {
            let key = existing.location.key();
            let Some((_, updated)) = fresh_by_key.iter().find(|(k, _)| *k == key) else {
                return false;
            };
            existing.location = updated.location.clone();
            existing.fuzzy_name = updated.fuzzy_name.clone();
            existing.state.mark_stale();
            true
        });

        fresh_by_key.retain(|(key, _)| self.section_by_key(key).is_none());
        self.sections
            .extend(fresh_by_key.into_iter().map(|(_, section)| Section::from(section)));
    }
}
