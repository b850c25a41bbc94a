//! Conversions between pivot selections, shop id lists and the canonical
//! [`OverrideDocument`].
//!
//! All transforms are pure and driven by an [`IdentityIndex`] snapshot. Ids
//! that do not resolve are dropped and reported, never turned into a zero or
//! null mapping.

mod legacy;

pub use legacy::{parse_stored_override, StoredOverride};

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;

use crate::identity::IdentityIndex;
use crate::models::{
    DocumentMetadata, ExternalId, InternalId, OverrideDocument, OverrideSource, PrimaryFallback,
    Resolution, Selection,
};

/// Why an id was left out of a converted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No mapping was ever configured
    Unmapped,
    /// The mapping exists but was deactivated
    Deactivated,
}

/// A converted document plus everything that was left out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    pub document: OverrideDocument,
    /// Catalog ids that have no active external id in the shop
    pub unresolved_internal: Vec<(InternalId, DropReason)>,
    /// Shop ids the catalog does not recognize
    pub unresolved_external: Vec<(ExternalId, DropReason)>,
    /// Shop root categories skipped on the way in
    pub skipped_roots: Vec<ExternalId>,
}

impl ConversionReport {
    pub fn has_drops(&self) -> bool {
        !self.unresolved_internal.is_empty() || !self.unresolved_external.is_empty()
    }

    /// Human-readable audit lines for the job record.
    pub fn warnings(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (id, reason) in &self.unresolved_internal {
            lines.push(format!(
                "catalog id {id} dropped: {}",
                describe_reason(*reason, "no external mapping")
            ));
        }
        for (id, reason) in &self.unresolved_external {
            lines.push(format!(
                "shop id {id} dropped: {}",
                describe_reason(*reason, "not recognized by the catalog")
            ));
        }
        if let Some(fallback) = self.document.metadata.primary_fallback {
            match fallback.requested {
                Some(requested) => lines.push(format!(
                    "primary {requested} unavailable, fell back to {}",
                    fallback.used
                )),
                None => lines.push(format!("no primary designated, using {}", fallback.used)),
            }
        }
        lines
    }
}

const fn describe_reason(reason: DropReason, unmapped: &'static str) -> &'static str {
    match reason {
        DropReason::Unmapped => unmapped,
        DropReason::Deactivated => "mapping deactivated",
    }
}

/// Build a document from catalog ids (the pivot-row shape).
pub fn from_pivot_selection(
    internal_ids: &[InternalId],
    primary: Option<InternalId>,
    index: &IdentityIndex,
    source: OverrideSource,
) -> ConversionReport {
    let mut items = Vec::new();
    let mut mappings = BTreeMap::new();
    let mut unresolved_internal = Vec::new();

    for internal_id in dedup(internal_ids) {
        match index.resolve_external(internal_id) {
            Resolution::Mapped(external_id) => {
                tracing::debug!(%internal_id, %external_id, "Resolved catalog id");
                items.push(internal_id);
                mappings.insert(internal_id, external_id);
            }
            Resolution::Inactive(_) => {
                tracing::warn!(%internal_id, shop_id = ?index.shop_id(), "Dropping catalog id with deactivated mapping");
                unresolved_internal.push((internal_id, DropReason::Deactivated));
            }
            Resolution::Unmapped => {
                tracing::warn!(%internal_id, shop_id = ?index.shop_id(), "Dropping unmapped catalog id");
                unresolved_internal.push((internal_id, DropReason::Unmapped));
            }
        }
    }

    let document = assemble(items, mappings, primary, source);
    ConversionReport {
        document,
        unresolved_internal,
        unresolved_external: Vec::new(),
        skipped_roots: Vec::new(),
    }
}

/// Build a document from the id list a shop reports.
///
/// `roots` are the shop's root categories; they are skipped without being
/// reported as unrecognized.
pub fn from_external_selection(
    external_ids: &[ExternalId],
    default_external: Option<ExternalId>,
    roots: &[ExternalId],
    index: &IdentityIndex,
) -> ConversionReport {
    let mut items = Vec::new();
    let mut mappings = BTreeMap::new();
    let mut unresolved_external = Vec::new();
    let mut skipped_roots = Vec::new();

    for external_id in dedup(external_ids) {
        if roots.contains(&external_id) {
            skipped_roots.push(external_id);
            continue;
        }
        match index.resolve_internal(external_id) {
            Resolution::Mapped(internal_id) => {
                items.push(internal_id);
                mappings.insert(internal_id, external_id);
            }
            Resolution::Inactive(_) => {
                tracing::warn!(%external_id, shop_id = ?index.shop_id(), "Shop reports id with deactivated mapping");
                unresolved_external.push((external_id, DropReason::Deactivated));
            }
            Resolution::Unmapped => {
                tracing::warn!(%external_id, shop_id = ?index.shop_id(), "Shop reports id the catalog does not recognize");
                unresolved_external.push((external_id, DropReason::Unmapped));
            }
        }
    }

    let primary = default_external.and_then(|external| index.resolve_internal(external).active());
    let document = assemble(items, mappings, primary, OverrideSource::Pulled);
    ConversionReport {
        document,
        unresolved_internal: Vec::new(),
        unresolved_external,
        skipped_roots,
    }
}

/// Re-resolve an existing document against the current mappings.
///
/// Mappings deactivated since the document was written drop out here.
pub fn refresh(document: &OverrideDocument, index: &IdentityIndex) -> ConversionReport {
    from_pivot_selection(
        &document.selection.items,
        document.selection.primary,
        index,
        document.metadata.source,
    )
}

/// Project a document to shop ids in selection order.
///
/// With `primary_first`, the primary's external id leads the list for shops
/// that read the default from position zero.
pub fn to_external_ids(document: &OverrideDocument, primary_first: bool) -> Vec<ExternalId> {
    let ids = document.external_ids();
    if !primary_first {
        return ids;
    }
    let Some(primary) = document.primary_external() else {
        return ids;
    };
    std::iter::once(primary)
        .chain(ids.into_iter().filter(|id| *id != primary))
        .collect()
}

/// Catalog ids whose stored external id no longer matches an active mapping.
pub fn dangling_mappings(document: &OverrideDocument, index: &IdentityIndex) -> Vec<InternalId> {
    document
        .mappings
        .iter()
        .filter(|(internal, external)| !index.is_active_pair(**internal, **external))
        .map(|(internal, _)| *internal)
        .collect()
}

fn assemble(
    items: Vec<InternalId>,
    mappings: BTreeMap<InternalId, ExternalId>,
    requested_primary: Option<InternalId>,
    source: OverrideSource,
) -> OverrideDocument {
    let kept_primary = requested_primary.filter(|primary| items.contains(primary));
    let (primary, primary_fallback) = match (kept_primary, items.first()) {
        (Some(primary), _) => (Some(primary), None),
        (None, Some(first)) => (
            Some(*first),
            Some(PrimaryFallback {
                requested: requested_primary,
                used: *first,
            }),
        ),
        (None, None) => (None, None),
    };

    OverrideDocument {
        selection: Selection { items, primary },
        mappings,
        metadata: DocumentMetadata {
            last_updated: Utc::now(),
            source,
            primary_fallback,
        },
    }
}

fn dedup<T: Copy + Eq + std::hash::Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
