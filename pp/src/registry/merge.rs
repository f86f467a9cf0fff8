//! Configuration merger
//!
//! Folds layered configuration fragments into one record per logical key.
//! All precedence rules live in [`merge`]:
//!
//! - Fragments are applied in [`SourceKind`] order; within one kind the input
//!   order is kept, so later fragments override earlier ones.
//! - Overrides are field-by-field: blank strings, empty message lists and
//!   missing values never clear what an earlier fragment set.
//! - Keys match case-insensitively; the first-seen casing is kept.
//! - A record whose remote key was never set uses its logical key.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::entry::{PromptEntryConfig, PromptKeyMapping};
use super::{ResolvedPromptConfiguration, ResolvedRegistry, fold_key};
use crate::domain::ChatMessage;

/// Configuration source a fragment came from, in application order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    /// Flat logical key -> text default map
    TextDefaults,
    /// Flat logical key -> chat messages map
    ChatDefaults,
    /// Legacy logical key -> remote key/label/version map
    LegacyKeyMapping,
    /// Unified entries keyed by logical key
    EntryMap,
    /// Unified entries in list form, logical key from `name` or `key`
    EntryList,
}

/// One configuration fragment for one logical key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFragment {
    pub source: SourceKind,
    pub logical_key: String,
    pub entry: PromptEntryConfig,
}

impl PromptFragment {
    pub fn text_default(logical_key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: SourceKind::TextDefaults,
            logical_key: logical_key.into(),
            entry: PromptEntryConfig::default().with_default(text),
        }
    }

    pub fn chat_default(logical_key: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            source: SourceKind::ChatDefaults,
            logical_key: logical_key.into(),
            entry: PromptEntryConfig::default().with_chat_default(messages),
        }
    }

    pub fn key_mapping(logical_key: impl Into<String>, mapping: &PromptKeyMapping) -> Self {
        Self {
            source: SourceKind::LegacyKeyMapping,
            logical_key: logical_key.into(),
            entry: PromptEntryConfig::from(mapping),
        }
    }

    pub fn entry(logical_key: impl Into<String>, entry: PromptEntryConfig) -> Self {
        Self {
            source: SourceKind::EntryMap,
            logical_key: logical_key.into(),
            entry,
        }
    }

    /// List-form entry: the logical key is `name`, or `key` when `name` is blank
    ///
    /// Yields an empty logical key when both are blank; [`merge`] skips those.
    pub fn listed(entry: PromptEntryConfig) -> Self {
        let logical_key = non_blank(entry.name.as_ref())
            .or_else(|| non_blank(entry.key.as_ref()))
            .unwrap_or_default();
        Self {
            source: SourceKind::EntryList,
            logical_key,
            entry,
        }
    }
}

/// Mutable per-key state while fragments are applied
#[derive(Debug, Default)]
struct PromptAccumulator {
    logical_key: String,
    actual_key: Option<String>,
    label: Option<String>,
    version: Option<u32>,
    default_content: Option<String>,
    chat_default_content: Option<Vec<ChatMessage>>,
}

impl PromptAccumulator {
    fn new(logical_key: &str) -> Self {
        Self {
            logical_key: logical_key.to_string(),
            ..Default::default()
        }
    }

    /// Overwrite only the fields this source kind may carry and the fragment actually sets
    fn apply(&mut self, source: SourceKind, entry: &PromptEntryConfig) {
        let carries_identity = !matches!(source, SourceKind::TextDefaults | SourceKind::ChatDefaults);
        let carries_text = matches!(
            source,
            SourceKind::TextDefaults | SourceKind::EntryMap | SourceKind::EntryList
        );
        let carries_chat = matches!(
            source,
            SourceKind::ChatDefaults | SourceKind::EntryMap | SourceKind::EntryList
        );

        if carries_identity {
            if let Some(key) = non_blank(entry.key.as_ref()) {
                self.actual_key = Some(key);
            }
            if let Some(label) = non_blank(entry.label.as_ref()) {
                self.label = Some(label);
            }
            match entry.version {
                Some(0) => {
                    warn!(logical_key = %self.logical_key, ?source, "merge: ignoring non-positive version 0");
                }
                Some(version) => self.version = Some(version),
                None => {}
            }
        }

        if carries_text {
            if let Some(text) = non_blank(entry.default.as_ref()) {
                self.default_content = Some(text);
            }
        }

        if carries_chat {
            if let Some(messages) = entry.chat_default.as_ref().filter(|m| !m.is_empty()) {
                self.chat_default_content = Some(messages.clone());
            }
        }
    }

    fn finish(self) -> ResolvedPromptConfiguration {
        let actual_key = self.actual_key.unwrap_or_else(|| self.logical_key.clone());
        ResolvedPromptConfiguration {
            logical_key: self.logical_key,
            actual_key,
            label: self.label,
            version: self.version,
            default_content: self.default_content,
            chat_default_content: self.chat_default_content,
        }
    }
}

/// Merge fragments into an immutable registry
pub fn merge(fragments: impl IntoIterator<Item = PromptFragment>) -> ResolvedRegistry {
    let mut ordered: Vec<PromptFragment> = fragments.into_iter().collect();
    debug!(fragment_count = ordered.len(), "merge: called");

    // Stable: fragments of the same kind keep their relative order
    ordered.sort_by_key(|f| f.source);

    let mut aggregate: BTreeMap<String, PromptAccumulator> = BTreeMap::new();
    for fragment in &ordered {
        let logical_key = fragment.logical_key.trim();
        if logical_key.is_empty() {
            debug!(source = ?fragment.source, "merge: skipping fragment with blank logical key");
            continue;
        }

        aggregate
            .entry(fold_key(logical_key))
            .or_insert_with(|| PromptAccumulator::new(logical_key))
            .apply(fragment.source, &fragment.entry);
    }

    let prompts = aggregate
        .into_iter()
        .map(|(folded, acc)| (folded, acc.finish()))
        .collect::<BTreeMap<_, _>>();

    debug!(prompt_count = prompts.len(), "merge: done");
    ResolvedRegistry::from_map(prompts)
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry() -> PromptEntryConfig {
        PromptEntryConfig::default()
    }

    fn as_entry(resolved: &ResolvedPromptConfiguration) -> PromptEntryConfig {
        PromptEntryConfig {
            key: Some(resolved.actual_key.clone()),
            label: resolved.label.clone(),
            version: resolved.version,
            default: resolved.default_content.clone(),
            chat_default: resolved.chat_default_content.clone(),
            ..Default::default()
        }
    }

    #[test]
    fn test_padded_keys_are_trimmed() {
        let registry = merge(vec![
            PromptFragment::text_default(" greeting ", "Hello"),
            PromptFragment::entry("Greeting\t", entry().with_label("staging")),
        ]);

        assert_eq!(registry.len(), 1);
        let resolved = registry.try_get("greeting").unwrap();
        assert_eq!(resolved.logical_key, "greeting");
        assert_eq!(resolved.actual_key, "greeting");
        assert_eq!(resolved.label.as_deref(), Some("staging"));
        assert_eq!(resolved.default_text(), Some("Hello"));
    }

    #[test]
    fn test_actual_key_defaults_to_logical_key() {
        let registry = merge(vec![PromptFragment::text_default("greeting", "Hello")]);
        let resolved = registry.try_get("greeting").unwrap();
        assert_eq!(resolved.actual_key, "greeting");
        assert_eq!(resolved.default_content.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let registry = merge(vec![
            PromptFragment::text_default("greeting", "Hello"),
            PromptFragment::entry("greeting", entry().with_label("staging")),
        ]);
        let resolved = registry.try_get("greeting").unwrap();
        assert_eq!(resolved.label.as_deref(), Some("staging"));
        assert_eq!(resolved.default_content.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_blank_fields_do_not_clear() {
        let registry = merge(vec![
            PromptFragment::key_mapping(
                "greeting",
                &PromptKeyMapping {
                    key: Some("remote-greeting".to_string()),
                    label: Some("production".to_string()),
                    version: Some(4),
                },
            ),
            PromptFragment::entry(
                "greeting",
                entry().with_key("  ").with_label("").with_default("").with_chat_default(vec![]),
            ),
        ]);
        let resolved = registry.try_get("greeting").unwrap();
        assert_eq!(resolved.actual_key, "remote-greeting");
        assert_eq!(resolved.label.as_deref(), Some("production"));
        assert_eq!(resolved.version, Some(4));
        assert!(resolved.default_content.is_none());
        assert!(resolved.chat_default_content.is_none());
    }

    #[test]
    fn test_source_kind_order_is_fixed() {
        // Entry list is applied after the entry map regardless of input order
        let registry = merge(vec![
            PromptFragment::listed(entry().with_name("summarize").with_key("from-list")),
            PromptFragment::entry("summarize", entry().with_key("from-map")),
            PromptFragment::key_mapping(
                "summarize",
                &PromptKeyMapping {
                    key: Some("from-legacy".to_string()),
                    ..Default::default()
                },
            ),
        ]);
        assert_eq!(registry.try_get("summarize").unwrap().actual_key, "from-list");
    }

    #[test]
    fn test_same_kind_keeps_input_order() {
        let registry = merge(vec![
            PromptFragment::entry("k", entry().with_label("first")),
            PromptFragment::entry("k", entry().with_label("second")),
        ]);
        assert_eq!(registry.try_get("k").unwrap().label.as_deref(), Some("second"));
    }

    #[test]
    fn test_legacy_mapping_never_sets_defaults() {
        let mut fragment = PromptFragment::key_mapping("k", &PromptKeyMapping::default());
        fragment.entry.default = Some("should be ignored".to_string());
        let registry = merge(vec![fragment]);
        assert!(registry.try_get("k").unwrap().default_content.is_none());
    }

    #[test]
    fn test_text_defaults_never_set_identity() {
        let mut fragment = PromptFragment::text_default("k", "text");
        fragment.entry.key = Some("sneaky".to_string());
        fragment.entry.version = Some(9);
        let registry = merge(vec![fragment]);
        let resolved = registry.try_get("k").unwrap();
        assert_eq!(resolved.actual_key, "k");
        assert!(resolved.version.is_none());
    }

    #[test]
    fn test_listed_entry_falls_back_to_key() {
        let registry = merge(vec![PromptFragment::listed(
            entry().with_name("  ").with_key("remote-only").with_default("x"),
        )]);
        let resolved = registry.try_get("remote-only").unwrap();
        assert_eq!(resolved.logical_key, "remote-only");
        assert_eq!(resolved.actual_key, "remote-only");
    }

    #[test]
    fn test_listed_entry_without_name_or_key_is_skipped() {
        let registry = merge(vec![PromptFragment::listed(entry().with_default("orphan"))]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_case_insensitive_keys_keep_first_casing() {
        let registry = merge(vec![
            PromptFragment::text_default("Greeting", "Hello"),
            PromptFragment::entry("GREETING", entry().with_version(2)),
        ]);
        assert_eq!(registry.len(), 1);
        let resolved = registry.try_get("greeting").unwrap();
        assert_eq!(resolved.logical_key, "Greeting");
        assert_eq!(resolved.actual_key, "Greeting");
        assert_eq!(resolved.version, Some(2));
        assert_eq!(resolved.default_content.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_zero_version_ignored() {
        let registry = merge(vec![
            PromptFragment::entry("k", entry().with_version(3)),
            PromptFragment::listed(entry().with_name("k").with_version(0)),
        ]);
        assert_eq!(registry.try_get("k").unwrap().version, Some(3));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let fragments = vec![
            PromptFragment::text_default("a", "A"),
            PromptFragment::chat_default("b", vec![ChatMessage::system("B")]),
            PromptFragment::entry("A", entry().with_key("remote-a").with_version(1)),
            PromptFragment::listed(entry().with_name("c").with_label("beta")),
        ];
        let first = merge(fragments.clone());
        let second = merge(fragments);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    fn arb_entry() -> impl Strategy<Value = PromptEntryConfig> {
        (
            proptest::option::of("[a-z]{0,3}"),
            proptest::option::of("[a-z]{0,3}"),
            proptest::option::of(0u32..4),
            proptest::option::of("[a-z ]{0,3}"),
        )
            .prop_map(|(key, label, version, default)| PromptEntryConfig {
                key,
                label,
                version,
                default,
                ..Default::default()
            })
    }

    proptest! {
        #[test]
        fn prop_merge_in_two_passes_equals_one(
            first in proptest::collection::vec(arb_entry(), 0..4),
            second in proptest::collection::vec(arb_entry(), 0..4),
        ) {
            // Merging [A, B] and then layering C gives the same record as [A, B, C]
            let to_fragments = |entries: &[PromptEntryConfig]| {
                entries.iter().cloned().map(|e| PromptFragment::entry("k", e)).collect::<Vec<_>>()
            };

            let all: Vec<_> = to_fragments(&first).into_iter().chain(to_fragments(&second)).collect();
            let one_pass = merge(all);

            let mut layered = to_fragments(&first);
            let partial_registry = merge(layered.clone());
            if let Some(partial) = partial_registry.try_get("k") {
                layered = vec![PromptFragment::entry("k", as_entry(partial))];
            }
            layered.extend(to_fragments(&second));
            let two_pass = merge(layered);

            prop_assert_eq!(one_pass, two_pass);
        }

        #[test]
        fn prop_last_override_wins(labels in proptest::collection::vec("[a-z]{1,4}", 1..6)) {
            let fragments = labels
                .iter()
                .map(|l| PromptFragment::entry("k", PromptEntryConfig::default().with_label(l.clone())))
                .collect::<Vec<_>>();
            let registry = merge(fragments);
            prop_assert_eq!(registry.try_get("k").unwrap().label.as_deref(), labels.last().map(|s| s.as_str()));
        }
    }
}
