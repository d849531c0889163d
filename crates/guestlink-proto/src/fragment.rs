//! Fragment naming and payload splitting
//!
//! The exchange store limits each entry to a small value size, so a logical
//! message is stored as one or more fragments named
//! `<communication_id>~<index>~<total>`. The total is embedded in every
//! fragment name so a reader can decide completeness without a separate
//! manifest entry.

use std::collections::HashMap;
use std::fmt;

use crate::ProtocolError;

/// Separator between the communication id, index, and total in a fragment
/// name. Reserved: never valid inside a communication id.
pub const SEPARATOR: char = '~';

/// Fixed prefix of every host-issued communication id, enabling a cheap
/// filter scan over unrelated store entries.
pub const MESSAGE_ID_PREFIX: &str = "DevSetup{";

/// Maximum number of characters per fragment value, chosen conservatively
/// below the exchange store's real per-entry limit.
pub const MAX_FRAGMENT_SIZE: usize = 1000;

/// Parsed form of a fragment entry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentName {
    /// Correlation token the fragment belongs to
    pub communication_id: String,
    /// 1-based position of this fragment within the message
    pub index: usize,
    /// Total number of fragments in the message
    pub total: usize,
}

impl FragmentName {
    /// Create a fragment name, validating the index range.
    pub fn new(
        communication_id: impl Into<String>,
        index: usize,
        total: usize,
    ) -> Result<Self, ProtocolError> {
        let communication_id = communication_id.into();
        if communication_id.is_empty() || index == 0 || index > total {
            return Err(ProtocolError::InvalidFragmentName(format!(
                "{}{SEPARATOR}{}{SEPARATOR}{}",
                communication_id, index, total
            )));
        }
        Ok(Self {
            communication_id,
            index,
            total,
        })
    }

    /// Parse an entry name of the form `<id>~<index>~<total>`.
    ///
    /// Returns `None` for names that are not fragment entries (wrong part
    /// count, non-numeric index/total, zero or out-of-range index).
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.split(SEPARATOR);
        let communication_id = parts.next()?;
        let index: usize = parts.next()?.parse().ok()?;
        let total: usize = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Self::new(communication_id, index, total).ok()
    }
}

impl fmt::Display for FragmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.communication_id, self.index, self.total
        )
    }
}

/// Check whether a store entry name belongs to the message namespace.
pub fn is_message_entry(name: &str) -> bool {
    name.starts_with(MESSAGE_ID_PREFIX)
}

/// Split a payload into chunks of at most `max_len` characters.
///
/// Chunks are cut on character boundaries so reassembly reproduces the
/// payload exactly. An empty payload still yields one (empty) chunk, so the
/// message remains visible on the wire.
pub fn split_payload(payload: &str, max_len: usize) -> Vec<String> {
    assert!(max_len > 0, "fragment size must be at least one character");
    if payload.is_empty() {
        return vec![String::new()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in payload.chars() {
        current.push(ch);
        count += 1;
        if count == max_len {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Produce the named fragment entries for a payload.
pub fn fragment_payload(
    communication_id: &str,
    payload: &str,
    max_len: usize,
) -> Vec<(String, String)> {
    let chunks = split_payload(payload, max_len);
    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let name = FragmentName {
                communication_id: communication_id.to_string(),
                index: i + 1,
                total,
            };
            (name.to_string(), chunk)
        })
        .collect()
}

/// Reassemble every *complete* message from a raw entry snapshot.
///
/// Entries outside the message namespace and groups with fragments missing
/// are ignored; a partial set is invisible to the reader. Returns a map of
/// communication id to reassembled payload.
pub fn merge_messages(entries: &HashMap<String, String>) -> HashMap<String, String> {
    // Distinct fragments seen and the stated total, per communication id.
    let mut groups: HashMap<String, (usize, usize)> = HashMap::new();
    for name in entries.keys() {
        if !is_message_entry(name) {
            continue;
        }
        if let Some(fragment) = FragmentName::parse(name) {
            let group = groups
                .entry(fragment.communication_id)
                .or_insert((0, fragment.total));
            group.0 += 1;
        }
    }

    let mut messages = HashMap::new();
    'groups: for (communication_id, (seen, total)) in groups {
        if seen != total {
            continue;
        }
        let mut payload = String::new();
        for index in 1..=total {
            let name = FragmentName {
                communication_id: communication_id.clone(),
                index,
                total,
            }
            .to_string();
            match entries.get(&name) {
                Some(part) => payload.push_str(part),
                // Mismatched totals can make a group look complete while an
                // index is still absent; treat it as incomplete.
                None => continue 'groups,
            }
        }
        messages.insert(communication_id, payload);
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entries(pairs: Vec<(String, String)>) -> HashMap<String, String> {
        pairs.into_iter().collect()
    }

    #[test]
    fn test_fragment_name_roundtrip() {
        let name = FragmentName::new("DevSetup{1}", 2, 3).unwrap();
        assert_eq!(name.to_string(), "DevSetup{1}~2~3");

        let parsed = FragmentName::parse("DevSetup{1}~2~3").unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_fragment_name_rejects_malformed() {
        assert!(FragmentName::parse("DevSetup{1}").is_none());
        assert!(FragmentName::parse("DevSetup{1}~1").is_none());
        assert!(FragmentName::parse("DevSetup{1}~1~2~3").is_none());
        assert!(FragmentName::parse("DevSetup{1}~x~2").is_none());
        assert!(FragmentName::parse("DevSetup{1}~0~2").is_none());
        assert!(FragmentName::parse("DevSetup{1}~3~2").is_none());
        assert!(FragmentName::parse("~1~1").is_none());
    }

    #[test]
    fn test_split_payload_sizes() {
        assert_eq!(split_payload("", 4), vec!["".to_string()]);
        assert_eq!(split_payload("abc", 4), vec!["abc".to_string()]);
        assert_eq!(
            split_payload("abcdefgh", 3),
            vec!["abc".to_string(), "def".to_string(), "gh".to_string()]
        );
        assert_eq!(split_payload("ab", 1).len(), 2);
    }

    #[test]
    fn test_split_payload_respects_char_boundaries() {
        let payload = "héllo wörld";
        let chunks = split_payload(payload, 2);
        assert_eq!(chunks.concat(), payload);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 2);
        }
    }

    #[test]
    fn test_fragment_payload_names_carry_total() {
        let fragments = fragment_payload("DevSetup{7}", "abcdef", 2);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].0, "DevSetup{7}~1~3");
        assert_eq!(fragments[2].0, "DevSetup{7}~3~3");
    }

    #[test]
    fn test_merge_complete_message() {
        let merged = merge_messages(&entries(fragment_payload("DevSetup{1}", "abcdef", 2)));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["DevSetup{1}"], "abcdef");
    }

    #[test]
    fn test_merge_ignores_partial_sets() {
        let mut fragments = fragment_payload("DevSetup{1}", "abcdef", 2);
        fragments.pop();
        let merged = merge_messages(&entries(fragments));
        assert!(merged.is_empty());
    }

    #[test]
    fn test_merge_ignores_foreign_entries() {
        let mut all = fragment_payload("DevSetup{1}", "payload", 4);
        all.push(("SomethingElse".to_string(), "ignored".to_string()));
        all.push(("DevSetup{2}".to_string(), "no fragment suffix".to_string()));
        let merged = merge_messages(&entries(all));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["DevSetup{1}"], "payload");
    }

    #[test]
    fn test_merge_multiple_messages() {
        let mut all = fragment_payload("DevSetup{1}", "first", 2);
        all.extend(fragment_payload("DevSetup{2}", "second", 3));
        let merged = merge_messages(&entries(all));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["DevSetup{1}"], "first");
        assert_eq!(merged["DevSetup{2}"], "second");
    }

    proptest! {
        #[test]
        fn test_fragment_merge_roundtrip(
            payload in ".*",
            max_len in 1usize..32
        ) {
            let fragments = fragment_payload("DevSetup{42}", &payload, max_len);
            let merged = merge_messages(&entries(fragments));
            prop_assert_eq!(merged.get("DevSetup{42}"), Some(&payload));
        }

        #[test]
        fn test_partial_sets_are_invisible(
            payload in ".{8,64}",
            max_len in 1usize..4
        ) {
            let mut fragments = fragment_payload("DevSetup{42}", &payload, max_len);
            prop_assume!(fragments.len() > 1);
            fragments.pop();
            let merged = merge_messages(&entries(fragments));
            prop_assert!(merged.is_empty());
        }
    }
}
