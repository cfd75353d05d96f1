//! Memory layers and their fixed execution groups.
//!
//! A topic is extracted in two phases: the four CEPA layers (context,
//! experience, preference, activity) are extracted together first, then the
//! identity layer, which reads whatever the first phase persisted.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A kind of long-term memory produced by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLayer {
    Context,
    Experience,
    Preference,
    Activity,
    Identity,
}

/// Layers extracted together in the first phase of a topic job (CEPA).
pub const PARALLEL_GROUP: [MemoryLayer; 4] = [
    MemoryLayer::Context,
    MemoryLayer::Experience,
    MemoryLayer::Preference,
    MemoryLayer::Activity,
];

/// Layers extracted after the parallel group has been persisted.
pub const SEQUENTIAL_GROUP: [MemoryLayer; 1] = [MemoryLayer::Identity];

impl MemoryLayer {
    /// Every layer, parallel group first.
    pub const ALL: [MemoryLayer; 5] = [
        MemoryLayer::Context,
        MemoryLayer::Experience,
        MemoryLayer::Preference,
        MemoryLayer::Activity,
        MemoryLayer::Identity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLayer::Context => "context",
            MemoryLayer::Experience => "experience",
            MemoryLayer::Preference => "preference",
            MemoryLayer::Activity => "activity",
            MemoryLayer::Identity => "identity",
        }
    }
}

impl fmt::Display for MemoryLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "context" => Ok(MemoryLayer::Context),
            "experience" => Ok(MemoryLayer::Experience),
            "preference" => Ok(MemoryLayer::Preference),
            "activity" => Ok(MemoryLayer::Activity),
            "identity" => Ok(MemoryLayer::Identity),
            other => Err(format!("unknown memory layer '{other}'")),
        }
    }
}

/// Intersect a requested layer set with one execution group.
///
/// An empty request means "all layers", so it yields the whole group. The
/// result keeps the group's order.
pub fn filter_layers(requested: &BTreeSet<MemoryLayer>, group: &[MemoryLayer]) -> Vec<MemoryLayer> {
    if requested.is_empty() {
        return group.to_vec();
    }
    group
        .iter()
        .copied()
        .filter(|layer| requested.contains(layer))
        .collect()
}

/// Render a layer list as a comma-separated string (span attributes, logs).
pub fn join_layers<'a>(layers: impl IntoIterator<Item = &'a MemoryLayer>) -> String {
    layers
        .into_iter()
        .map(MemoryLayer::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_partition_all_layers() {
        let mut union: Vec<MemoryLayer> = PARALLEL_GROUP.to_vec();
        union.extend(SEQUENTIAL_GROUP);
        assert_eq!(union, MemoryLayer::ALL.to_vec());
        assert!(!PARALLEL_GROUP.contains(&MemoryLayer::Identity));
    }

    #[test]
    fn test_filter_layers_empty_request_means_all() {
        let requested = BTreeSet::new();
        assert_eq!(filter_layers(&requested, &PARALLEL_GROUP), PARALLEL_GROUP.to_vec());
        assert_eq!(filter_layers(&requested, &SEQUENTIAL_GROUP), vec![MemoryLayer::Identity]);
    }

    #[test]
    fn test_filter_layers_identity_only() {
        let requested: BTreeSet<_> = [MemoryLayer::Identity].into_iter().collect();
        assert!(filter_layers(&requested, &PARALLEL_GROUP).is_empty());
        assert_eq!(filter_layers(&requested, &SEQUENTIAL_GROUP), vec![MemoryLayer::Identity]);
    }

    #[test]
    fn test_filter_layers_keeps_group_order() {
        let requested: BTreeSet<_> = [MemoryLayer::Activity, MemoryLayer::Context]
            .into_iter()
            .collect();
        assert_eq!(
            filter_layers(&requested, &PARALLEL_GROUP),
            vec![MemoryLayer::Context, MemoryLayer::Activity]
        );
    }

    #[test]
    fn test_layer_from_str_case_insensitive() {
        assert_eq!("Identity".parse::<MemoryLayer>().unwrap(), MemoryLayer::Identity);
        assert_eq!(" preference ".parse::<MemoryLayer>().unwrap(), MemoryLayer::Preference);
        assert!("persona".parse::<MemoryLayer>().is_err());
    }

    #[test]
    fn test_layer_serializes_lowercase() {
        let json = serde_json::to_string(&MemoryLayer::Experience).unwrap();
        assert_eq!(json, "\"experience\"");
    }

    #[test]
    fn test_join_layers() {
        assert_eq!(join_layers(&SEQUENTIAL_GROUP), "identity");
        assert_eq!(join_layers(&Vec::<MemoryLayer>::new()), "");
    }
}
