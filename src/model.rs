use bincode::{Decode, Encode};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Set of dense indexes a match is in common with. Always sorted, so
/// serialization and iteration are deterministic.
pub type Coords = BTreeSet<usize>;

/// Read from JSON as a variant name or as its position in the declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
#[serde(try_from = "TreeTypeRepr")]
pub enum TreeType {
    #[default]
    Undetermined,
    None,
    Private,
    Public,
    Unlinked,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TreeTypeRepr {
    Name(String),
    Code(u64),
}

impl TryFrom<TreeTypeRepr> for TreeType {
    type Error = String;

    fn try_from(repr: TreeTypeRepr) -> Result<Self, Self::Error> {
        match repr {
            TreeTypeRepr::Name(name) => match name.as_str() {
                "Undetermined" => Ok(TreeType::Undetermined),
                "None" => Ok(TreeType::None),
                "Private" => Ok(TreeType::Private),
                "Public" => Ok(TreeType::Public),
                "Unlinked" => Ok(TreeType::Unlinked),
                _ => Err(format!("unknown tree type {}", name)),
            },
            TreeTypeRepr::Code(code) => match code {
                0 => Ok(TreeType::Undetermined),
                1 => Ok(TreeType::None),
                2 => Ok(TreeType::Private),
                3 => Ok(TreeType::Public),
                4 => Ok(TreeType::Unlinked),
                _ => Err(format!("unknown tree type code {}", code)),
            },
        }
    }
}

/// Explicit nulls read as the default, as files written elsewhere emit them.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl TreeType {
    pub fn label(&self) -> &'static str {
        match self {
            TreeType::Undetermined => "",
            TreeType::None => "No tree",
            TreeType::Private => "Private",
            TreeType::Public => "Public",
            TreeType::Unlinked => "Unlinked",
        }
    }
}

/// Static attributes of one match. Never mutated after load.
///
/// The aliases accept the PascalCase keys of saved-data `.txt` files.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
#[serde(default)]
pub struct Match {
    #[serde(alias = "TestGuid", deserialize_with = "null_as_default")]
    pub test_guid: String,
    #[serde(alias = "Name", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(alias = "SharedCentimorgans")]
    pub shared_centimorgans: f64,
    #[serde(alias = "SharedSegments")]
    pub shared_segments: u32,
    #[serde(alias = "LongestBlock")]
    pub longest_block: f64,
    #[serde(alias = "TreeUrl")]
    pub tree_url: Option<String>,
    #[serde(alias = "TreeType")]
    pub tree_type: TreeType,
    #[serde(alias = "TreeSize")]
    pub tree_size: u32,
    #[serde(alias = "CommonAncestors", deserialize_with = "null_as_default")]
    pub common_ancestors: Vec<String>,
    #[serde(alias = "Starred")]
    pub starred: bool,
    #[serde(alias = "HasHint")]
    pub has_hint: bool,
    #[serde(alias = "Note")]
    pub note: Option<String>,
    #[serde(alias = "TagIds", deserialize_with = "null_as_default")]
    pub tag_ids: Vec<u32>,
}

impl Match {
    pub fn new(test_guid: &str, name: &str, shared_centimorgans: f64) -> Self {
        Self {
            test_guid: test_guid.to_string(),
            name: name.to_string(),
            shared_centimorgans,
            ..Self::default()
        }
    }
}

/// User-defined label applied to some matches. Only adds output columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
#[serde(default)]
pub struct Tag {
    #[serde(alias = "TagId")]
    pub tag_id: u32,
    #[serde(alias = "Label", deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(alias = "Color")]
    pub color: Option<String>,
}

/// A match joined with its discovered in-common-with set.
///
/// Updates produce a new value with the same `index`; the `Match` itself is
/// shared behind an `Arc` so replacement never copies it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterableMatch {
    pub index: usize,
    pub matched: Arc<Match>,
    pub coords: Coords,
}

impl ClusterableMatch {
    pub fn new(index: usize, matched: Arc<Match>, coords: Coords) -> Self {
        Self { index, matched, coords }
    }

    pub fn with_coords(&self, coords: Coords) -> Self {
        Self {
            index: self.index,
            matched: self.matched.clone(),
            coords,
        }
    }

    pub fn shared_centimorgans(&self) -> f64 {
        self.matched.shared_centimorgans
    }

    /// Number of other matches this one is in common with.
    pub fn shared_match_count(&self) -> usize {
        self.coords.iter().filter(|&&c| c != self.index).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_coords_keeps_identity() {
        let m = ClusterableMatch::new(4, Arc::new(Match::new("g4", "Four", 30.0)), Coords::new());
        let updated = m.with_coords([4, 7].into_iter().collect());
        assert_eq!(updated.index, 4);
        assert!(Arc::ptr_eq(&updated.matched, &m.matched));
        assert_eq!(updated.shared_match_count(), 1);
        assert!(m.coords.is_empty());
    }

    #[test]
    fn test_match_deserializes_with_missing_fields() {
        let m: Match = serde_json::from_str(r#"{"test_guid":"abc","shared_centimorgans":12.5}"#).unwrap();
        assert_eq!(m.test_guid, "abc");
        assert_eq!(m.tree_type, TreeType::Undetermined);
        assert!(m.tag_ids.is_empty());
    }

    #[test]
    fn test_match_reads_pascal_case_keys_and_nulls() {
        let m: Match = serde_json::from_str(
            r#"{"TestGuid":"G7","Name":"Ann","SharedCentimorgans":61.5,"SharedSegments":3,
                "TreeType":3,"CommonAncestors":null,"Note":null,"Starred":true,"TagIds":[2]}"#,
        )
        .unwrap();
        assert_eq!(m.test_guid, "G7");
        assert_eq!(m.shared_segments, 3);
        assert_eq!(m.tree_type, TreeType::Public);
        assert!(m.common_ancestors.is_empty());
        assert!(m.starred);
        assert_eq!(m.tag_ids, vec![2]);
    }

    #[test]
    fn test_tree_type_reads_names_and_codes() {
        let parse = |text: &str| serde_json::from_str::<TreeType>(text);
        assert_eq!(parse(r#""Private""#).unwrap(), TreeType::Private);
        assert_eq!(parse("4").unwrap(), TreeType::Unlinked);
        assert_eq!(serde_json::to_string(&TreeType::None).unwrap(), r#""None""#);
        assert!(parse("9").is_err());
        assert!(parse(r#""Shrub""#).is_err());
    }
}
