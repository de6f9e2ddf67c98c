//! Performance oriented JSON manipulation.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// A path element in a JSON value, as attributed to a GraphQL error.
///
/// `Key` elements address object members, `Index` elements address list
/// positions. Serialized as a plain string or number respectively, matching
/// the wire shape of a GraphQL error `path`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index path element.
    Index(usize),

    /// A key path element.
    Key(String),
}

/// A path into the result document.
///
/// This can be composed of strings and numbers.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    /// An empty path, addressing the document root.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// The number of elements in the path.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    pub fn push(&mut self, element: PathElement) {
        self.0.push(element)
    }

    pub fn pop(&mut self) -> Option<PathElement> {
        self.0.pop()
    }

    /// Whether this path addresses exactly the given sequence of field names.
    ///
    /// Index elements never match a field name, so a path that descends into
    /// a list item is distinct from the path of the list field itself.
    pub fn matches_field_path(&self, fields: &[String]) -> bool {
        self.0.len() == fields.len()
            && self
                .0
                .iter()
                .zip(fields)
                .all(|(element, name)| matches!(element, PathElement::Key(key) if key == name))
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<T: IntoIterator<Item = PathElement>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<PathElement>> for Path {
    fn from(elements: Vec<PathElement>) -> Self {
        Self(elements)
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self(
            s.split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| {
                    if let Ok(index) = segment.parse::<usize>() {
                        PathElement::Index(index)
                    } else {
                        PathElement::Key(segment.to_string())
                    }
                })
                .collect(),
        )
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/")?;
            match element {
                PathElement::Index(index) => write!(f, "{index}")?,
                PathElement::Key(key) => write!(f, "{key}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_from_slash_string() {
        let path = Path::from("artist/artworksConnection/0/title");
        assert_eq!(
            path,
            Path(vec![
                PathElement::Key("artist".to_string()),
                PathElement::Key("artworksConnection".to_string()),
                PathElement::Index(0),
                PathElement::Key("title".to_string()),
            ])
        );
        assert_eq!(path.to_string(), "/artist/artworksConnection/0/title");
    }

    #[test]
    fn path_serializes_as_mixed_array() {
        let path = Path::from("artist/results/2");
        let serialized = serde_json::to_value(&path).unwrap();
        assert_eq!(serialized, serde_json::json!(["artist", "results", 2]));

        let roundtrip: Path = serde_json::from_value(serialized).unwrap();
        assert_eq!(roundtrip, path);
    }

    #[test]
    fn field_path_matching_ignores_indexed_paths() {
        let fields = vec!["artist".to_string(), "results".to_string()];
        assert!(Path::from("artist/results").matches_field_path(&fields));
        assert!(!Path::from("artist/results/0").matches_field_path(&fields));
        assert!(!Path::from("artist").matches_field_path(&fields));
        assert!(!Path::from("artist/counts").matches_field_path(&fields));
    }
}
