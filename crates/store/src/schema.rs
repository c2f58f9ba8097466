//! Declarative collection schemas.
//!
//! A [`CollectionSchema`] describes a named collection with a vector index,
//! scalar properties, and reference properties. Vectors are always supplied
//! by the caller; no server-side vectorizer is ever configured.

use serde::{Deserialize, Serialize};

/// Distance metric for the collection's vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Cosine distance: 0.0 means identical direction, 2.0 means opposite.
    Cosine,
}

impl Distance {
    pub const fn as_str(self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
        }
    }
}

/// Scalar data type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    Text,
    TextArray,
}

impl DataType {
    /// Wire name used by the Weaviate schema API.
    pub const fn wire_name(self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::TextArray => "text[]",
        }
    }
}

/// Tokenization applied to a searchable text property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tokenization {
    Word,
}

impl Tokenization {
    pub const fn as_str(self) -> &'static str {
        match self {
            Tokenization::Word => "word",
        }
    }
}

/// A scalar property on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    pub data_type: DataType,
    /// Whether the property participates in structured filters.
    pub filterable: bool,
    /// Whether the property is full-text searchable.
    pub searchable: bool,
    pub tokenization: Option<Tokenization>,
}

impl PropertySpec {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Text,
            filterable: false,
            searchable: false,
            tokenization: None,
        }
    }

    pub fn text_array(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::TextArray,
            filterable: false,
            searchable: false,
            tokenization: None,
        }
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn searchable(mut self, tokenization: Tokenization) -> Self {
        self.searchable = true;
        self.tokenization = Some(tokenization);
        self
    }
}

/// A reference property linking records of this collection to another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSpec {
    /// Property name the reference is stored under (e.g. `forImage`).
    pub name: String,
    /// Target collection name.
    pub target: String,
}

/// Full declarative schema for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub description: String,
    pub distance: Distance,
    /// Expected vector dimensionality. Enforced on insert by stores that can.
    pub dimension: usize,
    pub properties: Vec<PropertySpec>,
    pub references: Vec<ReferenceSpec>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, distance: Distance, dimension: usize) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            distance,
            dimension,
            properties: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }

    pub fn reference(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.references.push(ReferenceSpec {
            name: name.into(),
            target: target.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_collects_properties_and_references() {
        let schema = CollectionSchema::new("Caption", Distance::Cosine, 512)
            .description("caption text and vector")
            .property(
                PropertySpec::text("captionText")
                    .filterable()
                    .searchable(Tokenization::Word),
            )
            .reference("forImage", "Image");

        assert_eq!(schema.name, "Caption");
        assert_eq!(schema.dimension, 512);
        assert_eq!(schema.properties.len(), 1);
        assert!(schema.properties[0].filterable);
        assert!(schema.properties[0].searchable);
        assert_eq!(schema.properties[0].tokenization, Some(Tokenization::Word));
        assert_eq!(schema.references[0].target, "Image");
    }

    #[test]
    fn wire_names_match_store_conventions() {
        assert_eq!(DataType::Text.wire_name(), "text");
        assert_eq!(DataType::TextArray.wire_name(), "text[]");
        assert_eq!(Distance::Cosine.as_str(), "cosine");
    }
}
