//! In-memory [`VectorStore`] with brute-force cosine search.
//!
//! Used by tests and offline smoke runs. Supports the full client contract
//! including contains-any filters across references and reference joins, so
//! engine behavior can be exercised without a running database.

use crate::error::{Result, StoreError};
use crate::schema::CollectionSchema;
use crate::store::VectorStore;
use crate::types::{
    NearVectorQuery, QueryHit, RecordId, Reference, ResolvedReference, WhereFilter,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredRecord {
    id: RecordId,
    properties: Map<String, Value>,
    vector: Vec<f32>,
    /// Reference property name -> target record ids.
    references: HashMap<String, Vec<RecordId>>,
}

#[derive(Debug, Clone)]
struct MemoryCollection {
    schema: CollectionSchema,
    records: Vec<StoredRecord>,
}

/// Brute-force in-memory vector store.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection; 0 when the collection is absent.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(collection)
            .map_or(0, |c| c.records.len())
    }

    /// Target ids stored under a reference property of one record.
    pub fn references_of(&self, collection: &str, id: &RecordId, property: &str) -> Vec<RecordId> {
        self.collections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(collection)
            .and_then(|c| c.records.iter().find(|r| &r.id == id))
            .and_then(|r| r.references.get(property).cloned())
            .unwrap_or_default()
    }

    fn fresh_id(&self) -> RecordId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        RecordId(format!("mem-{n:016x}"))
    }

    fn matches_filter(
        collections: &HashMap<String, MemoryCollection>,
        record: &StoredRecord,
        filter: &WhereFilter,
    ) -> bool {
        match filter {
            WhereFilter::ContainsAny { path, values } => match path.as_slice() {
                [property] => property_contains_any(&record.properties, property, values),
                [ref_property, target_collection, property] => {
                    let Some(target) = collections.get(target_collection.as_str()) else {
                        return false;
                    };
                    let Some(ids) = record.references.get(ref_property.as_str()) else {
                        return false;
                    };
                    ids.iter().any(|id| {
                        target
                            .records
                            .iter()
                            .find(|r| &r.id == id)
                            .is_some_and(|r| {
                                property_contains_any(&r.properties, property, values)
                            })
                    })
                }
                _ => false,
            },
        }
    }
}

fn property_contains_any(properties: &Map<String, Value>, name: &str, values: &[String]) -> bool {
    match properties.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|item| values.iter().any(|v| v == item)),
        Some(Value::String(item)) => values.iter().any(|v| v == item),
        _ => false,
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .collections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(name))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if collections.contains_key(&schema.name) {
            return Err(StoreError::SchemaError(format!(
                "collection '{}' already exists",
                schema.name
            )));
        }
        collections.insert(
            schema.name.clone(),
            MemoryCollection {
                schema: schema.clone(),
                records: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(name);
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        properties: Map<String, Value>,
        vector: &[f32],
    ) -> Result<RecordId> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        if vector.len() != target.schema.dimension {
            return Err(StoreError::InvalidDimension {
                expected: target.schema.dimension,
                actual: vector.len(),
            });
        }
        let id = self.fresh_id();
        target.records.push(StoredRecord {
            id: id.clone(),
            properties,
            vector: vector.to_vec(),
            references: HashMap::new(),
        });
        Ok(id)
    }

    async fn add_references(&self, references: &[Reference]) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for reference in references {
            let source = collections
                .get_mut(&reference.from_collection)
                .ok_or_else(|| StoreError::CollectionNotFound(reference.from_collection.clone()))?;
            let record = source
                .records
                .iter_mut()
                .find(|r| r.id == reference.from_id)
                .ok_or_else(|| {
                    StoreError::WriteError(format!(
                        "record '{}' not found in '{}'",
                        reference.from_id, reference.from_collection
                    ))
                })?;
            record
                .references
                .entry(reference.from_property.clone())
                .or_default()
                .push(reference.to_id.clone());
        }
        Ok(())
    }

    async fn query_near_vector(&self, query: &NearVectorQuery) -> Result<Vec<QueryHit>> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let collection = collections
            .get(&query.collection)
            .ok_or_else(|| StoreError::CollectionNotFound(query.collection.clone()))?;

        let mut scored: Vec<(&StoredRecord, f32)> = collection
            .records
            .iter()
            .filter(|record| {
                query
                    .filter
                    .as_ref()
                    .is_none_or(|f| Self::matches_filter(&collections, record, f))
            })
            .map(|record| (record, cosine_distance(&query.vector, &record.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(query.limit);

        let mut hits = Vec::with_capacity(scored.len());
        for (record, distance) in scored {
            let properties: Map<String, Value> = query
                .properties
                .iter()
                .filter_map(|name| {
                    record
                        .properties
                        .get(name)
                        .map(|v| (name.clone(), v.clone()))
                })
                .collect();

            let references = match &query.join {
                Some(join) => {
                    let target = collections.get(&join.target_collection);
                    record
                        .references
                        .get(&join.on_property)
                        .into_iter()
                        .flatten()
                        .filter_map(|id| {
                            let resolved =
                                target.and_then(|t| t.records.iter().find(|r| &r.id == id))?;
                            let properties = join
                                .properties
                                .iter()
                                .filter_map(|name| {
                                    resolved
                                        .properties
                                        .get(name)
                                        .map(|v| (name.clone(), v.clone()))
                                })
                                .collect();
                            Some(ResolvedReference {
                                id: resolved.id.clone(),
                                properties,
                            })
                        })
                        .collect()
                }
                None => Vec::new(),
            };

            hits.push(QueryHit {
                id: record.id.clone(),
                properties,
                distance: Some(distance),
                references,
            });
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Distance, PropertySpec};
    use crate::types::ReferenceJoin;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn image_schema() -> CollectionSchema {
        CollectionSchema::new("Image", Distance::Cosine, 3)
            .property(PropertySpec::text("imageUrl").filterable())
            .property(PropertySpec::text_array("tags").filterable())
    }

    fn caption_schema() -> CollectionSchema {
        CollectionSchema::new("Caption", Distance::Cosine, 3)
            .property(PropertySpec::text("captionText").filterable())
            .reference("forImage", "Image")
    }

    fn props(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    async fn seeded_store() -> (MemoryStore, RecordId, RecordId) {
        let store = MemoryStore::new();
        store.create_collection(&image_schema()).await.unwrap();
        store.create_collection(&caption_schema()).await.unwrap();

        let image_id = store
            .insert(
                "Image",
                props(&[
                    ("imageUrl", json!("static/dog.jpg")),
                    ("tags", json!(["dog", "outdoor"])),
                ]),
                &[1.0, 0.0, 0.0],
            )
            .await
            .unwrap();
        let caption_id = store
            .insert(
                "Caption",
                props(&[("captionText", json!("a dog running"))]),
                &[0.0, 1.0, 0.0],
            )
            .await
            .unwrap();
        store
            .add_references(&[Reference {
                from_collection: "Caption".to_string(),
                from_property: "forImage".to_string(),
                from_id: caption_id.clone(),
                to_collection: "Image".to_string(),
                to_id: image_id.clone(),
            }])
            .await
            .unwrap();
        (store, image_id, caption_id)
    }

    #[tokio::test]
    async fn create_collection_twice_is_an_error() {
        let store = MemoryStore::new();
        store.create_collection(&image_schema()).await.unwrap();
        assert!(store.create_collection(&image_schema()).await.is_err());
    }

    #[tokio::test]
    async fn delete_absent_collection_is_noop() {
        let store = MemoryStore::new();
        store.delete_collection("Image").await.unwrap();
    }

    #[tokio::test]
    async fn insert_rejects_wrong_dimension() {
        let store = MemoryStore::new();
        store.create_collection(&image_schema()).await.unwrap();
        let err = store
            .insert("Image", Map::new(), &[1.0, 0.0])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidDimension {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn query_orders_nearest_first_and_respects_limit() {
        let store = MemoryStore::new();
        store.create_collection(&image_schema()).await.unwrap();
        store
            .insert("Image", props(&[("imageUrl", json!("a"))]), &[1.0, 0.0, 0.0])
            .await
            .unwrap();
        store
            .insert("Image", props(&[("imageUrl", json!("b"))]), &[0.0, 1.0, 0.0])
            .await
            .unwrap();
        store
            .insert(
                "Image",
                props(&[("imageUrl", json!("c"))]),
                &[0.9, 0.1, 0.0],
            )
            .await
            .unwrap();

        let query =
            NearVectorQuery::new("Image", vec![1.0, 0.0, 0.0], 2).properties(&["imageUrl"]);
        let hits = store.query_near_vector(&query).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text_property("imageUrl"), "a");
        assert_eq!(hits[1].text_property("imageUrl"), "c");
        assert!(hits[0].distance.unwrap() <= hits[1].distance.unwrap());
    }

    #[tokio::test]
    async fn join_resolves_reference_properties() {
        let (store, image_id, caption_id) = seeded_store().await;

        let query = NearVectorQuery::new("Caption", vec![0.0, 1.0, 0.0], 5)
            .properties(&["captionText"])
            .join(ReferenceJoin {
                on_property: "forImage".to_string(),
                target_collection: "Image".to_string(),
                properties: vec!["imageUrl".to_string()],
            });
        let hits = store.query_near_vector(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, caption_id);
        assert_eq!(hits[0].references.len(), 1);
        assert_eq!(hits[0].references[0].id, image_id);
        assert_eq!(
            hits[0].references[0].properties.get("imageUrl"),
            Some(&json!("static/dog.jpg"))
        );
    }

    #[tokio::test]
    async fn contains_any_filter_traverses_references() {
        let (store, _image_id, caption_id) = seeded_store().await;

        // A second caption whose image has non-matching tags.
        let other_image = store
            .insert(
                "Image",
                props(&[("imageUrl", json!("static/cat.jpg")), ("tags", json!(["cat"]))]),
                &[0.0, 0.0, 1.0],
            )
            .await
            .unwrap();
        let other_caption = store
            .insert(
                "Caption",
                props(&[("captionText", json!("a cat sleeping"))]),
                &[0.0, 0.9, 0.1],
            )
            .await
            .unwrap();
        store
            .add_references(&[Reference {
                from_collection: "Caption".to_string(),
                from_property: "forImage".to_string(),
                from_id: other_caption,
                to_collection: "Image".to_string(),
                to_id: other_image,
            }])
            .await
            .unwrap();

        let query = NearVectorQuery::new("Caption", vec![0.0, 1.0, 0.0], 10)
            .properties(&["captionText"])
            .filter(WhereFilter::ContainsAny {
                path: vec![
                    "forImage".to_string(),
                    "Image".to_string(),
                    "tags".to_string(),
                ],
                values: vec!["dog".to_string()],
            });
        let hits = store.query_near_vector(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, caption_id);
    }

    #[tokio::test]
    async fn contains_any_filter_on_direct_property() {
        let (store, image_id, _) = seeded_store().await;

        let query = NearVectorQuery::new("Image", vec![1.0, 0.0, 0.0], 10)
            .properties(&["imageUrl"])
            .filter(WhereFilter::ContainsAny {
                path: vec!["tags".to_string()],
                values: vec!["outdoor".to_string(), "indoor".to_string()],
            });
        let hits = store.query_near_vector(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, image_id);

        let none = store
            .query_near_vector(
                &NearVectorQuery::new("Image", vec![1.0, 0.0, 0.0], 10).filter(
                    WhereFilter::ContainsAny {
                        path: vec!["tags".to_string()],
                        values: vec!["indoor".to_string()],
                    },
                ),
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
