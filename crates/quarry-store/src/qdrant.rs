//! Qdrant-backed vector store.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder, point_id::PointIdOptions,
};

use crate::error::{Result, StoreError};
use crate::vector_store::{ScoredPoint, VectorPoint, VectorStore};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct QdrantStore {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore").finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// Connect to a Qdrant endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

impl VectorStore for QdrantStore {
    fn ensure_collection(&self, collection: &str, vector_size: u64) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(&collection)
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            if exists {
                return Ok(());
            }

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&collection)
                        .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
                )
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;

            // Keyword index on `path` backs the filter-delete used to
            // invalidate modified and removed files.
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &collection,
                    "path",
                    FieldType::Keyword,
                ))
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;

            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&collection)
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .delete_collection(&collection)
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if points.is_empty() {
                return Ok(());
            }
            let mut qdrant_points = Vec::with_capacity(points.len());
            for p in points {
                let payload = to_qdrant_payload(p.payload)?;
                qdrant_points.push(PointStruct::new(p.id, p.vector, payload));
            }
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, qdrant_points))
                .await
                .map_err(|e| StoreError::Upsert(e.to_string()))?;
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredPoint>>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let results = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&collection, vector, limit).with_payload(true),
                )
                .await
                .map_err(|e| StoreError::Search(e.to_string()))?;

            Ok(results
                .result
                .into_iter()
                .map(|point| ScoredPoint {
                    id: point_id_string(point.id.as_ref()),
                    score: point.score,
                    payload: from_qdrant_payload(&point.payload),
                })
                .collect())
        })
    }

    fn delete_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        let field = field.to_owned();
        let value = value.to_owned();
        Box::pin(async move {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(Filter::must(vec![Condition::matches(field, value)])),
                )
                .await
                .map_err(|e| StoreError::Delete(e.to_string()))?;
            Ok(())
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let response = self
                .client
                .count(CountPointsBuilder::new(&collection).exact(true))
                .await
                .map_err(|e| StoreError::Count(e.to_string()))?;
            Ok(response.result.map_or(0, |r| r.count))
        })
    }
}

fn to_qdrant_payload(
    payload: HashMap<String, serde_json::Value>,
) -> Result<HashMap<String, qdrant_client::qdrant::Value>> {
    let object = serde_json::Value::Object(payload.into_iter().collect());
    serde_json::from_value(object).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_qdrant_payload(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> HashMap<String, serde_json::Value> {
    let mut out = HashMap::with_capacity(payload.len());
    for (key, value) in payload {
        // The indexing payload only carries strings and line numbers.
        let json = if let Some(s) = value.as_str() {
            serde_json::Value::String(s.clone())
        } else if let Some(i) = value.as_integer() {
            serde_json::Value::from(i)
        } else {
            continue;
        };
        out.insert(key.clone(), json);
    }
    out
}

fn point_id_string(id: Option<&qdrant_client::qdrant::PointId>) -> String {
    match id.and_then(|p| p.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(s)) => s.clone(),
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_roundtrip_strings_and_ints() {
        let mut payload = HashMap::new();
        payload.insert("path".to_string(), serde_json::json!("src/a.ts"));
        payload.insert("startLine".to_string(), serde_json::json!(3));

        let qdrant = to_qdrant_payload(payload).unwrap();
        let back = from_qdrant_payload(&qdrant);

        assert_eq!(back.get("path").unwrap(), "src/a.ts");
        assert_eq!(back.get("startLine").unwrap(), 3);
    }

    #[test]
    fn point_id_string_variants() {
        let uuid = qdrant_client::qdrant::PointId {
            point_id_options: Some(PointIdOptions::Uuid("abc-def".into())),
        };
        assert_eq!(point_id_string(Some(&uuid)), "abc-def");

        let num = qdrant_client::qdrant::PointId {
            point_id_options: Some(PointIdOptions::Num(7)),
        };
        assert_eq!(point_id_string(Some(&num)), "7");

        assert_eq!(point_id_string(None), "");
    }
}
