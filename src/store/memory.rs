// In-process credential store
//
// Backs the test suite. Evaluates the filter/pipeline operator subset the
// crate generates; anything outside that subset is a hard error so a test
// never silently passes on an unevaluated query.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{CredentialStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unsupported(what: &str) -> StoreError {
    StoreError::Other(format!("memory store: unsupported operator: {}", what))
}

/// Resolves an aggregation-expression operand: `"$field"` reads from the
/// document, anything else is a literal.
fn resolve_operand<'a>(doc: &'a Document, operand: &'a Bson) -> &'a Bson {
    if let Bson::String(s) = operand {
        if let Some(field) = s.strip_prefix('$') {
            return doc.get(field).unwrap_or(&Bson::Null);
        }
    }
    operand
}

fn eval_expr(doc: &Document, expr: &Document) -> Result<bool, StoreError> {
    for (op, operand) in expr {
        let ok = match op.as_str() {
            "$and" => {
                let items = operand.as_array().ok_or_else(|| unsupported("$and"))?;
                let mut all = true;
                for item in items {
                    let sub = item.as_document().ok_or_else(|| unsupported("$and"))?;
                    all &= eval_expr(doc, sub)?;
                }
                all
            }
            "$or" => {
                let items = operand.as_array().ok_or_else(|| unsupported("$or"))?;
                let mut any = false;
                for item in items {
                    let sub = item.as_document().ok_or_else(|| unsupported("$or"))?;
                    any |= eval_expr(doc, sub)?;
                }
                any
            }
            "$eq" => {
                let pair = operand.as_array().ok_or_else(|| unsupported("$eq"))?;
                if pair.len() != 2 {
                    return Err(unsupported("$eq arity"));
                }
                resolve_operand(doc, &pair[0]) == resolve_operand(doc, &pair[1])
            }
            "$in" => {
                let pair = operand.as_array().ok_or_else(|| unsupported("$in"))?;
                if pair.len() != 2 {
                    return Err(unsupported("$in arity"));
                }
                let needle = resolve_operand(doc, &pair[0]);
                match resolve_operand(doc, &pair[1]) {
                    Bson::Array(haystack) => haystack.contains(needle),
                    _ => false,
                }
            }
            other => return Err(unsupported(other)),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_field_condition(value: Option<&Bson>, condition: &Bson) -> Result<bool, StoreError> {
    if let Bson::Document(ops) = condition {
        if ops.keys().any(|k| k.starts_with('$')) {
            for (op, operand) in ops {
                let ok = match op.as_str() {
                    "$regex" => {
                        let pattern = operand.as_str().ok_or_else(|| unsupported("$regex"))?;
                        let case_insensitive = ops
                            .get_str("$options")
                            .map(|o| o.contains('i'))
                            .unwrap_or(false);
                        let pattern = if case_insensitive {
                            format!("(?i){}", pattern)
                        } else {
                            pattern.to_string()
                        };
                        let re = regex::Regex::new(&pattern)
                            .map_err(|e| StoreError::Other(format!("bad regex: {}", e)))?;
                        value.and_then(Bson::as_str).map(|v| re.is_match(v)).unwrap_or(false)
                    }
                    "$options" => true, // consumed by $regex
                    other => return Err(unsupported(other)),
                };
                if !ok {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }
    Ok(value == Some(condition))
}

fn matches_filter(doc: &Document, filter: &Document) -> Result<bool, StoreError> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$or" => {
                let items = condition.as_array().ok_or_else(|| unsupported("$or"))?;
                let mut any = false;
                for item in items {
                    let sub = item.as_document().ok_or_else(|| unsupported("$or"))?;
                    any |= matches_filter(doc, sub)?;
                }
                any
            }
            "$and" => {
                let items = condition.as_array().ok_or_else(|| unsupported("$and"))?;
                let mut all = true;
                for item in items {
                    let sub = item.as_document().ok_or_else(|| unsupported("$and"))?;
                    all &= matches_filter(doc, sub)?;
                }
                all
            }
            "$expr" => {
                let expr = condition.as_document().ok_or_else(|| unsupported("$expr"))?;
                eval_expr(doc, expr)?
            }
            field => matches_field_condition(doc.get(field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Int32(x), Bson::Int32(y)) => x.cmp(y),
        (Bson::Int64(x), Bson::Int64(y)) => x.cmp(y),
        (Bson::Double(x), Bson::Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(None);
        };
        for doc in docs {
            if matches_filter(doc, &filter)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let mut found = Vec::new();
        if let Some(docs) = collections.get(collection) {
            for doc in docs {
                if matches_filter(doc, &filter)? {
                    found.push(doc.clone());
                }
            }
        }
        if let Some(sort) = sort {
            if let Some((field, direction)) = sort.iter().next() {
                let descending = matches!(direction, Bson::Int32(-1) | Bson::Int64(-1));
                found.sort_by(|a, b| {
                    let ord = compare_bson(
                        a.get(field).unwrap_or(&Bson::Null),
                        b.get(field).unwrap_or(&Bson::Null),
                    );
                    if descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
            }
        }
        let skip = skip.unwrap_or(0) as usize;
        let mut found: Vec<Document> = found.into_iter().skip(skip).collect();
        if let Some(limit) = limit {
            found.truncate(limit as usize);
        }
        Ok(found)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let mut docs: Vec<Document> = collections.get(collection).cloned().unwrap_or_default();
        for stage in &pipeline {
            let (name, spec) = stage
                .iter()
                .next()
                .ok_or_else(|| unsupported("empty pipeline stage"))?;
            match name.as_str() {
                "$match" => {
                    let filter = spec.as_document().ok_or_else(|| unsupported("$match"))?;
                    let mut kept = Vec::new();
                    for doc in docs {
                        if matches_filter(&doc, filter)? {
                            kept.push(doc);
                        }
                    }
                    docs = kept;
                }
                other => return Err(unsupported(other)),
            }
        }
        Ok(docs)
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().push(doc);
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, StoreError> {
        let set = update
            .get_document("$set")
            .map_err(|_| unsupported("update without $set"))?
            .clone();
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            for doc in docs.iter_mut() {
                if matches_filter(doc, &filter)? {
                    for (k, v) in set {
                        doc.insert(k, v);
                    }
                    return Ok(1);
                }
            }
        }
        Ok(0)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            for (i, doc) in docs.iter().enumerate() {
                if matches_filter(doc, &filter)? {
                    docs.remove(i);
                    return Ok(1);
                }
            }
        }
        Ok(0)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let mut deleted = 0;
        if let Some(docs) = collections.get_mut(collection) {
            let mut kept = Vec::with_capacity(docs.len());
            for doc in docs.drain(..) {
                if matches_filter(&doc, &filter)? {
                    deleted += 1;
                } else {
                    kept.push(doc);
                }
            }
            *docs = kept;
        }
        Ok(deleted)
    }

    async fn count(&self, collection: &str, filter: Option<Document>) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(0);
        };
        match filter {
            None => Ok(docs.len() as u64),
            Some(filter) => {
                let mut count = 0;
                for doc in docs {
                    if matches_filter(doc, &filter)? {
                        count += 1;
                    }
                }
                Ok(count)
            }
        }
    }

    async fn save_with_transaction(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();
        for doc in docs {
            let id = doc
                .get("_id")
                .cloned()
                .ok_or_else(|| StoreError::Document("document missing _id".to_string()))?;
            match stored.iter_mut().find(|d| d.get("_id") == Some(&id)) {
                Some(existing) => *existing = doc,
                None => stored.push(doc),
            }
        }
        Ok(())
    }
}
