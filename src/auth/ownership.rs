// Ownership resolver - decides whether the caller owns the targeted documents

use bson::{doc, Bson, Document};
use futures::future::join_all;
use tracing::debug;

use crate::common::ApiError;
use crate::store::CredentialStore;

/// Ties an URL resource segment to the collection and the fields that name
/// its owner. A resource absent from this map is not ownership-gated.
pub struct ResourceOwnerEntry {
    pub resource: &'static str,
    pub collection: &'static str,
    pub owner_fields: &'static [&'static str],
}

pub const RESOURCE_OWNER_MAP: &[ResourceOwnerEntry] = &[ResourceOwnerEntry {
    resource: "users",
    collection: "users",
    owner_fields: &["_id"],
}];

/// A plural owner field holds an array of owner ids, a singular one a
/// single id.
fn owner_predicate(field: &str, caller_id: &str) -> Document {
    if field.ends_with('s') {
        doc! { "$in": [caller_id, format!("${}", field)] }
    } else {
        doc! { "$eq": [format!("${}", field), caller_id] }
    }
}

/// One predicate per id-like path parameter. The `me` alias resolves to the
/// caller's own id.
fn target_predicates(params: &[(String, String)], caller_id: &str) -> Vec<Bson> {
    params
        .iter()
        .filter(|(name, _)| name.to_lowercase().contains("id"))
        .map(|(_, value)| {
            let value = if value == "me" { caller_id } else { value.as_str() };
            Bson::Document(doc! { "$eq": ["$_id", value] })
        })
        .collect()
}

/// Resolves ownership for every mapped resource named in the matched route.
/// The caller owns the request if any mapped collection holds a document
/// that matches both a target predicate and an owner predicate.
pub async fn check_resource_ownership(
    store: &dyn CredentialStore,
    matched_path: &str,
    params: &[(String, String)],
    caller_id: &str,
) -> Result<(), ApiError> {
    let entries: Vec<&ResourceOwnerEntry> = matched_path
        .split('/')
        .filter_map(|segment| RESOURCE_OWNER_MAP.iter().find(|e| e.resource == segment))
        .collect();
    if entries.is_empty() {
        return Ok(());
    }

    // Empty collections cannot be owned by anyone; let the request through
    // so the handler produces its own not-found response.
    let counts = join_all(entries.iter().map(|e| store.count(e.collection, None))).await;
    let mut any_documents = false;
    for count in counts {
        if count? > 0 {
            any_documents = true;
        }
    }
    if !any_documents {
        debug!("Ownership: all mapped collections empty, skipping check");
        return Ok(());
    }

    let targets = target_predicates(params, caller_id);
    let lookups = entries.iter().map(|entry| {
        let owners: Vec<Bson> = entry
            .owner_fields
            .iter()
            .map(|field| Bson::Document(owner_predicate(field, caller_id)))
            .collect();
        let query = if targets.is_empty() {
            doc! { "$or": owners }
        } else {
            doc! { "$and": [ { "$or": targets.clone() }, { "$or": owners } ] }
        };
        store.aggregate(entry.collection, vec![doc! { "$match": { "$expr": query } }])
    });
    for result in join_all(lookups).await {
        if !result?.is_empty() {
            debug!(caller_id = %caller_id, "Ownership: caller owns the targeted resource");
            return Ok(());
        }
    }
    Err(ApiError::Forbidden)
}
