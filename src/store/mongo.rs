// MongoDB-backed credential store

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::error::{Error as MongoError, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT};
use mongodb::options::{ClientOptions, FindOptions, IndexOptions, ReplaceOptions};
use mongodb::{Client, ClientSession, Database, IndexModel};
use std::time::Duration;
use tracing::{info, warn};

use super::{CredentialStore, StoreError, TxnRetry, TxnRetryPolicy};

/// Give up the initial connection attempt after 10 seconds and close idle
/// pooled connections after 45 seconds. The driver reconnects on its own
/// after a disconnect; in-flight requests during an outage surface as
/// ordinary store errors.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_IDLE_TIME: Duration = Duration::from_secs(45);

pub struct MongoStore {
    db: Database,
    client: Client,
}

impl MongoStore {
    /// Connects to the store and ensures the unique index on normalized
    /// emails exists.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.max_idle_time = Some(MAX_IDLE_TIME);

        let client =
            Client::with_options(options).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let db = client.database(db_name);

        let store = Self { db, client };
        store.ensure_indexes().await?;
        info!(db = %db_name, "Store: connected");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.db
            .collection::<Document>("users")
            .create_index(index, None)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn apply_writes(
        &self,
        session: &mut ClientSession,
        collection: &str,
        docs: &[Document],
    ) -> Result<(), StoreError> {
        let coll = self.db.collection::<Document>(collection);
        for doc in docs {
            let id = doc
                .get("_id")
                .cloned()
                .ok_or_else(|| StoreError::Document("document missing _id".to_string()))?;
            coll.replace_one_with_session(
                doc! { "_id": id },
                doc.clone(),
                ReplaceOptions::builder().upsert(true).build(),
                session,
            )
            .await
            .map_err(map_error)?;
        }
        Ok(())
    }

}

fn map_error(e: MongoError) -> StoreError {
    if e.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        StoreError::Transient(e.to_string())
    } else if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) {
        StoreError::CommitAmbiguous(e.to_string())
    } else {
        StoreError::Other(e.to_string())
    }
}

#[async_trait]
impl CredentialStore for MongoStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.db
            .collection::<Document>(collection)
            .find_one(filter, None)
            .await
            .map_err(map_error)
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Result<Vec<Document>, StoreError> {
        let options = FindOptions::builder()
            .sort(sort)
            .skip(skip)
            .limit(limit)
            .build();
        let cursor = self
            .db
            .collection::<Document>(collection)
            .find(filter, options)
            .await
            .map_err(map_error)?;
        cursor.try_collect().await.map_err(map_error)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        let cursor = self
            .db
            .collection::<Document>(collection)
            .aggregate(pipeline, None)
            .await
            .map_err(map_error)?;
        cursor.try_collect().await.map_err(map_error)
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<(), StoreError> {
        self.db
            .collection::<Document>(collection)
            .insert_one(doc, None)
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, StoreError> {
        self.db
            .collection::<Document>(collection)
            .update_one(filter, update, None)
            .await
            .map(|r| r.modified_count)
            .map_err(map_error)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        self.db
            .collection::<Document>(collection)
            .delete_one(filter, None)
            .await
            .map(|r| r.deleted_count)
            .map_err(map_error)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        self.db
            .collection::<Document>(collection)
            .delete_many(filter, None)
            .await
            .map(|r| r.deleted_count)
            .map_err(map_error)
    }

    async fn count(&self, collection: &str, filter: Option<Document>) -> Result<u64, StoreError> {
        let coll = self.db.collection::<Document>(collection);
        match filter {
            Some(filter) => coll.count_documents(filter, None).await.map_err(map_error),
            None => coll.estimated_document_count(None).await.map_err(map_error),
        }
    }

    async fn save_with_transaction(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<(), StoreError> {
        let mut session = self
            .client
            .start_session(None)
            .await
            .map_err(map_error)?;

        // Bounded retry loop instead of retry-by-recursion; TxnRetryPolicy
        // decides whether an error restarts the whole transaction, retries
        // the commit only, or gives up.
        let mut policy = TxnRetryPolicy::new();
        'transaction: loop {
            session
                .start_transaction(None)
                .await
                .map_err(map_error)?;

            if let Err(e) = self.apply_writes(&mut session, collection, &docs).await {
                let _ = session.abort_transaction().await;
                match policy.on_error(&e) {
                    TxnRetry::RetryTransaction => {
                        warn!(error = %e, "Store: transient transaction error, retrying transaction");
                        continue 'transaction;
                    }
                    _ => return Err(e),
                }
            }

            loop {
                match session.commit_transaction().await.map_err(map_error) {
                    Ok(()) => return Ok(()),
                    Err(e) => match policy.on_error(&e) {
                        TxnRetry::RetryTransaction => {
                            warn!(error = %e, "Store: transient commit error, retrying transaction");
                            continue 'transaction;
                        }
                        TxnRetry::RetryCommit => {
                            warn!("Store: commit outcome unknown, retrying commit");
                        }
                        TxnRetry::GiveUp => return Err(e),
                    },
                }
            }
        }
    }
}
