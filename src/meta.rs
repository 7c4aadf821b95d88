//! Welcome, database-details, and the deliberately-unsupported database
//! lifecycle endpoints (spec §4.6).

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::db_name::DatabaseRef;
use crate::error::BridgeError;
use crate::index::IndexClient;
use crate::uuid_store::UuidStore;

#[derive(Debug, Serialize)]
pub struct Welcome {
    pub couchdb: &'static str,
    pub version: &'static str,
    pub vendor: Vendor,
}

#[derive(Debug, Serialize)]
pub struct Vendor {
    pub name: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DatabaseDetails {
    pub db_name: String,
    pub instance_start_time: String,
    pub disk_format_version: u32,
    pub uuid: String,
}

pub struct MetaOps {
    index_client: Arc<dyn IndexClient>,
    uuid_store: Arc<UuidStore>,
}

impl MetaOps {
    pub fn new(index_client: Arc<dyn IndexClient>, uuid_store: Arc<UuidStore>) -> Self {
        Self {
            index_client,
            uuid_store,
        }
    }

    /// `GET /`: identifies this as a CAPI-speaking endpoint to the Source.
    pub fn welcome(&self) -> Welcome {
        Welcome {
            couchdb: "Welcome",
            version: "1.2.0",
            vendor: Vendor {
                name: "capi-bridge",
            },
        }
    }

    /// `HEAD /<db>`: does the named bucket exist, and if the Source is
    /// asserting a UUID, does it match ours (spec §4.6)?
    pub async fn database_exists(
        &self,
        db: &DatabaseRef,
    ) -> Result<bool, BridgeError> {
        if !self.index_client.index_exists(&db.index).await? {
            return Ok(false);
        }

        if let Some(expected) = &db.uuid {
            let actual = self.uuid_store.get_bucket_uuid(&db.index).await?;
            if &actual != expected {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// `GET /<db>` (spec §4.6): fails with `uuids_dont_match` semantics by
    /// returning `IndexMissing` when the UUID embedded in the db name
    /// doesn't match what's on record, same as `database_exists`.
    pub async fn get_database_details(
        &self,
        db: &DatabaseRef,
    ) -> Result<DatabaseDetails, BridgeError> {
        if !self.database_exists(db).await? {
            return Err(BridgeError::IndexMissing(db.index.clone()));
        }
        let uuid = self.uuid_store.get_bucket_uuid(&db.index).await?;
        Ok(DatabaseDetails {
            db_name: db.name_without_uuid(),
            instance_start_time: "0".to_string(),
            disk_format_version: 6,
            uuid,
        })
    }

    /// `PUT /<db>` and `DELETE /<db>` (spec §4.6, Non-goals): the bridge
    /// never provisions or tears down Index indices on the Source's say-so.
    pub fn create_database(&self) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("createDatabase"))
    }

    pub fn delete_database(&self) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("deleteDatabase"))
    }

    /// `POST /<db>/_ensure_full_commit` (spec §4.6): the Index has no
    /// separate durability barrier to request, so this is trivially ok.
    pub fn ensure_full_commit(&self) -> Value {
        serde_json::json!({ "ok": true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::test_support::CountingUuidGenerator;
    use crate::index::{BulkOp, BulkOutcome};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeIndexClient {
        exists: bool,
        docs: Mutex<HashMap<String, Value>>,
    }

    #[async_trait]
    impl IndexClient for FakeIndexClient {
        async fn index_exists(&self, _index: &str) -> Result<bool, BridgeError> {
            Ok(self.exists)
        }

        async fn get(&self, _index: &str, _doc_type: &str, id: &str) -> Result<Option<Value>, BridgeError> {
            Ok(self.docs.lock().unwrap().get(id).cloned())
        }

        async fn multi_get(
            &self,
            _index: &str,
            _items: &[(String, String)],
        ) -> Result<Vec<Option<Value>>, BridgeError> {
            unimplemented!()
        }

        async fn create_only(
            &self,
            _index: &str,
            _doc_type: &str,
            id: &str,
            body: &Value,
        ) -> Result<bool, BridgeError> {
            let mut docs = self.docs.lock().unwrap();
            if docs.contains_key(id) {
                return Ok(false);
            }
            docs.insert(id.to_string(), body.clone());
            Ok(true)
        }

        async fn put(&self, _index: &str, _doc_type: &str, _id: &str, _body: &Value) -> Result<(), BridgeError> {
            unimplemented!()
        }

        async fn bulk(&self, _index: &str, _ops: &[BulkOp]) -> Result<BulkOutcome, BridgeError> {
            unimplemented!()
        }
    }

    fn meta_ops(exists: bool) -> MetaOps {
        let client = Arc::new(FakeIndexClient {
            exists,
            docs: Mutex::new(HashMap::new()),
        });
        let uuid_store = Arc::new(UuidStore::new(
            client.clone(),
            Arc::new(CountingUuidGenerator::default()),
            "couchbaseCheckpoint".to_string(),
        ));
        MetaOps::new(client, uuid_store)
    }

    #[tokio::test]
    async fn welcome_identifies_as_couchdb_compatible() {
        let ops = meta_ops(true);
        assert_eq!(ops.welcome().couchdb, "Welcome");
    }

    #[tokio::test]
    async fn missing_index_reports_database_does_not_exist() {
        let ops = meta_ops(false);
        let db = DatabaseRef::parse("bucket1");
        assert!(!ops.database_exists(&db).await.unwrap());
    }

    #[tokio::test]
    async fn mismatched_uuid_reports_database_does_not_exist() {
        let ops = meta_ops(true);
        let db = DatabaseRef::parse("bucket1;abc123");
        assert!(!ops.database_exists(&db).await.unwrap());
    }

    #[tokio::test]
    async fn matching_uuid_reports_database_exists() {
        let ops = meta_ops(true);
        let bootstrap = DatabaseRef::parse("bucket1");
        let uuid = ops.uuid_store.get_bucket_uuid(&bootstrap.index).await.unwrap();

        let db = DatabaseRef::parse(&format!("bucket1;{}", uuid));
        assert!(ops.database_exists(&db).await.unwrap());
    }

    #[tokio::test]
    async fn create_and_delete_database_are_unsupported() {
        let ops = meta_ops(true);
        assert!(matches!(
            ops.create_database(),
            Err(BridgeError::Unsupported(_))
        ));
        assert!(matches!(
            ops.delete_database(),
            Err(BridgeError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn ensure_full_commit_is_always_ok() {
        let ops = meta_ops(true);
        assert_eq!(ops.ensure_full_commit(), serde_json::json!({"ok": true}));
    }
}
