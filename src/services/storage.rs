//! Upload blob store
//!
//! Thin boundary around the store holding uploaded CSV files. Backed by a
//! JetStream object store bucket; the trait keeps the pipeline decoupled
//! from the transport.

use anyhow::Result;
use async_nats::jetstream::{self, object_store};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::info;

const BUCKET: &str = "ADRESAR_UPLOADS";

/// Byte store for uploaded source files, addressed by key.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// JetStream object store implementation
pub struct JetStreamFileStore {
    store: object_store::ObjectStore,
}

impl JetStreamFileStore {
    pub async fn new(js: &jetstream::Context) -> Result<Self> {
        let store = match js.get_object_store(BUCKET).await {
            Ok(store) => store,
            Err(_) => {
                js.create_object_store(object_store::Config {
                    bucket: BUCKET.to_string(),
                    ..Default::default()
                })
                .await?
            }
        };
        info!("JetStream object store '{}' ready", BUCKET);

        Ok(Self { store })
    }
}

#[async_trait]
impl FileStore for JetStreamFileStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut reader = bytes;
        self.store.put(key, &mut reader).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut object = self.store.get(key).await?;
        let mut bytes = Vec::new();
        object.read_to_end(&mut bytes).await?;
        Ok(bytes)
    }
}
