//! Встроенное хранилище объектов: бинарные блобы по ключу с контрольной
//! суммой CRC32 и временем создания/изменения.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::{BufMut, Bytes};
use parking_lot::RwLock;
use tracing::trace;

/// Метаданные объекта.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    pub crc32: u32,
    pub created_at_ms: i64,
    pub modified_at_ms: i64,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    meta: ObjectMetadata,
}

/// Движок одной object-коллекции.
#[derive(Debug, Default)]
pub struct ObjectEngine {
    objects: RwLock<HashMap<String, StoredObject>>,
    size_bytes: AtomicU64,
}

impl ObjectMetadata {
    /// Длина закодированных метаданных на проводе.
    pub const ENCODED_LEN: usize = 8 + 4 + 8 + 8;

    pub fn encode_into(
        &self,
        buf: &mut Vec<u8>,
    ) {
        buf.put_u64(self.size);
        buf.put_u32(self.crc32);
        buf.put_i64(self.created_at_ms);
        buf.put_i64(self.modified_at_ms);
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        let mut r = crate::protocol::WireReader::new(buf);
        Some(Self {
            size: r.u64().ok()?,
            crc32: r.u32().ok()?,
            created_at_ms: r.i64().ok()?,
            modified_at_ms: r.i64().ok()?,
        })
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl ObjectEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Сохраняет объект. При перезаписи время создания сохраняется.
    pub fn put(
        &self,
        key: impl Into<String>,
        data: Bytes,
    ) -> ObjectMetadata {
        let key = key.into();
        let now = now_ms();
        let size = data.len() as u64;
        let crc32 = crc32fast::hash(&data);

        let mut objects = self.objects.write();
        let created_at_ms = objects
            .get(&key)
            .map(|o| o.meta.created_at_ms)
            .unwrap_or(now);
        let meta = ObjectMetadata {
            size,
            crc32,
            created_at_ms,
            modified_at_ms: now,
        };
        if let Some(old) = objects.insert(key, StoredObject { data, meta }) {
            self.size_bytes.fetch_sub(old.meta.size, Ordering::AcqRel);
        }
        self.size_bytes.fetch_add(size, Ordering::AcqRel);
        trace!(size, crc32, "object: stored");
        meta
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<Bytes> {
        self.objects.read().get(key).map(|o| o.data.clone())
    }

    pub fn metadata(
        &self,
        key: &str,
    ) -> Option<ObjectMetadata> {
        self.objects.read().get(key).map(|o| o.meta)
    }

    pub fn exists(
        &self,
        key: &str,
    ) -> bool {
        self.objects.read().contains_key(key)
    }

    /// Удаляет объект; `false`, если его не было.
    pub fn delete(
        &self,
        key: &str,
    ) -> bool {
        match self.objects.write().remove(key) {
            Some(old) => {
                self.size_bytes.fetch_sub(old.meta.size, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> u32 {
        u32::try_from(self.objects.read().len()).unwrap_or(u32::MAX)
    }

    pub fn size(&self) -> u64 {
        self.size_bytes.load(Ordering::Acquire)
    }
}
