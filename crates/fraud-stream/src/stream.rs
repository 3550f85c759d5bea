//! Path: crates/fraud-stream/src/stream.rs
use crate::infra_err;
use fraud_types::error::{ConfigurationError, TransientInfrastructureError};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;

/// One entry read back from the transactions stream, as delivered to a
/// consumer group member.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// A thin wrapper around a Redis connection manager exposing the stream
/// operations the ingestion service and evaluation worker need: append,
/// consumer-group read, ack, and idle-entry reclaim (§4.2).
pub struct StreamClient {
    conn: ConnectionManager,
}

impl StreamClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Ensures the stream and consumer group exist. A `BUSYGROUP` error
    /// (group already exists) is treated as success, matching the
    /// idempotent-initialization requirement in §4.2.
    pub async fn ensure_group(&mut self, stream: &str, group: &str) -> Result<(), ConfigurationError> {
        let result: redis::RedisResult<()> = self
            .conn
            .xgroup_create_mkstream(stream, group, "$")
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(ConfigurationError::GroupCreationFailed {
                stream: stream.to_string(),
                group: group.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Appends entries in chunks of `chunk_size`, each append capped to an
    /// approximately-trimmed `maxlen` (§4.1 step 8). Returns the assigned
    /// stream IDs in submission order.
    pub async fn xadd_chunked(
        &mut self,
        stream: &str,
        entries: &[HashMap<String, String>],
        chunk_size: usize,
        maxlen: u64,
        approx: bool,
    ) -> Result<Vec<String>, TransientInfrastructureError> {
        let mut ids = Vec::with_capacity(entries.len());
        let trim = if approx { "~" } else { "=" };
        for chunk in entries.chunks(chunk_size.max(1)) {
            let mut pipe = redis::pipe();
            for fields in chunk {
                let kv: Vec<(&str, &str)> =
                    fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                pipe.cmd("XADD")
                    .arg(stream)
                    .arg("MAXLEN")
                    .arg(trim)
                    .arg(maxlen)
                    .arg("*")
                    .arg(&kv);
            }
            let chunk_ids: Vec<String> = pipe
                .query_async(&mut self.conn)
                .await
                .map_err(|e| infra_err("xadd_chunked", e))?;
            ids.extend(chunk_ids);
        }
        Ok(ids)
    }

    /// Block-reads up to `count` new entries for this consumer, for up to
    /// `block_ms` milliseconds (§4.3 step 2).
    pub async fn read_batch(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamEntry>, TransientInfrastructureError> {
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms as usize);
        let reply: StreamReadReply = self
            .conn
            .xread_options(&[stream], &[">"], &opts)
            .await
            .map_err(|e| infra_err("read_batch", e))?;
        let mut out = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                let mut fields = HashMap::with_capacity(id.map.len());
                for (k, v) in id.map {
                    if let redis::Value::Data(bytes) = v {
                        fields.insert(k, String::from_utf8_lossy(&bytes).into_owned());
                    }
                }
                out.push(StreamEntry { id: id.id, fields });
            }
        }
        Ok(out)
    }

    /// Acknowledges every entry ID in a single pipelined `XACK` call (§4.3 step 9).
    pub async fn ack(
        &mut self,
        stream: &str,
        group: &str,
        ids: &[String],
    ) -> Result<(), TransientInfrastructureError> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: i64 = self
            .conn
            .xack(stream, group, ids)
            .await
            .map_err(|e| infra_err("ack", e))?;
        Ok(())
    }

    /// Reclaims entries idle longer than `min_idle_ms` for this consumer,
    /// paginating with `XAUTOCLAIM` until the returned cursor is `0` (§4.3
    /// step 1, §9 re-architecture item "periodic tick ... paginate autoclaim
    /// until the returned next-cursor is zero").
    pub async fn reclaim(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: i64,
        page_size: usize,
    ) -> Result<Vec<StreamEntry>, TransientInfrastructureError> {
        let mut cursor = "0-0".to_string();
        let mut out = Vec::new();
        loop {
            let reply: redis::Value = redis::cmd("XAUTOCLAIM")
                .arg(stream)
                .arg(group)
                .arg(consumer)
                .arg(min_idle_ms)
                .arg(&cursor)
                .arg("COUNT")
                .arg(page_size)
                .query_async(&mut self.conn)
                .await
                .map_err(|e| infra_err("reclaim", e))?;
            let (next_cursor, entries) = parse_xautoclaim(reply);
            out.extend(entries);
            if next_cursor == "0-0" || next_cursor == cursor {
                break;
            }
            cursor = next_cursor;
        }
        Ok(out)
    }
}

fn parse_xautoclaim(value: redis::Value) -> (String, Vec<StreamEntry>) {
    let redis::Value::Bulk(top) = value else {
        return ("0-0".to_string(), Vec::new());
    };
    let mut iter = top.into_iter();
    let cursor = match iter.next() {
        Some(redis::Value::Data(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => "0-0".to_string(),
    };
    let mut out = Vec::new();
    if let Some(redis::Value::Bulk(entries)) = iter.next() {
        for entry in entries {
            if let redis::Value::Bulk(mut pair) = entry {
                if pair.len() != 2 {
                    continue;
                }
                let fields_val = pair.pop();
                let id_val = pair.pop();
                let id = match id_val {
                    Some(redis::Value::Data(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                    _ => continue,
                };
                let mut fields = HashMap::new();
                if let Some(redis::Value::Bulk(flat)) = fields_val {
                    let mut it = flat.into_iter();
                    while let (Some(k), Some(v)) = (it.next(), it.next()) {
                        if let (redis::Value::Data(kb), redis::Value::Data(vb)) = (k, v) {
                            fields.insert(
                                String::from_utf8_lossy(&kb).into_owned(),
                                String::from_utf8_lossy(&vb).into_owned(),
                            );
                        }
                    }
                }
                out.push(StreamEntry { id, fields });
            }
        }
    }
    (cursor, out)
}
