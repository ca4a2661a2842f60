//! Producer-side descriptor publishing.
//!
//! Each file descriptor is serialized, gzipped, and written into the KV
//! store under `<prefix>/data/<server>/<file>`, guarded by a checksum key
//! under `<prefix>/checksum/<server>/<file>`. The checksum is the hex SHA-1
//! of the gzipped bytes, so a re-publish of unchanged content issues no
//! writes at all, and concurrent producers converge through compare-and-set
//! on the checksum key. After all files land, `<prefix>/notify` is bumped
//! once to wake registry watchers.

use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;
use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::kv::{Client, QueryOptions, TxnOpKv, TxnVerb};
use crate::pb;

/// Delay between attempts after a transient KV failure or a lost CAS.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Publishes a server's file descriptors into the registry.
pub struct Registrator {
    client: Client,
    prefix: String,
}

impl Registrator {
    pub fn new(client: Client, prefix: &str) -> Self {
        Registrator {
            client,
            prefix: prefix.to_string(),
        }
    }

    fn checksum_key(&self, server: &str, file: &str) -> String {
        format!("{}/checksum/{}/{}", self.prefix, server, file)
    }

    fn data_key(&self, server: &str, file: &str) -> String {
        format!("{}/data/{}/{}", self.prefix, server, file)
    }

    /// Read the last published checksum and its version. An absent key reads
    /// as no version (index 0), which makes the subsequent CAS an
    /// only-if-absent write.
    async fn get_checksum(&self, cancel: &CancellationToken, key: &str) -> Result<(String, u64)> {
        let (entry, _) = self.client.get(cancel, key, QueryOptions::default()).await?;
        match entry {
            Some(e) => Ok((
                String::from_utf8_lossy(&e.value).into_owned(),
                e.modify_index,
            )),
            None => Ok((String::new(), 0)),
        }
    }

    /// Atomically publish one file: CAS the checksum key at its last seen
    /// version and set the data key in the same transaction.
    async fn set_file_data(
        &self,
        cancel: &CancellationToken,
        chksum_key: &str,
        chksum: &str,
        data_key: &str,
        data: &[u8],
        last_ver: u64,
    ) -> Result<bool> {
        let (ok, _) = self
            .client
            .txn()
            .kv(TxnOpKv {
                verb: TxnVerb::Cas,
                key: chksum_key.to_string(),
                value: chksum.as_bytes().to_vec(),
                index: last_ver,
            })
            .kv(TxnOpKv {
                verb: TxnVerb::Set,
                key: data_key.to_string(),
                value: data.to_vec(),
                index: 0,
            })
            .commit(cancel)
            .await?;
        Ok(ok)
    }

    async fn sync_file_data(
        &self,
        cancel: &CancellationToken,
        server: &str,
        file: &str,
        data: &[u8],
    ) -> Result<()> {
        let data_key = self.data_key(server, file);
        let chksum_key = self.checksum_key(server, file);
        let chksum = hex::encode(Sha1::digest(data));

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match self.get_checksum(cancel, &chksum_key).await {
                Ok((last_chksum, last_ver)) => {
                    if last_chksum == chksum {
                        return Ok(());
                    }
                    match self
                        .set_file_data(cancel, &chksum_key, &chksum, &data_key, data, last_ver)
                        .await
                    {
                        Ok(true) => return Ok(()),
                        Ok(false) => {
                            tracing::debug!(file, "lost checksum cas, retrying");
                        }
                        Err(Error::Cancelled) => return Err(Error::Cancelled),
                        Err(err) => {
                            tracing::warn!(file, error = %err, "publish txn failed, retrying");
                        }
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    tracing::warn!(file, error = %err, "checksum read failed, retrying");
                }
            }

            pause(cancel).await?;
        }
    }

    /// Bump `<prefix>/notify` so watchers re-list the data tree. The value
    /// is only a change signal; readers wait on the index, not the content.
    async fn notify_update(&self, cancel: &CancellationToken) -> Result<()> {
        let key = format!("{}/notify", self.prefix);
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
                .to_string();
            match self.client.put(cancel, &key, stamp.into_bytes()).await {
                Ok(_) => return Ok(()),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    tracing::warn!(error = %err, "notify write failed, retrying");
                }
            }
            pause(cancel).await?;
        }
    }

    /// Publish `files` for `server`, in input order, then signal the change.
    ///
    /// Idempotent: re-publishing identical content issues no KV writes.
    /// Observers may see partial progress while the call is in flight.
    pub async fn register_files(
        &self,
        cancel: &CancellationToken,
        server: &str,
        files: &[pb::FileDescriptorProto],
    ) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let mut proto_buf = Vec::new();
        for f in files {
            proto_buf.clear();
            f.encode(&mut proto_buf)?;
            let compressed = gzip_compress(&proto_buf)?;
            self.sync_file_data(cancel, server, f.name(), &compressed)
                .await?;
        }
        self.notify_update(cancel).await
    }
}

/// Sleep out the retry delay, returning early with `Cancelled` if the token
/// fires first.
async fn pause(cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(RETRY_DELAY) => Ok(()),
    }
}

fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
