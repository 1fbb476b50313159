//! Chunk driver for the resumable upload protocol.
//!
//! The server reports `x-goog-upload-status: active` after every intermediate
//! chunk and `final` once the `upload, finalize` command has been accepted.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::{Error, Result};

pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// 一个分片的上传结果：服务端状态与（仅最后一片携带的）资源。
pub type ChunkOutcome<P> = (String, Option<P>);

pub fn finalize_upload<P>(status: &str, value: Option<P>) -> Result<P> {
    if status != "final" {
        return Err(Error::Parse {
            message: format!("Upload finalize failed: {status}"),
        });
    }
    value.ok_or_else(|| Error::Parse {
        message: "Upload completed but response body was empty".into(),
    })
}

/// 以 [`CHUNK_SIZE`] 为单位读取 `reader` 并依次交给 `send_chunk`。
///
/// `send_chunk(chunk, offset, finalize)` 负责发出一次 HTTP 请求。空数据仍会
/// 发送一个 finalize 分片。
pub async fn upload_chunks<R, P, F, Fut>(
    reader: &mut R,
    total_size: u64,
    chunk_size: usize,
    mut send_chunk: F,
) -> Result<P>
where
    R: AsyncRead + Unpin,
    F: FnMut(Vec<u8>, u64, bool) -> Fut,
    Fut: Future<Output = Result<ChunkOutcome<P>>>,
{
    if total_size == 0 {
        let (status, payload) = send_chunk(Vec::new(), 0, true).await?;
        return finalize_upload(&status, payload);
    }

    let mut offset: u64 = 0;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        let read_bytes = read_full(reader, &mut buffer).await?;
        if read_bytes == 0 {
            return Err(Error::Parse {
                message: format!("Unexpected EOF at offset {offset} of {total_size}"),
            });
        }

        let finalize = offset + read_bytes as u64 >= total_size;
        debug!(offset, len = read_bytes, finalize, "uploading chunk");
        let (status, payload) = send_chunk(buffer[..read_bytes].to_vec(), offset, finalize).await?;
        if finalize {
            return finalize_upload(&status, payload);
        }
        if status != "active" {
            return Err(Error::Parse {
                message: format!("Unexpected upload status: {status}"),
            });
        }
        offset += read_bytes as u64;
    }
}

/// 尽量填满缓冲区；只有到达 EOF 时才会返回不足一片的长度。
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
