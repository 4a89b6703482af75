//! Relay wire frames
//!
//! ```text
//! ┌──────────────┬──────────────────────────┐
//! │ len: u32 BE  │ bincode(Frame), len bytes│
//! └──────────────┴──────────────────────────┘
//! ```

use crate::error::{BusError, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes allowed on top of the payload for the frame's own fields
pub const FRAME_OVERHEAD: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Client registers subscription `sid` for `subject`
    Subscribe { sid: u64, subject: String },
    Unsubscribe { sid: u64 },
    /// Client publishes a message
    Publish {
        subject: String,
        reply_to: Option<String>,
        payload: Vec<u8>,
    },
    /// Server delivers a message matching subscription `sid`
    Deliver {
        sid: u64,
        subject: String,
        reply_to: Option<String>,
        payload: Vec<u8>,
    },
    /// Round trip marker; every frame sent before it has been processed
    /// when the matching `Pong` arrives
    Ping { id: u64 },
    Pong { id: u64 },
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
    let body = bincode::serialize(frame)?;
    let len = u32::try_from(body.len()).map_err(|_| BusError::Frame("frame exceeds u32 length".to_string()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame; `Ok(None)` on a clean end of stream
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_frame: usize) -> Result<Option<Frame>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame {
        return Err(BusError::PayloadTooLarge { size: len, max: max_frame });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(bincode::deserialize(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_stream() {
        let (mut a, mut b) = tokio::io::duplex(1 << 16);
        let frames = vec![
            Frame::Subscribe {
                sid: 1,
                subject: "kv.>".into(),
            },
            Frame::Publish {
                subject: "kv.discover".into(),
                reply_to: Some("_INBOX.x".into()),
                payload: b"{}".to_vec(),
            },
        ];
        for frame in &frames {
            write_frame(&mut a, frame).await.unwrap();
        }
        drop(a);

        for frame in &frames {
            assert_eq!(read_frame(&mut b, 1024).await.unwrap().as_ref(), Some(frame));
        }
        assert_eq!(read_frame(&mut b, 1024).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1 << 16);
        let frame = Frame::Publish {
            subject: "a".into(),
            reply_to: None,
            payload: vec![0; 256],
        };
        write_frame(&mut a, &frame).await.unwrap();
        assert!(matches!(
            read_frame(&mut b, 64).await,
            Err(BusError::PayloadTooLarge { .. })
        ));
    }
}
