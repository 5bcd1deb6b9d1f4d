//! Wire Message Format
//!
//! Defines the request envelope and the length-prefixed frame encoding used
//! on every connection between nodes.

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for a single frame. A length prefix beyond this is treated as
/// a corrupt stream rather than an allocation request.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// A request as it travels on the wire: the operation itself, flattened next
/// to the two per-request flags.
///
/// `reply` asks the receiver to send back the handler's result; `close` asks
/// it to drop the connection once the request is done. Both default to false
/// so a plain `{"op": ...}` object is a valid fire-and-forget request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(flatten)]
    pub op: T,
    #[serde(default)]
    pub reply: bool,
    #[serde(default)]
    pub close: bool,
}

impl<T> Envelope<T> {
    /// Fire-and-forget: no reply, connection stays open.
    pub fn send_only(op: T) -> Self {
        Self {
            op,
            reply: false,
            close: false,
        }
    }

    /// Request/reply on a connection that stays open.
    pub fn request(op: T) -> Self {
        Self {
            op,
            reply: true,
            close: false,
        }
    }

    /// Request/reply, then the receiver closes the connection.
    pub fn request_closing(op: T) -> Self {
        Self {
            op,
            reply: true,
            close: true,
        }
    }
}

/// Writes one framed message and flushes it.
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(message).context("Failed to serialize message")?;

    if payload.len() > MAX_FRAME_BYTES {
        bail!(
            "Refusing to send a {} byte frame (limit {})",
            payload.len(),
            MAX_FRAME_BYTES
        );
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;

    Ok(())
}

/// Reads one framed message. Errors on a closed or corrupt stream.
pub async fn read_message<T, R>(reader: &mut R) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let len = reader
        .read_u32()
        .await
        .context("Connection closed while reading frame length")? as usize;

    if len > MAX_FRAME_BYTES {
        bail!("Frame length {} exceeds limit {}", len, MAX_FRAME_BYTES);
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .context("Connection closed mid-frame")?;

    serde_json::from_slice(&payload).context("Failed to deserialize message")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "op", rename_all = "kebab-case")]
    enum TestOp {
        AddKeys { keys: Vec<String> },
        Terminate,
    }

    #[test]
    fn test_envelope_wire_shape() {
        let env = Envelope::request_closing(TestOp::AddKeys {
            keys: vec!["x".to_string()],
        });

        let json = serde_json::to_value(&env).unwrap();

        assert_eq!(json["op"], "add-keys");
        assert_eq!(json["keys"][0], "x");
        assert_eq!(json["reply"], true);
        assert_eq!(json["close"], true);
    }

    #[test]
    fn test_envelope_flags_default_to_false() {
        let parsed: Envelope<TestOp> = serde_json::from_str(r#"{"op":"terminate"}"#).unwrap();

        assert_eq!(parsed.op, TestOp::Terminate);
        assert!(!parsed.reply);
        assert!(!parsed.close);
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        write_message(&mut a, &TestOp::Terminate).await.unwrap();
        write_message(
            &mut a,
            &TestOp::AddKeys {
                keys: vec!["k1".to_string(), "k2".to_string()],
            },
        )
        .await
        .unwrap();

        let first: TestOp = read_message(&mut b).await.unwrap();
        let second: TestOp = read_message(&mut b).await.unwrap();

        assert_eq!(first, TestOp::Terminate);
        assert_eq!(
            second,
            TestOp::AddKeys {
                keys: vec!["k1".to_string(), "k2".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_read_from_closed_stream_fails() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);

        let result: Result<TestOp> = read_message(&mut b).await;
        assert!(result.is_err());
    }
}
