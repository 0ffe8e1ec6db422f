// crates/kernel-server/src/client.rs

use kernel_core::OutboundMessage;
use kernel_protocol::wire_types::MAX_FRAME_LEN;
use kernel_protocol::{encode_outbound, ClientFrame, FrameDecoder};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::broker::BrokerHandle;
use crate::types::{ConnectionId, OutboundRx};

/// Run the I/O loops for a single viewer connection.
///
/// The viewer is unregistered from the broker when its reader stops,
/// whatever the reason.
pub async fn run_client(
    id: ConnectionId,
    stream: TcpStream,
    broker: BrokerHandle,
    mut out_rx: OutboundRx,
) -> anyhow::Result<()> {
    let (read_stream, mut write_stream) = stream.into_split();

    // Writer task: consume OutboundMessages and write JSON lines.
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = write_message(&mut write_stream, &msg).await {
                warn!(connection = %id, error = %e, "write failed");
                break;
            }
        }
    });

    let result = run_reader(id, read_stream, &broker).await;

    // Unregistering drops the broker's sender, which ends the writer.
    let _ = broker.unregister(id);
    let _ = writer.await;
    info!(connection = %id, "viewer disconnected");

    result
}

async fn run_reader(
    id: ConnectionId,
    read_stream: OwnedReadHalf,
    broker: &BrokerHandle,
) -> anyhow::Result<()> {
    let mut reader = BufReader::new(read_stream);
    let mut buf = Vec::new();
    let mut decoder = FrameDecoder::new();

    loop {
        let line = match read_frame(&mut reader, &mut buf, MAX_FRAME_LEN).await? {
            Frame::Line(line) => line,
            Frame::Oversize(len) => {
                warn!(connection = %id, len, max = MAX_FRAME_LEN, "oversize frame discarded");
                continue;
            }
            Frame::NotUtf8 => {
                warn!(connection = %id, "non UTF-8 frame discarded");
                continue;
            }
            Frame::Eof => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        match decoder.decode(&line) {
            Ok(ClientFrame::Request(request)) => {
                debug!(connection = %id, request = ?request.request, "request received");
                broker.request(request)?;
            }
            Ok(ClientFrame::Interrupt) => broker.interrupt()?,
            Err(e) => {
                warn!(connection = %id, error = %e, "invalid frame skipped");
            }
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(String),
    /// A line longer than the limit; its length in bytes.
    Oversize(usize),
    NotUtf8,
    Eof,
}

/// Read one newline-terminated frame, holding at most `max_len` bytes of
/// it in memory. The rest of a longer line is skipped.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, max_len: usize) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = max_len as u64 + 1;
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }

    if buf.last() != Some(&b'\n') && read as u64 == limit {
        let mut skipped = read;
        loop {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    reader.consume(pos + 1);
                    skipped += pos + 1;
                    break;
                }
                None => {
                    let len = available.len();
                    reader.consume(len);
                    skipped += len;
                }
            }
        }
        buf.clear();
        return Ok(Frame::Oversize(skipped));
    }

    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    match String::from_utf8(std::mem::take(buf)) {
        Ok(line) => Ok(Frame::Line(line)),
        Err(_) => Ok(Frame::NotUtf8),
    }
}

async fn write_message(stream: &mut OwnedWriteHalf, msg: &OutboundMessage) -> anyhow::Result<()> {
    let mut line = encode_outbound(msg)?;
    line.push('\n');

    stream.write_all(line.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_are_split_on_newlines() {
        let mut reader = BufReader::new(&b"first\r\nsecond\nlast"[..]);
        let mut buf = Vec::new();

        assert_eq!(read_frame(&mut reader, &mut buf, 64).await.unwrap(), Frame::Line("first".into()));
        assert_eq!(read_frame(&mut reader, &mut buf, 64).await.unwrap(), Frame::Line("second".into()));
        assert_eq!(read_frame(&mut reader, &mut buf, 64).await.unwrap(), Frame::Line("last".into()));
        assert_eq!(read_frame(&mut reader, &mut buf, 64).await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn oversize_line_is_skipped_without_buffering() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\nok\n");
        // Small internal buffer so the skip spans several fills.
        let mut reader = BufReader::with_capacity(8, &input[..]);
        let mut buf = Vec::new();

        assert_eq!(read_frame(&mut reader, &mut buf, 10).await.unwrap(), Frame::Oversize(101));
        assert!(buf.capacity() <= 64);
        assert_eq!(read_frame(&mut reader, &mut buf, 10).await.unwrap(), Frame::Line("ok".into()));
    }

    #[tokio::test]
    async fn line_at_the_limit_is_kept() {
        let mut reader = BufReader::new(&b"0123456789\n"[..]);
        let mut buf = Vec::new();

        assert_eq!(
            read_frame(&mut reader, &mut buf, 10).await.unwrap(),
            Frame::Line("0123456789".into())
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_reported() {
        let mut reader = BufReader::new(&b"\xff\xfe\nok\n"[..]);
        let mut buf = Vec::new();

        assert_eq!(read_frame(&mut reader, &mut buf, 64).await.unwrap(), Frame::NotUtf8);
        assert_eq!(read_frame(&mut reader, &mut buf, 64).await.unwrap(), Frame::Line("ok".into()));
    }
}
