//! TCP transport: one JSON envelope per line in both directions.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use craftsync_server::{ClientLink, Message, WorldManager};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Longest inbound line accepted. Longer frames are skipped whole.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Accept connections until the listener fails.
pub async fn serve(listener: TcpListener, manager: Arc<WorldManager>) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            handle_connection(stream, peer, manager).await;
        });
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, manager: Arc<WorldManager>) {
    let (read, write) = stream.into_split();
    let (outbox, rx) = mpsc::unbounded_channel();
    let mut link = ClientLink::new(manager.next_connection_id(), outbox);
    let conn = link.id;
    tracing::info!(%conn, %peer, "connection opened");

    let writer = tokio::spawn(write_loop(write, rx));

    let mut reader = BufReader::new(read);
    let mut frame = Vec::new();
    loop {
        match read_frame(&mut reader, &mut frame).await {
            Ok(Frame::Eof) => break,
            Ok(Frame::Oversized) => {
                tracing::warn!(%conn, limit = MAX_FRAME_BYTES, "dropping oversized frame");
            }
            Ok(Frame::Line) => {
                // Malformed frames are dropped; the connection stays open.
                let text = match std::str::from_utf8(&frame) {
                    Ok(text) => text.trim(),
                    Err(e) => {
                        tracing::warn!(%conn, error = %e, "dropping frame that is not utf-8");
                        continue;
                    }
                };
                if text.is_empty() {
                    continue;
                }
                match Message::decode(text) {
                    Ok(message) => manager.handle_message(&mut link, message).await,
                    Err(e) => tracing::warn!(%conn, error = %e, "dropping malformed message"),
                }
            }
            Err(e) => {
                tracing::warn!(%conn, error = %e, "read failed");
                break;
            }
        }
    }

    manager.disconnect(&mut link).await;
    writer.abort();
    tracing::info!(%conn, %peer, "connection closed");
}

#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// `buf` holds one line, newline included if the peer sent one.
    Line,
    /// The line exceeded [`MAX_FRAME_BYTES`] and was discarded.
    Oversized,
    Eof,
}

/// Read up to and including the next newline into `buf`, never buffering
/// more than [`MAX_FRAME_BYTES`] of it.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut oversized = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match (oversized, buf.is_empty()) {
                (true, _) => Frame::Oversized,
                (false, true) => Frame::Eof,
                (false, false) => Frame::Line,
            });
        }
        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        if !oversized {
            if buf.len() + used > MAX_FRAME_BYTES {
                oversized = true;
                buf.clear();
            } else {
                buf.extend_from_slice(&available[..used]);
            }
        }
        reader.consume(used);
        if done {
            return Ok(if oversized { Frame::Oversized } else { Frame::Line });
        }
    }
}

async fn write_loop(mut write: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        let mut line = match message.encode() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(tag = message.tag(), error = %e, "encode failed");
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = write.write_all(line.as_bytes()).await {
            tracing::debug!(error = %e, "write failed, peer gone");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftsync_common::{EntityUid, WorldId};
    use craftsync_persist::InMemoryStore;
    use craftsync_server::message::{JoinWorld, WorldRef};

    async fn start() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let manager = Arc::new(WorldManager::new(Arc::new(InMemoryStore::new())));
        tokio::spawn(serve(listener, manager));
        addr
    }

    fn join_missing() -> Vec<u8> {
        let mut line = Message::JoinWorld(JoinWorld {
            my_uid: EntityUid::from("p"),
            world_id: WorldId::from("missing"),
        })
        .encode()
        .unwrap()
        .into_bytes();
        line.push(b'\n');
        line
    }

    async fn assert_not_found_reply(stream: TcpStream) {
        let mut lines = BufReader::new(stream).lines();
        let line = lines.next_line().await.unwrap().expect("connection closed");
        assert_eq!(
            Message::decode(&line).unwrap(),
            Message::WorldNotFound(WorldRef {
                world_id: WorldId::from("missing")
            })
        );
    }

    #[tokio::test]
    async fn invalid_utf8_frame_keeps_the_connection_open() {
        let addr = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"\xff\xfe\n").await.unwrap();
        stream.write_all(b"{not json}\n").await.unwrap();
        stream.write_all(&join_missing()).await.unwrap();
        assert_not_found_reply(stream).await;
    }

    #[tokio::test]
    async fn oversized_frame_is_skipped() {
        let addr = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut huge = vec![b'a'; MAX_FRAME_BYTES + 10];
        huge.push(b'\n');
        stream.write_all(&huge).await.unwrap();
        stream.write_all(&join_missing()).await.unwrap();
        assert_not_found_reply(stream).await;
    }

    #[tokio::test]
    async fn frames_split_on_newlines() {
        let input: &[u8] = b"one\n\ntwo";
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"one\n");
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"\n");
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"two");
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Eof);
    }
}
