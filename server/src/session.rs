//! One connected player: line reader plus a dedicated writer task

use crate::network::ServerEvent;
use crate::registry::{SessionHandle, SessionId, SESSION_QUEUE_CAPACITY};
use log::{debug, info, warn};
use shared::ClientMessage;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Drives a connection until the peer goes away, its writer fails or the
/// server drops its handle
///
/// The first line is the requested display name. Every later line is decoded
/// as a client command and forwarded to the event loop; lines that do not
/// decode are logged and discarded.
pub async fn run_session<S>(
    stream: S,
    addr: SocketAddr,
    session: SessionId,
    events: mpsc::UnboundedSender<ServerEvent>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    let name = match read_line(&mut reader, &mut buf).await {
        Ok(Some(name)) => name,
        Ok(None) => {
            debug!("{} closed before sending a name", addr);
            return;
        }
        Err(e) => {
            warn!("Failed to read name from {}: {}", addr, e);
            return;
        }
    };

    let (handle, outbound, mut closed) = SessionHandle::new(SESSION_QUEUE_CAPACITY);
    let mut writer_task = tokio::spawn(write_lines(writer, outbound, session));

    if events
        .send(ServerEvent::Joined {
            session,
            addr,
            name,
            handle,
        })
        .is_err()
    {
        writer_task.abort();
        return;
    }

    loop {
        tokio::select! {
            line = read_line(&mut reader, &mut buf) => match line {
                Ok(Some(line)) => match ClientMessage::decode(&line) {
                    Ok(message) => {
                        if events.send(ServerEvent::Inbound { session, message }).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Discarding line from session {}: {} ({:?})", session, e, line),
                },
                Ok(None) => {
                    info!("Session {} ({}) disconnected", session, addr);
                    break;
                }
                Err(e) => {
                    warn!("Read error on session {}: {}", session, e);
                    break;
                }
            },
            _ = &mut writer_task => {
                debug!("Writer for session {} stopped", session);
                break;
            }
            _ = &mut closed => {
                info!("Session {} ({}) closed by server", session, addr);
                break;
            }
        }
    }

    writer_task.abort();
    let _ = events.send(ServerEvent::Disconnected { session });
}

/// Reads one line without its terminator. Bytes that are not UTF-8 are
/// replaced rather than failing the read. Returns None at end of stream.
///
/// Partial input stays in `buf` if the read is cancelled, so the next call
/// picks up where this one stopped.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    reader.read_until(b'\n', buf).await?;
    if buf.is_empty() {
        return Ok(None);
    }

    let mut line: &[u8] = &buf[..];
    if let Some(stripped) = line.strip_suffix(b"\n") {
        line = stripped;
    }
    if let Some(stripped) = line.strip_suffix(b"\r") {
        line = stripped;
    }
    let decoded = String::from_utf8_lossy(line).into_owned();
    buf.clear();
    Ok(Some(decoded))
}

/// Writes queued lines in order until the queue closes or a write fails
async fn write_lines<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<String>,
    session: SessionId,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbound.recv().await {
        let framed = format!("{}\n", line);
        if let Err(e) = writer.write_all(framed.as_bytes()).await {
            warn!("Write error on session {}: {}", session, e);
            break;
        }
        if let Err(e) = writer.flush().await {
            warn!("Flush error on session {}: {}", session, e);
            break;
        }
    }

    let _ = writer.shutdown().await;
}
