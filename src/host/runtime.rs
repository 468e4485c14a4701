//! Host event loop: newline-delimited JSON on the input stream, pushes
//! when the document file changes.

use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::protocol::{OutboundMessage, Push};
use super::service::NativeHost;
use crate::error::{Result, SyncError};
use crate::sync::watcher::{Debouncer, FileWatcher, WatchEvent};

/// Serve requests until the input ends or `shutdown` resolves.
///
/// Messages are written in the order they are produced, each followed by
/// a newline and a flush.
pub async fn run<R, W, FW, F>(
    host: &mut NativeHost,
    reader: R,
    mut writer: W,
    watcher: &FW,
    shutdown: F,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    FW: FileWatcher + ?Sized,
    F: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = watcher.watch(
        host.document_path(),
        Box::new(move |event| {
            let _ = tx.send(event);
        }),
    )?;
    info!("Native host ready, document {}", host.document_path().display());

    let mut lines = reader.lines();
    let mut debouncer = Debouncer::new(host.config().debounce);
    let mut watching = true;
    tokio::pin!(shutdown);

    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down native host");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let out = host.handle_line(&line);
                    send_all(&mut writer, &out).await?;
                }
                Ok(None) => {
                    info!("Input closed, shutting down");
                    break;
                }
                Err(e) => return Err(SyncError::io("<stdin>", e)),
            },
            event = rx.recv(), if watching => match event {
                Some(WatchEvent::Error(e)) => warn!("Watcher error: {}", e),
                Some(event) if event.triggers_sync() => {
                    debug!("Document event: {:?}", event);
                    debouncer.on_event(Instant::now());
                }
                Some(event) => debug!("Ignoring {:?}", event),
                None => {
                    warn!("File watch closed, change notifications disabled");
                    watching = false;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(far_future)), if deadline.is_some() => {
                if debouncer.poll(Instant::now()) {
                    let push = match host.on_document_changed() {
                        Ok(push) => push,
                        Err(e) => {
                            warn!("Failed to read changed document: {}", e);
                            Some(Push::Error { error: e.to_string() })
                        }
                    };
                    debouncer.finish();
                    if let Some(push) = push {
                        send_all(&mut writer, &[push.into()]).await?;
                    }
                }
            }
        }
    }

    handle.cancel();
    writer
        .flush()
        .await
        .map_err(|e| SyncError::io("<stdout>", e))
}

async fn send_all<W>(writer: &mut W, messages: &[OutboundMessage]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for message in messages {
        let mut line = message.to_line()?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SyncError::io("<stdout>", e))?;
        writer
            .flush()
            .await
            .map_err(|e| SyncError::io("<stdout>", e))?;
    }
    Ok(())
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}
