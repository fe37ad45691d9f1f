use futures::stream::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ChangeEvent;
use crate::handler::EventHandler;
use crate::{Error, Result};

/// Drives `events` into `handler` until the stream ends, a callback fails or
/// `cancel` fires. Returns the number of events handled.
///
/// Callback errors are returned unchanged.
pub async fn run_source<S>(
    mut events: S,
    handler: &dyn EventHandler,
    cancel: &CancellationToken,
) -> Result<u64>
where
    S: Stream<Item = Result<ChangeEvent>> + Unpin,
{
    let mut handled = 0u64;

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                info!(handled, "Event source cancelled");
                break;
            }
            next = events.next() => next,
        };

        let Some(event) = next else {
            info!(handled, "Event source exhausted");
            break;
        };

        let event = event?;
        if let Err(e) = handler.handle(&event).await {
            warn!(
                handler = handler.identity(),
                kind = event.kind(),
                error = %e,
                "Handler rejected event"
            );
            return Err(e);
        }
        handled += 1;
    }

    Ok(handled)
}

/// Reads newline-delimited JSON change events. Blank lines are skipped;
/// a malformed line yields an error naming its line number.
pub fn json_lines<R>(reader: R) -> impl Stream<Item = Result<ChangeEvent>>
where
    R: AsyncRead + Unpin,
{
    LinesStream::new(BufReader::new(reader).lines())
        .enumerate()
        .filter_map(|(idx, line)| async move {
            let line_no = idx + 1;
            match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(parse_line(&line, line_no)),
                Err(e) => Some(Err(Error::Io(e))),
            }
        })
}

fn parse_line(line: &str, line_no: usize) -> Result<ChangeEvent> {
    let event = serde_json::from_str::<ChangeEvent>(line).map_err(|e| Error::InvalidMessage {
        message: format!("line {}: {}", line_no, e),
    })?;
    debug!(line_no, kind = event.kind(), "Parsed change event");
    Ok(event)
}
