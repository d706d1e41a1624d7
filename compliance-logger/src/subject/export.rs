use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::search::find;
use super::{unbounded_window, SearchOptions, SubjectIdentifiers};
use crate::config::LogLayout;
use crate::error::LoggerResult;

pub(crate) async fn export<W>(
    layout: &LogLayout,
    ids: &SubjectIdentifiers,
    sink: &mut W,
) -> LoggerResult<usize>
where
    W: AsyncWrite + Unpin,
{
    let (from, to) = unbounded_window();
    let result = find(layout, ids, from, to, &SearchOptions::default()).await?;

    let body = serde_json::to_vec_pretty(&result)?;
    sink.write_all(&body).await?;
    sink.flush().await?;

    tracing::info!(subject = %result.subject, entries = result.total_entries, "Subject data exported");
    Ok(result.total_entries)
}
