use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use harvest_core::ChunkSettings;

/// Split `items` into consecutive chunks and run `worker` over each, at most
/// `max_concurrency` at a time. Returns the sum of the per-chunk counts.
///
/// With `max_concurrency == 1` chunks run inline in order. Otherwise counts
/// are summed as chunks finish, in whatever order that is. The first chunk
/// error aborts the chunks still running and is returned.
pub async fn process_in_chunks<T, F, Fut>(
    items: Vec<T>,
    settings: ChunkSettings,
    worker: F,
) -> Result<usize>
where
    T: Send + 'static,
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<usize>> + Send + 'static,
{
    let chunks = into_chunks(items, settings.chunk_size.max(1));
    let chunk_count = chunks.len();

    if settings.max_concurrency <= 1 {
        let mut total = 0;
        for chunk in chunks {
            total += worker(chunk).await?;
        }
        tracing::debug!(chunks = chunk_count, total, "sequential chunks done");
        return Ok(total);
    }

    let worker = Arc::new(worker);
    let semaphore = Arc::new(Semaphore::new(settings.max_concurrency));
    let mut join_set: JoinSet<Result<usize>> = JoinSet::new();
    let mut total = 0usize;

    for chunk in chunks {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| anyhow!("chunk semaphore closed: {e}"))?;

        // Surface failures of already-finished chunks before starting more.
        while let Some(joined) = join_set.try_join_next() {
            total += settle(joined, &mut join_set)?;
        }

        let worker = worker.clone();
        join_set.spawn(async move {
            let _permit = permit;
            worker(chunk).await
        });
    }

    while let Some(joined) = join_set.join_next().await {
        total += settle(joined, &mut join_set)?;
    }

    tracing::debug!(
        chunks = chunk_count,
        max_concurrency = settings.max_concurrency,
        total,
        "parallel chunks done"
    );
    Ok(total)
}

fn settle(
    joined: std::result::Result<Result<usize>, tokio::task::JoinError>,
    join_set: &mut JoinSet<Result<usize>>,
) -> Result<usize> {
    match joined {
        Ok(Ok(count)) => Ok(count),
        Ok(Err(err)) => {
            join_set.abort_all();
            Err(err)
        }
        Err(join_err) => {
            join_set.abort_all();
            Err(anyhow!("chunk worker panicked: {join_err}"))
        }
    }
}

fn into_chunks<T>(items: Vec<T>, chunk_size: usize) -> Vec<Vec<T>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(chunk_size).collect());
    }
    chunks
}
