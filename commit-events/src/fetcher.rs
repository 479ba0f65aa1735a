//! RPC log fetching and chain sync orchestration.
//!
//! For each chain the fetcher:
//! 1. Opens the chain's record tables and reads its cursor.
//! 2. Scans from the cursor up to `tip - confirmations` in adaptive
//!    `eth_getLogs` batches filtered by the contract's event selectors.
//! 3. Per batch, resolves the block timestamps the node did not attach and
//!    feeds every log, in delivery order, through the mapper.
//! 4. Flushes the record tables, then advances the cursor.
//!
//! Nothing is flushed if any log fails to map, so a failed run leaves the
//! tables and cursor exactly as they were.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use anyhow::{Context, Result, anyhow, bail};
use commit_protocol::EventKind;

use crate::config::SyncPlan;
use crate::cursor::Cursor;
use crate::error::HandleError;
use crate::mapper::{self, EventOccurrence};
use crate::parquet::ParquetStore;
use crate::store::{RecordStore, WriteOutcome};

/// Per-request timeout for RPC calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between consecutive RPC calls to avoid rate-limiting.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Maximum consecutive RPC errors before giving up.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Progress is logged every N batches.
const PROGRESS_INTERVAL: u64 = 50;

/// Adaptive block-range sizing for `eth_getLogs`.
///
/// On success the size doubles toward the ceiling; on error the ceiling
/// is permanently lowered so the RPC's actual limit is learned once.
#[derive(Debug)]
struct Batcher {
    size: u64,
    ceiling: u64,
}

impl Batcher {
    const DEFAULT: u64 = 2_000;
    const MIN: u64 = 10;

    const fn new() -> Self {
        Self {
            size: Self::DEFAULT,
            ceiling: Self::DEFAULT,
        }
    }

    /// Grow toward the learned ceiling after a successful request.
    fn grow(&mut self) {
        self.size = self.size.saturating_mul(2).min(self.ceiling);
    }

    /// Shrink and lower the ceiling after a failed request.
    /// Returns `false` when already at the minimum.
    fn shrink(&mut self) -> bool {
        if self.size <= Self::MIN {
            return false;
        }
        self.ceiling = (self.size / 2).max(Self::MIN);
        self.size = self.ceiling;
        true
    }
}

/// Counts from feeding one set of logs through the mapper.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    /// Records newly created.
    pub created: usize,
    /// Occurrences whose record already existed.
    pub duplicates: usize,
}

impl std::ops::AddAssign for IngestStats {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.duplicates += other.duplicates;
    }
}

/// Outcome of a successful chain sync.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// First block scanned (inclusive); `None` if already up to date.
    pub from_block: Option<u64>,
    /// Last block scanned (inclusive).
    pub to_block: u64,
    /// Logs returned by the node.
    pub logs: usize,
    /// Mapper results.
    pub ingest: IngestStats,
}

/// Feed `logs` through the mapper into `store`, in order.
///
/// `timestamps` supplies block timestamps for logs that lack one.
///
/// # Errors
///
/// Stops at the first log that fails to map or persist and returns that
/// error; records created before it stay staged in `store`.
pub fn ingest<S>(
    logs: &[Log],
    timestamps: &HashMap<u64, u64>,
    store: &mut S,
) -> Result<IngestStats, HandleError>
where
    S: RecordStore + ?Sized,
{
    let mut stats = IngestStats::default();
    for log in logs {
        let fallback = log.block_number.and_then(|n| timestamps.get(&n).copied());
        let outcome = match EventOccurrence::from_log(log, fallback) {
            Ok(occurrence) => mapper::handle(occurrence, &mut *store),
            Err(e) => Err(HandleError::from(e)),
        };
        match outcome {
            Ok(WriteOutcome::Created) => stats.created += 1,
            Ok(WriteOutcome::Duplicate) => stats.duplicates += 1,
            Err(e) => {
                tracing::error!(
                    block = ?log.block_number,
                    tx = ?log.transaction_hash,
                    log_index = ?log.log_index,
                    error = %e,
                    "failed to map log"
                );
                return Err(e);
            }
        }
    }
    Ok(stats)
}

/// Totals of one [`scan`].
#[derive(Debug, Default, Clone, Copy)]
struct ScanTotals {
    logs: usize,
    ingest: IngestStats,
}

/// Scan `[from, to]` for the contract's logs and map them into `store`.
///
/// Each batch is mapped as soon as it arrives, after its missing block
/// timestamps are fetched, so only one batch of raw logs is held at a time.
/// RPC failures of `eth_getLogs` shrink the batch and retry; a mapping
/// failure aborts the scan.
async fn scan<P, S>(
    provider: &P,
    address: Address,
    (from, to): (u64, u64),
    chain_id: u64,
    store: &mut S,
) -> Result<ScanTotals>
where
    P: Provider,
    S: RecordStore + ?Sized,
{
    let selectors: Vec<B256> = EventKind::selectors();
    let mut totals = ScanTotals::default();
    let mut block = from;
    let mut batch = Batcher::new();
    let mut count = 0u64;
    let mut errors = 0u32;

    while block <= to {
        let end = block.saturating_add(batch.size - 1).min(to);
        let filter = Filter::new()
            .address(address)
            .event_signature(selectors.clone())
            .from_block(block)
            .to_block(end);

        let result = tokio::time::timeout(REQUEST_TIMEOUT, provider.get_logs(&filter))
            .await
            .map_err(|_| anyhow!("request timed out"))
            .and_then(|r| r.map_err(|e| anyhow!("{e}")));

        let logs = match result {
            Ok(logs) => logs,
            Err(e) => {
                errors += 1;
                if errors >= MAX_CONSECUTIVE_ERRORS {
                    bail!("chain {chain_id}: {errors} consecutive errors at block {block}: {e}");
                }
                if !batch.shrink() {
                    bail!("chain {chain_id}: failed at min batch size (block {block}): {e}");
                }
                tracing::warn!(chain_id, block, batch_size = batch.size, error = %e, "retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
                continue;
            }
        };
        errors = 0;

        if !logs.is_empty() {
            let timestamps = resolve_timestamps(provider, &logs, chain_id).await?;
            totals.ingest += ingest(&logs, &timestamps, &mut *store)
                .with_context(|| format!("chain {chain_id}: mapping logs in [{block}, {end}]"))?;
            totals.logs += logs.len();
        }

        batch.grow();
        block = end + 1;
        count += 1;
        if count.is_multiple_of(PROGRESS_INTERVAL) {
            tracing::info!(
                chain_id,
                batch = count,
                block,
                logs = totals.logs,
                created = totals.ingest.created,
                progress = %pct(block, from, to),
                "scanning"
            );
        }
        tokio::time::sleep(INTER_BATCH_DELAY).await;
    }

    Ok(totals)
}

/// Fetch timestamps for every block whose logs arrived without one.
async fn resolve_timestamps<P: Provider>(
    provider: &P,
    logs: &[Log],
    chain_id: u64,
) -> Result<HashMap<u64, u64>> {
    let missing: BTreeSet<u64> = logs
        .iter()
        .filter(|l| l.block_timestamp.is_none())
        .filter_map(|l| l.block_number)
        .collect();
    if !missing.is_empty() {
        tracing::debug!(chain_id, blocks = missing.len(), "fetching block timestamps");
    }

    let mut timestamps = HashMap::with_capacity(missing.len());
    for number in missing {
        let block = tokio::time::timeout(
            REQUEST_TIMEOUT,
            provider.get_block_by_number(BlockNumberOrTag::Number(number)),
        )
        .await
        .with_context(|| format!("get_block_by_number({number}) timed out"))?
        .with_context(|| format!("get_block_by_number({number}) failed"))?
        .with_context(|| format!("block {number} not found"))?;
        timestamps.insert(number, block.header.timestamp);
    }
    Ok(timestamps)
}

/// Format progress as a percentage string.
fn pct(current: u64, from: u64, to: u64) -> String {
    if to <= from {
        return "100%".into();
    }
    #[allow(clippy::cast_precision_loss, reason = "display only")]
    let ratio = (current.min(to) - from) as f64 / (to - from) as f64 * 100.0;
    format!("{ratio:.0}%")
}

/// Synchronize a single chain with automatic RPC fallback.
///
/// Tries each RPC in `plan.rpcs` in order. On failure the next endpoint is
/// attempted; the cursor only advances after a full flush, and duplicate-id
/// rejection absorbs any overlap with a previous partial run.
///
/// The data directory layout is:
/// ```text
/// <data_dir>/<chain_id>/
///   ├── cursor.json
///   ├── commitment_created.parquet
///   ├── commitment_joined.parquet
///   └── ...one file per event kind seen
/// ```
///
/// # Errors
///
/// Returns an error if the chain's cursor belongs to another contract,
/// if `plan.rpcs` is empty, or if *all* RPCs fail.
pub async fn sync_chain(plan: &SyncPlan, data_dir: &Path) -> Result<SyncReport> {
    let chain_id = plan.chain_id;
    let chain_dir = data_dir.join(chain_id.to_string());
    std::fs::create_dir_all(&chain_dir)
        .with_context(|| format!("creating {}", chain_dir.display()))?;
    let start = Cursor::load(&chain_dir, plan.contract)?
        .map_or(plan.start_block, |c| c.last_block + 1);

    let mut last_err = None;
    for (i, rpc_url) in plan.rpcs.iter().enumerate() {
        match try_sync(plan, &chain_dir, start, rpc_url).await {
            Ok(report) => return Ok(report),
            Err(e) => {
                if let Some(next) = plan.rpcs.get(i + 1) {
                    tracing::warn!(
                        chain_id,
                        rpc = %rpc_url,
                        next = %next,
                        error = %e,
                        "RPC failed, falling back"
                    );
                } else {
                    tracing::error!(chain_id, rpc = %rpc_url, error = %e, "last RPC failed");
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("chain {chain_id}: no RPC endpoints configured")))
}

/// Attempt a sync from `start` using a single RPC endpoint.
async fn try_sync(
    plan: &SyncPlan,
    chain_dir: &Path,
    start: u64,
    rpc_url: &str,
) -> Result<SyncReport> {
    let chain_id = plan.chain_id;
    tracing::info!(chain_id, rpc = rpc_url, "connecting");

    let provider = ProviderBuilder::new().connect_http(
        rpc_url
            .parse()
            .with_context(|| format!("invalid RPC URL: {rpc_url}"))?,
    );

    let latest = tokio::time::timeout(REQUEST_TIMEOUT, provider.get_block_number())
        .await
        .context("get_block_number timed out")?
        .context("get_block_number failed")?;
    let safe = latest.saturating_sub(plan.confirmations);

    if start > safe {
        tracing::info!(chain_id, latest, safe, "already up to date");
        return Ok(SyncReport {
            to_block: safe,
            ..SyncReport::default()
        });
    }

    tracing::info!(
        chain_id,
        contract = %plan.contract,
        from = start,
        to = safe,
        blocks = safe - start + 1,
        "syncing"
    );

    let mut store = ParquetStore::open(chain_dir)
        .with_context(|| format!("opening record tables in {}", chain_dir.display()))?;

    let totals = scan(&provider, plan.contract, (start, safe), chain_id, &mut store).await?;

    let written = store.flush().context("flushing record tables")?;
    Cursor::now(plan.contract, safe).save(chain_dir)?;
    tracing::info!(
        chain_id,
        logs = totals.logs,
        written,
        duplicates = totals.ingest.duplicates,
        last_block = safe,
        "cursor updated"
    );

    Ok(SyncReport {
        from_block: Some(start),
        to_block: safe,
        logs: totals.logs,
        ingest: totals.ingest,
    })
}
