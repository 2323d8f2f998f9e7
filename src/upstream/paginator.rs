//! C3: assembles the full fill set for a `(user, window)` via repeated C2
//! calls with stateful cursor advance (spec §4.3).

use crate::address::Address;
use crate::models::RawFill;
use crate::upstream::client::{DataSource, UpstreamError, BATCH_MAX};

/// Fetches every fill in `[from_ms, to_ms]`, optionally restricted to a
/// single `coin` (case-insensitive). Aborts the whole window on any
/// upstream error — no partial results are returned (spec §7 propagation
/// policy).
///
/// The cursor advances by `lastTime + 1` using the *unfiltered* batch's
/// last timestamp, per spec §4.3 — this can drop fills exactly
/// co-timestamped with the split point; that is the accepted upstream
/// contract (spec §9 open question), not a bug to fix here.
pub async fn fetch_all_fills(
    source: &dyn DataSource,
    user: &Address,
    coin: Option<&str>,
    from_ms: i64,
    to_ms: i64,
) -> Result<Vec<RawFill>, UpstreamError> {
    let mut cursor = from_ms;
    let mut out = Vec::new();

    loop {
        let batch = source.fetch_fills_once(user, cursor, to_ms).await?;
        if batch.is_empty() {
            break;
        }

        let unfiltered_len = batch.len();
        let last_time = batch.last().expect("checked non-empty above").time;

        match coin {
            Some(coin) => out.extend(
                batch
                    .into_iter()
                    .filter(|f| f.coin.eq_ignore_ascii_case(coin)),
            ),
            None => out.extend(batch),
        }

        if unfiltered_len < BATCH_MAX {
            break;
        }
        cursor = last_time + 1;
    }

    out.sort_by_key(|f| f.time);
    Ok(out)
}
