//! C6–C10: the derivation services sitting between the HTTP surface and
//! the cache/paginator/upstream stack. Constructed leaves-first in
//! `main.rs` — `pnl` depends on `trades`, `leaderboard` depends on `pnl`,
//! `positions` depends on `trades`; the dependency graph is a DAG (spec §9).

pub mod leaderboard;
pub mod pnl;
pub mod positions;
pub mod trades;
