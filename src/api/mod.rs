// =============================================================================
// HTTP API
// =============================================================================
//
// - `rest` — JSON endpoints over the latest rows, the screener and the live
//   stream buffer

pub mod rest;
