//! `weftend`: deterministic, local, fail-closed artifact intake and triage
//! scanner. This crate re-exports the workspace's library surface; the CLI
//! binary (`src/main.rs`) is the only caller-layer piece on top of it.

pub use weftend_adapters as adapters;
pub use weftend_capture as capture;
pub use weftend_classify as classify;
pub use weftend_library as library;
pub use weftend_mint as mint;
pub use weftend_orchestrator as orchestrator;
pub use weftend_policy as policy;
pub use weftend_receipt as receipt;
pub use weftend_redaction as redaction;
pub use weftend_shadow_audit as shadow_audit;
pub use weftend_summary as summary;
pub use weftend_util as util;
