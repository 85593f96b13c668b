//! chartcheck - end-to-end verification of an asynchronous chart pipeline
//!
//! This crate starts the dashboard under test, waits for it to accept
//! connections, drives one headless browser page through a declarative
//! scenario and judges the run by the diagnostic markers the dashboard writes
//! to the browser console:
//! - Spawns the target in its own process group and always tears the group down
//! - Probes TCP readiness with a bounded retry budget
//! - Controls Playwright over a line-delimited JSON protocol
//! - Compares marker counts before and after a UI stimulus
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Harness                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TargetProcess::start()      -> process group               │
//! │  ReadinessCheck::wait_for()  -> READY | StartupError        │
//! │  BrowserSession::open()      -> page + DiagnosticLog        │
//! │  Engine::run()                                              │
//! │    NAVIGATING -> WAITING_INITIAL_EVENT -> STABILIZING       │
//! │    -> [INTERACTING -> WAITING_POST_EVENT]                   │
//! │    -> CAPTURING -> DONE | FAILED                            │
//! │  session.close(), process.stop()   (always)                 │
//! │  Reporter::finish()          -> VerificationResult          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod capture;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod harness;
pub mod probe;
pub mod report;
pub mod scenario;
pub mod supervisor;

pub use config::HarnessConfig;
pub use error::{HarnessError, HarnessResult, RunFailure};
pub use harness::Harness;
pub use report::VerificationResult;
pub use scenario::Scenario;
