/*! The module-level pass: taint sources to sinks, flow-sensitive value
 * ranges, and the error markers that consume both.
 *
 * Everything here runs single-threaded over a frozen module. The only IR
 * mutation is the one-time synthesis of taint-source shim calls before any
 * analysis reads the program; results land on the annotation channels.
 */

pub mod backedge;
pub mod cfg;
pub mod def_use;
pub mod errors;
pub mod pass;
pub mod range;
pub mod taint;

pub use backedge::BackedgeAnalysis;
pub use cfg::ControlFlowGraph;
pub use def_use::UserGraph;
pub use pass::{AnalysisReport, AnalyzerConfig, Finding, IntMisusePass};
pub use range::RangeAnalysis;
pub use taint::TaintSummary;
