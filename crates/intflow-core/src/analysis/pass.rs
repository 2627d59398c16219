//! The module-level pass and its configuration surface.
//!
//! Ordering is fixed: taint analysis runs to its own fixed point before any
//! range is computed, ranges reach their fixed point before errors are
//! marked, and the IR is only restructured once (shim synthesis) before
//! anything reads it.

use super::errors;
use super::range::RangeAnalysis;
use super::taint::{self, TaintSummary};
use crate::annotations::Site;
use crate::crange::Crange;
use crate::module::Module;
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Sink function name and the index of its dangerous argument.
    pub sinks: Vec<(String, usize)>,
    /// Name prefixes identifying taint-source entry points.
    pub source_prefixes: Vec<String>,
    /// Safety belt for the range fixed point; the lattice is finite and the
    /// transfer functions monotone, so this should never trip on sane input.
    pub iteration_cap: usize,
    /// Enables the follow-on overflow / divide-by-zero / bad-shift check.
    pub check_binary_ops: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sinks: [
                ("malloc", 0),
                ("__mkint_sink0", 0),
                ("__mkint_sink1", 1),
                ("xmalloc", 0),
                ("kmalloc", 0),
                ("kzalloc", 0),
                ("vmalloc", 0),
            ]
            .into_iter()
            .map(|(name, index)| (name.to_string(), index))
            .collect(),
            source_prefixes: vec!["sys_".to_string(), "__mkint_ann_".to_string()],
            iteration_cap: 128,
            check_binary_ops: false,
        }
    }
}

impl AnalyzerConfig {
    pub fn is_source(&self, name: &str) -> bool {
        self.source_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    pub fn sink_arg(&self, name: &str) -> Option<usize> {
        self.sinks
            .iter()
            .find(|(sink, _)| sink == name)
            .map(|(_, index)| *index)
    }
}

pub struct IntMisusePass {
    config: AnalyzerConfig,
}

impl IntMisusePass {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(AnalyzerConfig::default())
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Runs the whole pipeline and leaves the module enriched with `taint`,
    /// `sink`, and `error` annotations. Also returns the analysis state for
    /// callers that want the raw ranges.
    pub fn run(&self, module: &mut Module) -> Result<(AnalysisReport, RangeAnalysis)> {
        debug!(module = %module.name, "running integer misuse pass");

        let taint = taint::run(&self.config, module);
        let mut ranges = RangeAnalysis::new(self.config.iteration_cap);
        ranges.init(module, &taint.taint_funcs, &self.config);
        ranges.run(module)?;

        errors::mark_errors(module, &ranges);
        if self.config.check_binary_ops {
            errors::binary_check(module, &ranges);
        }

        let report = AnalysisReport::collect(module, &taint, &ranges);
        Ok((report, ranges))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub site: Site,
    pub message: String,
}

/// What the pass learned, in printable form; mirrors the annotations the
/// module now carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub findings: Vec<Finding>,
    pub return_ranges: IndexMap<String, Crange>,
    pub global_ranges: IndexMap<String, Crange>,
    pub tainted_functions: Vec<String>,
    pub iterations: usize,
    pub converged: bool,
}

impl AnalysisReport {
    fn collect(module: &Module, taint: &TaintSummary, ranges: &RangeAnalysis) -> Self {
        let findings = module
            .annotations
            .error_sites()
            .map(|(site, message)| Finding {
                site: site.clone(),
                message: message.to_string(),
            })
            .collect();

        let global_ranges = ranges
            .global_range
            .iter()
            .map(|(gid, range)| {
                let name = module
                    .get_global(*gid)
                    .map(|g| g.name.clone())
                    .unwrap_or_else(|| gid.to_string());
                (name, range.clone())
            })
            .collect();

        Self {
            findings,
            return_ranges: ranges.func_return_range.clone(),
            global_ranges,
            tainted_functions: taint.taint_funcs.iter().cloned().collect(),
            iterations: ranges.iterations,
            converged: ranges.converged,
        }
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; findings: {}", self.findings.len())?;
        for finding in &self.findings {
            writeln!(f, ";   {} -> {}", finding.site, finding.message)?;
        }
        writeln!(f, "; tainted functions: {}", self.tainted_functions.len())?;
        for name in &self.tainted_functions {
            writeln!(f, ";   {}", name)?;
        }
        writeln!(f, "; function return ranges:")?;
        for (name, range) in &self.return_ranges {
            writeln!(f, ";   {} -> {}", name, range)?;
        }
        writeln!(f, "; global ranges:")?;
        for (name, range) in &self.global_ranges {
            writeln!(f, ";   {} -> {}", name, range)?;
        }
        write!(
            f,
            "; fixed point after {} iterations ({})",
            self.iterations,
            if self.converged { "converged" } else { "capped" }
        )
    }
}
