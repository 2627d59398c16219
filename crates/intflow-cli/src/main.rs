use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use intflow_core::analysis::{AnalyzerConfig, IntMisusePass};
use intflow_core::format::format_module;
use intflow_core::ir_persist::{load_module, save_module};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "intflow")]
#[command(about = "intflow - taint-guided integer range analysis for lowered IR modules")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis and print a findings report
    Analyze {
        /// Serialized module (JSON) produced by an upstream frontend
        input: PathBuf,

        /// Where to write the annotated module
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also run the overflow / divide-by-zero / bad-shift checks
        #[arg(long)]
        check_binary_ops: bool,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Print a module as a readable listing
    Dump { input: PathBuf },

    /// Check that a serialized module is structurally sound
    Validate { input: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze {
            input,
            output,
            check_binary_ops,
            verbose,
        } => cmd_analyze(input, output, check_binary_ops, verbose),
        Commands::Dump { input } => cmd_dump(input),
        Commands::Validate { input } => cmd_validate(input),
    }
}

fn cmd_analyze(
    input: PathBuf,
    output: Option<PathBuf>,
    check_binary_ops: bool,
    verbose: bool,
) -> Result<()> {
    let mut module =
        load_module(&input).with_context(|| format!("loading {}", input.display()))?;
    module.validate()?;

    let config = AnalyzerConfig {
        check_binary_ops,
        ..AnalyzerConfig::default()
    };
    let pass = IntMisusePass::new(config);
    let (report, _) = pass.run(&mut module)?;

    if report.findings.is_empty() {
        println!("{}", "no findings".green().bold());
    } else {
        println!(
            "{} {}",
            "findings:".red().bold(),
            report.findings.len()
        );
        for finding in &report.findings {
            println!("  {} {}", finding.site.to_string().red(), finding.message);
        }
    }

    if !report.tainted_functions.is_empty() {
        println!("{}", "tainted functions:".yellow().bold());
        for name in &report.tainted_functions {
            println!("  {}", name.yellow());
        }
    }

    if verbose {
        println!("{}", "function return ranges:".bold());
        for (name, range) in &report.return_ranges {
            println!("  {} -> {}", name.green(), range);
        }
        println!("{}", "global ranges:".bold());
        for (name, range) in &report.global_ranges {
            println!("  {} -> {}", name.blue(), range);
        }
        println!(
            "fixed point after {} iterations ({})",
            report.iterations,
            if report.converged { "converged" } else { "capped" }
        );
    }

    if let Some(output_path) = output {
        save_module(&module, &output_path)
            .with_context(|| format!("writing {}", output_path.display()))?;
        println!("annotated module written to {}", output_path.display());
    }

    Ok(())
}

fn cmd_dump(input: PathBuf) -> Result<()> {
    let module = load_module(&input).with_context(|| format!("loading {}", input.display()))?;
    print!("{}", format_module(&module));
    Ok(())
}

fn cmd_validate(input: PathBuf) -> Result<()> {
    let module = load_module(&input).with_context(|| format!("loading {}", input.display()))?;
    match module.validate() {
        Ok(()) => {
            println!("{}", "VALID".green().bold());
            Ok(())
        }
        Err(e) => {
            println!("{}", "INVALID".red().bold());
            println!("{}", e);
            Err(anyhow::anyhow!("validation failed"))
        }
    }
}
