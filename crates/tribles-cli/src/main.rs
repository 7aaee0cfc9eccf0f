//! Tribles CLI
//!
//! Command-line front end over `tribles-query`:
//! - running slot-level query documents against a JSON fact file
//! - matching `E A V` patterns over named variables
//! - inspecting how a pattern is classified and how large each index is

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tribles_query::{
    classify, query, query_traced, short_string, Binding, IndexOrdering, TribleSet, Value, ValueKind,
    VariableContext,
};

mod document;

#[derive(Parser)]
#[command(name = "tribles")]
#[command(author, version, about = "Multi-way joins over entity/attribute/value facts")]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a slot-level query document against a fact file.
    Query {
        /// Facts JSON: `[{"e": .., "a": .., "v": ..}]`
        #[arg(short, long)]
        facts: PathBuf,
        /// Query JSON: `{"options": .., "constraints": [..]}`
        #[arg(short, long)]
        query: PathBuf,
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
        /// Stop after this many rows
        #[arg(long)]
        limit: Option<usize>,
        /// Print the search trace after the rows
        #[arg(long)]
        trace: bool,
    },

    /// Match `E A V` patterns; `?x` names a variable, `_` is a wildcard.
    Match {
        #[arg(short, long)]
        facts: PathBuf,
        /// Repeatable, e.g. `-p "?person a1 ?name"`
        #[arg(short, long = "pattern", required = true)]
        patterns: Vec<String>,
        /// How non-id pattern values are read
        #[arg(long, value_enum, default_value = "opaque")]
        kind: KindArg,
        /// Enumerate this variable in descending order (repeatable)
        #[arg(long)]
        descend: Vec<String>,
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show which index ordering answers a pattern of slot numbers.
    Classify { e: usize, a: usize, v: usize },

    /// Report the size of every index of a fact file.
    Stats {
        #[arg(short, long)]
        facts: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Id,
    ShortString,
    Hash,
    Opaque,
}

impl From<KindArg> for ValueKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Id => ValueKind::Id,
            KindArg::ShortString => ValueKind::ShortString,
            KindArg::Hash => ValueKind::Hash,
            KindArg::Opaque => ValueKind::Opaque,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Query {
            facts,
            query,
            format,
            limit,
            trace,
        } => cmd_query(&facts, &query, format, limit, trace),
        Commands::Match {
            facts,
            patterns,
            kind,
            descend,
            format,
        } => cmd_match(&facts, &patterns, kind.into(), &descend, format),
        Commands::Classify { e, a, v } => {
            cmd_classify([e, a, v]);
            Ok(())
        }
        Commands::Stats { facts } => cmd_stats(&facts),
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn render_value(value: &Value) -> String {
    if let Some(id) = value.as_id() {
        return id.to_string();
    }
    match short_string(value) {
        Some(text) if !text.is_empty() => format!("{text:?}"),
        _ => value.to_string(),
    }
}

fn print_rows(headers: &[String], rows: &[Vec<Value>], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let out: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    let fields: serde_json::Map<String, serde_json::Value> = headers
                        .iter()
                        .zip(row)
                        .map(|(h, v)| (h.clone(), json!(v.to_string())))
                        .collect();
                    serde_json::Value::Object(fields)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("{}", headers.join("\t").bold());
            for row in rows {
                let cells: Vec<String> = row.iter().map(render_value).collect();
                println!("{}", cells.join("\t"));
            }
            println!("{}", format!("{} row(s)", rows.len()).dimmed());
        }
    }
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_query(
    facts: &PathBuf,
    query_path: &PathBuf,
    format: OutputFormat,
    limit: Option<usize>,
    trace: bool,
) -> Result<()> {
    let set = document::load_facts(facts)?;
    tracing::info!(facts = set.len(), path = %facts.display(), "loaded facts");
    let doc = document::load_query(query_path)?;
    let constraints = doc.constraints(&set)?;
    let limit = limit.unwrap_or(usize::MAX);

    let headers: Vec<String> = (0..doc.options.variable_count).map(|s| format!("?{s}")).collect();
    let rows: Vec<Vec<Value>>;
    if trace {
        let mut q = query_traced(&constraints, &doc.options)?;
        rows = q.by_ref().take(limit).map(Binding::into_values).collect();
        print_rows(&headers, &rows, format)?;
        eprintln!("{}", serde_json::to_string(q.trace())?);
    } else {
        rows = query(&constraints, &doc.options)?
            .take(limit)
            .map(Binding::into_values)
            .collect();
        print_rows(&headers, &rows, format)?;
    }
    Ok(())
}

fn cmd_match(
    facts: &PathBuf,
    patterns: &[String],
    kind: ValueKind,
    descend: &[String],
    format: OutputFormat,
) -> Result<()> {
    let set = document::load_facts(facts)?;
    let mut ctx = VariableContext::new();
    let names = document::variable_names(patterns);
    let variables = document::named(&mut ctx, &names);
    let id_variables = document::id_variables(patterns);
    for pattern in patterns {
        document::add_pattern(&mut ctx, &set, pattern, kind, &id_variables)?;
    }
    for name in descend {
        let var = ctx.named(name);
        ctx.descend(var);
    }

    let plan = ctx.arrange()?;
    tracing::debug!(?plan, "arranged patterns");
    let rows: Vec<Vec<Value>> = plan
        .query()?
        .map(|row| variables.iter().map(|(_, var)| row.get(*var)).collect())
        .collect();
    let headers: Vec<String> = names.iter().map(|n| format!("?{n}")).collect();
    print_rows(&headers, &rows, format)
}

fn cmd_classify(pattern: [usize; 3]) {
    let ordering = classify(pattern);
    println!(
        "{} {:?} -> {} (infixes {:?})",
        "pattern".bold(),
        pattern,
        ordering.name().green(),
        ordering.infix_schedule()
    );
}

fn cmd_stats(facts: &PathBuf) -> Result<()> {
    let set: TribleSet = document::load_facts(facts)?;
    println!("{} {}", "facts".bold(), set.len());
    for ordering in IndexOrdering::ALL {
        println!("{:>4} {:>8}", ordering.name(), set.index(ordering).len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribles_query::{short_string_value, Id};

    #[test]
    fn values_render_by_shape() {
        assert_eq!(
            render_value(&Value::from_id(Id::from_u128(1))),
            Id::from_u128(1).to_string()
        );
        assert_eq!(render_value(&short_string_value("ada").unwrap()), "\"ada\"");
    }

    #[test]
    fn cli_parses_repeated_patterns() {
        let cli = Cli::try_parse_from([
            "tribles", "-v", "match", "-f", "facts.json", "-p", "?e a1 ?v", "-p", "?e a2 ?w", "--descend",
            "e",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Match { patterns, descend, .. } => {
                assert_eq!(patterns.len(), 2);
                assert_eq!(descend, vec!["e".to_string()]);
            }
            _ => panic!("expected match"),
        }
    }
}
