//! Command-line front end for famdb. Thin by design (spec.md §1 explicitly
//! keeps "the command-line parser and logging setup" out of the core's
//! scope) — this binary only parses arguments, wires them into `famdb`'s
//! library calls, and maps errors to exit codes.
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use famdb::error::{Error, Warning};
use famdb::family::Family;
use famdb::fileset::FileSet;
use famdb::format::{self, OutputFormat, RenderContext};
use famdb::query::{self, FamilySearch, LineageFormat};
use famdb::taxonomy::{FamilyFilters, TaxonId};

#[derive(Parser)]
#[command(name = "famdb", author, version, about = "Offline store and query tool for transposable-element family libraries")]
struct Cli {
    /// Directory holding the <export>.<partition>.h5 file set.
    #[arg(short = 'i', long = "dir")]
    dir: PathBuf,

    /// Log verbosity (error, warn, info, debug, trace).
    #[arg(short = 'l', long = "log-level", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize the file set's identity and installed partitions.
    Info {
        #[arg(long)]
        history: bool,
    },
    /// List every recorded name for a resolved term.
    Names {
        #[arg(short = 'f', long = "format", default_value = "pretty")]
        format: String,
        term: Vec<String>,
    },
    /// Print the ancestor chain and/or descendant subtree of a term.
    Lineage {
        #[arg(short = 'a')]
        ancestors: bool,
        #[arg(short = 'd')]
        descendants: bool,
        #[arg(short = 'k')]
        complete: bool,
        #[arg(short = 'c')]
        curated: bool,
        #[arg(short = 'u')]
        uncurated: bool,
        #[arg(short = 'f', long = "format", default_value = "pretty")]
        format: String,
        term: Vec<String>,
    },
    /// Render a single family by accession.
    Family {
        #[arg(short = 'f', long = "format", default_value = "summary")]
        format: String,
        accession: String,
    },
    /// Render every family matching a term and a set of filters.
    Families {
        #[arg(short = 'a')]
        ancestors: bool,
        #[arg(short = 'd')]
        descendants: bool,
        #[arg(long)]
        stage: Option<i32>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(short = 'c')]
        curated: bool,
        #[arg(short = 'u')]
        uncurated: bool,
        #[arg(short = 'f', long = "format", default_value = "summary")]
        format: String,
        #[arg(long = "add-reverse-complement")]
        add_reverse_complement: bool,
        #[arg(long = "include-class-in-name")]
        include_class_in_name: bool,
        #[arg(long = "require-general-threshold")]
        require_general_threshold: bool,
        term: Vec<String>,
    },
    /// Ingest a single family from an EMBL record into the root file.
    Append {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        infile: PathBuf,
        exclusion_list: Option<PathBuf>,
    },
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn print_warnings(warnings: &[Warning]) {
    for w in warnings {
        eprintln!("warning: {w}");
    }
}

fn curated_filter(curated: bool, uncurated: bool) -> Option<bool> {
    match (curated, uncurated) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

fn joined_term(term: &[String]) -> famdb::error::Result<String> {
    if term.is_empty() {
        return Err(Error::user("a search term is required"));
    }
    Ok(term.join(" "))
}

fn lineage_context(set: &FileSet, clade: TaxonId) -> famdb::error::Result<(Vec<String>, String, Vec<TaxonId>)> {
    let mut ancestors = set.taxonomy.ancestors(clade)?;
    ancestors.reverse();
    let mut lineage_names: Vec<String> = ancestors
        .iter()
        .map(|&a| set.taxonomy.display_name(a))
        .collect::<famdb::error::Result<_>>()?;
    lineage_names.push(set.taxonomy.display_name(clade)?);
    let organism_name = set.taxonomy.display_name(clade)?;
    let mut species_ancestor_chain = vec![clade];
    let mut rev = ancestors;
    rev.reverse();
    species_ancestor_chain.extend(rev);
    Ok((lineage_names, organism_name, species_ancestor_chain))
}

fn render_family(
    set: &FileSet,
    family: &Family,
    format_str: &str,
    display_clade_id: TaxonId,
    reverse_complement: bool,
    include_class_in_name: bool,
) -> famdb::error::Result<Vec<u8>> {
    let format: OutputFormat = format_str.parse()?;
    let clade = family.clades.first().copied().unwrap_or(display_clade_id);
    let (lineage_names, organism_name, species_ancestor_chain) = lineage_context(set, clade)?;
    let ctx = RenderContext {
        display_clade: set.taxonomy.display_name(display_clade_id)?,
        reverse_complement,
        include_class_in_name,
        lineage_names,
        organism_name,
        species_ancestor_chain,
    };
    format::render(format, family, &ctx)
}

fn run() -> famdb::error::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let set = FileSet::discover(&cli.dir)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Info { history } => {
            let outcome = query::info(&set);
            print_warnings(&outcome.warnings);
            let identity = outcome.value;
            writeln!(out, "export: {} ({})", identity.export_name, identity.export_date)?;
            writeln!(out, "schema version: {}.{}", identity.schema_version.0, identity.schema_version.1)?;
            writeln!(out, "partitions:")?;
            for entry in &identity.full_partition_table {
                let installed = set.partitions_present().contains(&entry.number);
                writeln!(
                    out,
                    "  {} - {} (root taxon {}) [{}]",
                    entry.number,
                    entry.name,
                    entry.root_taxon_id,
                    if installed { "installed" } else { "missing" }
                )?;
            }
            if history {
                writeln!(out, "(change history omitted: no writable handle open)")?;
            }
        }

        Command::Names { format, term } => {
            let term = joined_term(&term)?;
            let outcome = query::names(&set, &term)?;
            print_warnings(&outcome.warnings);
            if format == "json" {
                let entries: Vec<serde_json::Value> = outcome
                    .value
                    .iter()
                    .map(|(kind, text)| serde_json::json!({"kind": kind.to_string(), "text": text}))
                    .collect();
                let rendered = serde_json::to_string(&entries).map_err(|e| Error::data(e.to_string()))?;
                writeln!(out, "{rendered}")?;
            } else {
                for (kind, text) in &outcome.value {
                    writeln!(out, "{kind}: {text}")?;
                }
            }
        }

        Command::Lineage {
            ancestors,
            descendants,
            complete,
            curated,
            uncurated,
            format,
            term,
        } => {
            let term = joined_term(&term)?;
            let lineage_format = match format.as_str() {
                "pretty" => LineageFormat::Pretty,
                "semicolon" => LineageFormat::Semicolon,
                "totals" => LineageFormat::Totals,
                other => {
                    return Err(Error::user_with_hint(
                        format!("unknown lineage format '{other}'"),
                        "valid formats: pretty, semicolon, totals",
                    ))
                }
            };
            let filters = FamilyFilters {
                curated: curated_filter(curated, uncurated),
                ..Default::default()
            };
            let outcome = query::lineage(&set, &term, ancestors, descendants, complete, lineage_format, &filters)?;
            print_warnings(&outcome.warnings);
            writeln!(out, "{}", outcome.value)?;
        }

        Command::Family { format, accession } => {
            let outcome = query::family(&set, &accession)?;
            print_warnings(&outcome.warnings);
            let family = outcome.value;
            let clade = family.clades.first().copied().unwrap_or(set.taxonomy.root_id());
            let bytes = render_family(&set, &family, &format, clade, false, false)?;
            out.write_all(&bytes)?;
        }

        Command::Families {
            ancestors,
            descendants,
            stage,
            class,
            name,
            curated,
            uncurated,
            format,
            add_reverse_complement,
            include_class_in_name,
            require_general_threshold,
            term,
        } => {
            let term = joined_term(&term)?;
            let id = query::resolve_one(&set, &term)?;
            let filters = FamilyFilters {
                curated: curated_filter(curated, uncurated),
                stage,
                class_prefix: class.as_deref(),
                name_prefix: name.as_deref(),
                require_general_threshold,
            };
            let search = if ancestors || descendants {
                FamilySearch::Expanded {
                    id,
                    with_ancestors: ancestors,
                    with_descendants: descendants,
                }
            } else {
                FamilySearch::ExactTaxon(id)
            };
            let outcome = query::families(&set, search, &filters)?;
            print_warnings(&outcome.warnings);
            for family in &outcome.value {
                let bytes = render_family(&set, family, &format, id, add_reverse_complement, include_class_in_name)?;
                out.write_all(&bytes)?;
            }
        }

        Command::Append {
            name,
            description,
            infile,
            exclusion_list,
        } => {
            if exclusion_list.is_some() {
                return Err(Error::user("exclusion lists are not supported by this build"));
            }
            let container = famdb::container::Container::open_write(&cli.dir.join(format!(
                "{}.0.h5",
                set.identity.export_name
            )))?;
            let timestamp = famdb::schema::read_history(&container.root())
                .map(|h| h.len())
                .unwrap_or(0)
                .to_string();
            let accession = famdb::append::append(
                &container,
                &infile,
                name.as_deref(),
                description.as_deref(),
                timestamp,
            )?;
            writeln!(out, "appended {accession}")?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(hint) = err.hint() {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
