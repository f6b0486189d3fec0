use anyhow::{Context, Result};
use baseline::{evaluate_baseline, BaselineReport};
use campaigns::{campaign_overview, list_service_campaign_queue, CampaignQueue};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use coverage::{compute_coverage_matrix, coverage_gaps, list_coverage_missing, next_milestones, CoverageMatrix, CoverageOptions};
use import_delta::{compute_import_delta, DeltaOptions, ImportDelta};
use observation_store::{BaselineId, Db, ErrorKind, ImportId, IntentTag, NewImport, ProjectId, ScanImport, ScopeId};
use reconbook_core::{validate_confidence, IntentSource, ScanIntent, ValidationError, WorkStatus};
use serde::Serialize;
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

#[derive(Debug, Parser)]
#[command(name = "reconbook", version, about = "Coverage, drift and triage queues over recorded IPv4 scan history")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./reconbook.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database path (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Output format: text, json, or jsonl
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
    /// More logging on stderr (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Manage projects
    Project {
        #[command(subcommand)]
        cmd: ProjectCmd,
    },
    /// Record one import from a JSON document
    Ingest {
        project: ProjectId,
        file: PathBuf,
        /// Intent tag to attach (repeatable)
        #[arg(long = "intent")]
        intents: Vec<String>,
    },
    /// Replace the intent tags of an import. No --intent clears them.
    Tag {
        project: ProjectId,
        import: ImportId,
        #[arg(long = "intent")]
        intents: Vec<String>,
        /// manual or auto
        #[arg(long, default_value = "manual")]
        source: String,
        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
    },
    /// List a project's imports, newest first
    Imports { project: ProjectId },
    /// Manage scope rules
    Scope {
        #[command(subcommand)]
        cmd: ScopeCmd,
    },
    /// Manage and evaluate the expected-asset baseline
    Baseline {
        #[command(subcommand)]
        cmd: BaselineCmd,
    },
    /// Segment x intent coverage matrix
    Coverage {
        project: ProjectId,
        /// Missing-host preview per cell (default 5, max 50)
        #[arg(long)]
        preview: Option<usize>,
        #[arg(long, default_value_t = false)]
        no_preview: bool,
    },
    /// Page through the hosts of one segment never scanned with an intent
    Missing {
        project: ProjectId,
        segment: String,
        intent: String,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        page_size: Option<usize>,
        /// Write CSV to stdout instead of --format
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Incomplete coverage cells, largest first
    Gaps { project: ProjectId },
    /// Next intent to run per segment
    Milestones { project: ProjectId },
    /// Compare two imports of a project
    Delta {
        project: ProjectId,
        base: ImportId,
        target: ImportId,
        /// Include the detail lists, not only the counts
        #[arg(long, default_value_t = false)]
        lists: bool,
        /// Cap each detail list
        #[arg(long)]
        preview: Option<usize>,
    },
    /// Host-grouped work queue for one service campaign
    Campaign {
        project: ProjectId,
        name: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Write CSV (one row per matching port) to stdout
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Matching host and port counts for every campaign
    Campaigns { project: ProjectId },
    /// Update triage state on the current host/port records
    Triage {
        #[command(subcommand)]
        cmd: TriageCmd,
    },
}

#[derive(Debug, Subcommand)]
enum ProjectCmd {
    Create { name: String },
    List,
    /// Delete a project and everything recorded under it
    Delete { project: ProjectId },
}

#[derive(Debug, Subcommand)]
enum ScopeCmd {
    /// Add IPv4 address or CIDR rules
    Add {
        project: ProjectId,
        #[arg(required = true)]
        definitions: Vec<String>,
    },
    List { project: ProjectId },
    Rm { project: ProjectId, id: ScopeId },
}

#[derive(Debug, Subcommand)]
enum BaselineCmd {
    /// Add expected addresses or CIDRs (prefix /16 or longer)
    Add {
        project: ProjectId,
        definitions: Vec<String>,
        /// File with newline-delimited definitions (comments with # and blanks ignored)
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    List { project: ProjectId },
    Rm { project: ProjectId, id: BaselineId },
    /// Expected-but-unseen and seen-but-not-expected hosts
    Eval { project: ProjectId },
}

#[derive(Debug, Subcommand)]
enum TriageCmd {
    /// Set the work status of a port (scanned, flagged, in_progress, done)
    Port {
        project: ProjectId,
        ip: String,
        port: u16,
        status: String,
        #[arg(long, default_value = "tcp")]
        protocol: String,
    },
    /// Override the current in-scope flag of a host
    Host {
        project: ProjectId,
        ip: String,
        #[arg(long, action = ArgAction::Set)]
        in_scope: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// 2 for caller mistakes, 3 for unknown rows, 1 for everything else.
fn exit_code(e: &anyhow::Error) -> i32 {
    if e.downcast_ref::<ValidationError>().is_some() {
        return 2;
    }
    match e.downcast_ref::<observation_store::Error>().map(|e| e.kind()) {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::NotFound) => 3,
        _ => 1,
    }
}

fn fmt_ms(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

fn print_json<T: Serialize + ?Sized>(format: OutputFormat, value: &T) -> Result<()> {
    let s = match format {
        OutputFormat::Jsonl => serde_json::to_string(value)?,
        _ => serde_json::to_string_pretty(value)?,
    };
    println!("{s}");
    Ok(())
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T) -> Vec<String>) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for line in text(value) {
                println!("{line}");
            }
        }
        _ => print_json(format, value)?,
    }
    Ok(())
}

/// JSONL prints one compact object per item.
fn emit_list<T: Serialize>(format: OutputFormat, items: &[T], text: impl Fn(&T) -> String) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for item in items {
                println!("{}", text(item));
            }
        }
        OutputFormat::Json => print_json(format, items)?,
        OutputFormat::Jsonl => {
            for item in items {
                println!("{}", serde_json::to_string(item)?);
            }
        }
    }
    Ok(())
}

fn opt(s: &Option<String>) -> &str {
    s.as_deref().unwrap_or("")
}

fn import_line(i: &ScanImport) -> String {
    let intents = i.intents.iter().map(|t| t.intent.as_str()).collect::<Vec<_>>().join(",");
    format!("{}\t{}\t{}\thosts={}\tports={}\t{}", i.id, fmt_ms(i.imported_ms), i.filename, i.hosts_found, i.ports_found, intents)
}

fn coverage_text(m: &CoverageMatrix) -> Vec<String> {
    let header = ScanIntent::ALL.iter().map(|i| i.as_str()).collect::<Vec<_>>().join("\t");
    let mut lines = vec![format!("mode: {}", m.segment_mode), format!("segment\thosts\t{header}")];
    for s in &m.segments {
        let cells = s
            .cells
            .iter()
            .map(|c| format!("{}% ({}/{})", c.coverage_percent, c.covered_count, s.host_total))
            .collect::<Vec<_>>()
            .join("\t");
        lines.push(format!("{} [{}]\t{}\t{}", s.label, s.key, s.host_total, cells));
    }
    lines
}

fn delta_text(d: &ImportDelta) -> Vec<String> {
    let s = &d.summary;
    let mut lines = vec![
        format!("import {} -> {}", d.base_import_id, d.target_import_id),
        format!("net new hosts: {}", s.net_new_hosts),
        format!("disappeared hosts: {}", s.disappeared_hosts),
        format!("net new open exposures: {}", s.net_new_open_exposures),
        format!("disappeared open exposures: {}", s.disappeared_open_exposures),
        format!("changed fingerprints: {}", s.changed_fingerprints),
    ];
    if let Some(l) = &d.lists {
        lines.extend(l.net_new_hosts.iter().map(|h| format!("+ host {h}")));
        lines.extend(l.disappeared_hosts.iter().map(|h| format!("- host {h}")));
        lines.extend(l.net_new_open_exposures.iter().map(|e| format!("+ open {e}")));
        lines.extend(l.disappeared_open_exposures.iter().map(|e| format!("- open {e}")));
        lines.extend(l.changed_fingerprints.iter().map(|c| {
            format!(
                "~ {} {} {} -> {} {}",
                c.exposure,
                opt(&c.before.product),
                opt(&c.before.version),
                opt(&c.after.product),
                opt(&c.after.version)
            )
        }));
    }
    lines
}

fn baseline_text(r: &BaselineReport) -> Vec<String> {
    let s = &r.summary;
    let mut lines = vec![
        format!("expected: {} ({} definitions)", s.expected_total, s.definitions),
        format!("observed: {}", s.observed_total),
        format!("expected and seen: {}", s.expected_and_seen),
        format!("expected but unseen: {}", s.expected_but_unseen),
        format!(
            "seen but not expected: {} (marked in scope {}, out of scope {})",
            s.seen_but_out_of_scope, s.out_of_baseline_marked_in_scope, s.out_of_baseline_marked_out_of_scope
        ),
    ];
    lines.extend(r.lists.expected_but_unseen.iter().map(|ip| format!("unseen {ip}")));
    lines.extend(r.lists.seen_but_out_of_scope.iter().map(|h| {
        format!("unexpected {}\t{}\t{}", h.ip, opt(&h.hostname), if h.in_scope { "in-scope" } else { "out-of-scope" })
    }));
    lines
}

fn campaign_text(q: &CampaignQueue) -> Vec<String> {
    let mut lines = vec![format!("{}: {} hosts (showing {} from offset {})", q.campaign, q.total, q.items.len(), q.offset)];
    for h in &q.items {
        let ports = h.ports.iter().map(|p| format!("{}/{}", p.port, p.protocol)).collect::<Vec<_>>().join(",");
        let s = &h.status_summary;
        lines.push(format!(
            "{}\t{}\t{}\tscanned={} flagged={} in_progress={} done={}\t{}",
            h.ip, opt(&h.hostname), ports, s.scanned, s.flagged, s.in_progress, s.done, fmt_ms(h.latest_seen_ms)
        ));
    }
    lines
}

fn campaign_csv(q: &CampaignQueue) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    wtr.write_record(["ip", "hostname", "port", "protocol", "state", "service", "product", "version", "work_status", "last_seen"])?;
    for h in &q.items {
        for p in &h.ports {
            let port = p.port.to_string();
            let last_seen = fmt_ms(p.last_seen_ms);
            wtr.write_record([
                h.ip.as_str(),
                opt(&h.hostname),
                port.as_str(),
                p.protocol.as_str(),
                p.state.as_str(),
                opt(&p.fingerprint.service),
                opt(&p.fingerprint.product),
                opt(&p.fingerprint.version),
                p.work_status.as_str(),
                last_seen.as_str(),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn read_definitions(mut definitions: Vec<String>, file: Option<PathBuf>) -> Result<Vec<String>> {
    if let Some(p) = file {
        let s = std::fs::read_to_string(&p).with_context(|| format!("reading {}", p.display()))?;
        definitions.extend(
            s.lines().map(|l| l.trim()).filter(|l| !l.is_empty() && !l.starts_with('#')).map(str::to_string),
        );
    }
    Ok(definitions)
}

fn run(cli: Cli) -> Result<()> {
    let format = cli.format;
    if matches!(cli.command, Commands::Version) {
        println!("reconbook {} (core {})", env!("CARGO_PKG_VERSION"), reconbook_core::version());
        return Ok(());
    }
    let cfg = config::load_config(cli.config.as_deref())?;
    let db_path = cfg.database(cli.db);
    let db = Db::open_or_create(&db_path).with_context(|| format!("opening {}", db_path.display()))?;
    debug!(path = %db_path.display(), "database ready");

    match cli.command {
        Commands::Version => {}
        Commands::Project { cmd } => match cmd {
            ProjectCmd::Create { name } => {
                let p = db.create_project(&name)?;
                emit(format, &p, |p| vec![format!("{}\t{}", p.id, p.name)])?;
            }
            ProjectCmd::List => {
                emit_list(format, &db.list_projects()?, |p| format!("{}\t{}\t{}", p.id, p.name, fmt_ms(p.created_ms)))?;
            }
            ProjectCmd::Delete { project } => {
                db.delete_project(project)?;
                info!(project_id = project, "project deleted");
                emit(format, &serde_json::json!({ "deleted": project }), |_| vec![format!("deleted project {project}")])?;
            }
        },
        Commands::Ingest { project, file, intents } => {
            let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let mut import: NewImport =
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
            if import.filename.is_empty() {
                import.filename = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            }
            for i in &intents {
                import = import.intent(i.parse()?);
            }
            let import_id = db.record_import(project, &import)?;
            let recorded = db.require_import(project, import_id)?;
            emit(format, &recorded, |i| vec![import_line(i)])?;
        }
        Commands::Tag { project, import, intents, source, confidence } => {
            let source: IntentSource = source.parse()?;
            let confidence = validate_confidence(confidence)?;
            let tags = intents
                .iter()
                .map(|i| Ok(IntentTag { intent: i.parse()?, source, confidence }))
                .collect::<std::result::Result<Vec<_>, ValidationError>>()?;
            db.set_import_intents(project, import, &tags)?;
            emit(format, &db.require_import(project, import)?, |i| vec![import_line(i)])?;
        }
        Commands::Imports { project } => {
            db.require_project(project)?;
            emit_list(format, &db.list_imports(project)?, import_line)?;
        }
        Commands::Scope { cmd } => match cmd {
            ScopeCmd::Add { project, definitions } => {
                let added = db.add_scope_definitions(project, definitions.as_slice())?;
                emit_list(format, &added, |d| format!("{}\t{}", d.id, d.definition))?;
            }
            ScopeCmd::List { project } => {
                db.require_project(project)?;
                emit_list(format, &db.scope_definitions(project)?, |d| format!("{}\t{}", d.id, d.definition))?;
            }
            ScopeCmd::Rm { project, id } => {
                db.delete_scope_definition(project, id)?;
                emit(format, &serde_json::json!({ "deleted": id }), |_| vec![format!("deleted scope rule {id}")])?;
            }
        },
        Commands::Baseline { cmd } => match cmd {
            BaselineCmd::Add { project, definitions, file } => {
                let defs = read_definitions(definitions, file)?;
                if defs.is_empty() {
                    return Err(ValidationError::NoDefinitions.into());
                }
                let outcome = db.add_baseline_definitions(project, defs.as_slice())?;
                emit(format, &outcome, |o| vec![format!("added {} (already present {})", o.added, o.already_present)])?;
            }
            BaselineCmd::List { project } => {
                db.require_project(project)?;
                emit_list(format, &db.baseline_definitions(project)?, |d| format!("{}\t{}", d.id, d.definition))?;
            }
            BaselineCmd::Rm { project, id } => {
                db.delete_baseline_definition(project, id)?;
                emit(format, &serde_json::json!({ "deleted": id }), |_| vec![format!("deleted baseline entry {id}")])?;
            }
            BaselineCmd::Eval { project } => {
                emit(format, &evaluate_baseline(&db, project)?, baseline_text)?;
            }
        },
        Commands::Coverage { project, preview, no_preview } => {
            let opts = CoverageOptions { preview_size: preview.or(cfg.coverage_preview()), include_preview: !no_preview };
            emit(format, &compute_coverage_matrix(&db, project, opts)?, coverage_text)?;
        }
        Commands::Missing { project, segment, intent, page, page_size, csv } => {
            let page = list_coverage_missing(&db, project, &segment, &intent, page, page_size.or(cfg.coverage_page_size()))?;
            if csv {
                let mut wtr = csv::Writer::from_writer(std::io::stdout());
                wtr.write_record(["ip"])?;
                for ip in &page.items {
                    wtr.write_record([ip])?;
                }
                wtr.flush()?;
            } else {
                emit(format, &page, |p| {
                    let mut lines = vec![format!("{} {}: {} missing (page {}, size {})", p.segment_key, p.intent, p.total, p.page, p.page_size)];
                    lines.extend(p.items.iter().cloned());
                    lines
                })?;
            }
        }
        Commands::Gaps { project } => {
            let opts = CoverageOptions { preview_size: None, include_preview: false };
            let gaps = coverage_gaps(&compute_coverage_matrix(&db, project, opts)?);
            emit_list(format, &gaps, |g| {
                format!("{} [{}]\t{}\tmissing {}/{}\t{}%", g.segment_label, g.segment_key, g.intent, g.missing_count, g.host_total, g.coverage_percent)
            })?;
        }
        Commands::Milestones { project } => {
            let opts = CoverageOptions { preview_size: None, include_preview: false };
            let milestones = next_milestones(&compute_coverage_matrix(&db, project, opts)?);
            emit_list(format, &milestones, |m| match m.next_intent {
                Some(i) => format!("{} [{}]\tnext {}\tmissing {}/{}", m.segment_label, m.segment_key, i, m.missing_count, m.host_total),
                None => format!("{} [{}]\tcomplete", m.segment_label, m.segment_key),
            })?;
        }
        Commands::Delta { project, base, target, lists, preview } => {
            if base == target {
                return Err(ValidationError::SameImport(base).into());
            }
            let opts = DeltaOptions { include_lists: lists, preview_size: preview.or(cfg.delta_preview()) };
            emit(format, &compute_import_delta(&db, project, base, target, opts)?, delta_text)?;
        }
        Commands::Campaign { project, name, limit, offset, csv } => {
            let q = list_service_campaign_queue(&db, project, &name, limit.or(cfg.campaign_limit()), offset)?;
            if csv {
                campaign_csv(&q)?;
            } else {
                emit(format, &q, campaign_text)?;
            }
        }
        Commands::Campaigns { project } => {
            emit_list(format, &campaign_overview(&db, project)?, |c| format!("{}\thosts={}\tports={}", c.campaign, c.hosts, c.ports))?;
        }
        Commands::Triage { cmd } => match cmd {
            TriageCmd::Port { project, ip, port, status, protocol } => {
                let status: WorkStatus = status.parse()?;
                db.set_port_work_status(project, &ip, port, &protocol, status)?;
                let obj = serde_json::json!({ "ip": ip, "port": port, "protocol": protocol, "work_status": status });
                emit(format, &obj, |_| vec![format!("{ip}:{port}/{protocol} {}", status.as_str())])?;
            }
            TriageCmd::Host { project, ip, in_scope } => {
                db.set_host_in_scope(project, &ip, in_scope)?;
                let obj = serde_json::json!({ "ip": ip, "in_scope": in_scope });
                emit(format, &obj, |_| vec![format!("{ip} in_scope={in_scope}")])?;
            }
        },
    }
    Ok(())
}
