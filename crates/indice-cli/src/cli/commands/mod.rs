use super::args::{
    BuildArgs, Cli, Command, ConfigArgs, IngestArgs, InitArgs, PublishArgs, RunsArgs, SyncArgs,
    WindowArgs,
};
use anyhow::Context as _;
use indice_core::config::{load_config, write_sample_config, AppConfig};
use indice_core::diagnostics::Diagnostics;
use indice_core::errors::{ConfigError, InvalidInput};
use indice_core::mapping::CategoryMapping;
use indice_core::month::YearMonth;
use indice_core::official::{HttpFetcher, OfficialAcquirer};
use indice_core::publish::{PublishRequest, Publisher};
use indice_core::report::console;
use indice_core::snapshot::SnapshotStore;
use indice_core::storage::Store;
use indice_core::tracker::{read_observations_csv, TrackerBuilder};
use std::path::Path;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Sync(args) => cmd_sync(args),
        Command::Build(args) => cmd_build(args),
        Command::Publish(args) => cmd_publish(args),
        Command::Runs(args) => cmd_runs(args),
        Command::Ingest(args) => cmd_ingest(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

/// Everything a command needs once the config is loaded.
struct Workspace {
    cfg: AppConfig,
    store: Store,
    mapping: CategoryMapping,
    snapshots: SnapshotStore,
}

impl Workspace {
    fn load(args: &ConfigArgs) -> anyhow::Result<Self> {
        let cfg = load_config(&args.config)?;
        let db = args.db.clone().unwrap_or_else(|| cfg.storage.database_path.clone());
        ensure_parent_dir(&db)?;
        let store = Store::open(&db)?;
        store.init_schema()?;

        let mut diagnostics = Diagnostics::new();
        let mapping = CategoryMapping::from_config(&cfg.category_mapping, &mut diagnostics);
        let snapshots = SnapshotStore::new(cfg.storage.snapshot_dir.clone());
        tracing::info!(
            event = "cli.workspace.loaded",
            config = %args.config.display(),
            db = %db.display(),
            snapshots = %snapshots.dir().display(),
            deprecations = diagnostics.messages().len()
        );
        Ok(Self {
            cfg,
            store,
            mapping,
            snapshots,
        })
    }
}

fn parse_window(window: &WindowArgs) -> anyhow::Result<(Option<YearMonth>, Option<YearMonth>)> {
    let parse = |raw: &Option<String>, flag: &str| -> anyhow::Result<Option<YearMonth>> {
        raw.as_deref()
            .map(|s| {
                YearMonth::parse_loose(s)
                    .ok_or_else(|| InvalidInput(format!("--{flag}: expected YYYY-MM, got {s:?}")))
            })
            .transpose()
            .map_err(Into::into)
    };
    let from = parse(&window.from, "from")?;
    let to = parse(&window.to, "to")?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(InvalidInput(format!("--from {f} is after --to {t}")).into());
        }
    }
    Ok((from, to))
}

fn is_input_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<InvalidInput>().is_some() || e.downcast_ref::<ConfigError>().is_some()
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() {
        eprintln!("note: {} already exists", args.config.display());
        return Ok(exit_codes::OK);
    }
    ensure_parent_dir(&args.config)?;
    write_sample_config(&args.config)?;
    eprintln!("created {}", args.config.display());
    Ok(exit_codes::OK)
}

fn cmd_sync(args: SyncArgs) -> anyhow::Result<i32> {
    let ctx = Workspace::load(&args.cfg)?;
    let (from, to) = parse_window(&args.window)?;
    let fetcher = HttpFetcher::new()?;
    let acquirer = OfficialAcquirer::new(
        &ctx.cfg.official,
        &ctx.mapping,
        &ctx.store,
        &ctx.snapshots,
        &fetcher,
    );
    let res = acquirer.sync(from, to, Some(args.region.as_str()))?;
    console::print_sync_summary(&res);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&res)?);
    }
    Ok(exit_codes::OK)
}

fn cmd_build(args: BuildArgs) -> anyhow::Result<i32> {
    let ctx = Workspace::load(&args.cfg)?;
    let (from, to) = parse_window(&args.window)?;
    let builder = TrackerBuilder::new(
        &ctx.cfg,
        &ctx.store,
        &ctx.store,
        &ctx.mapping,
        chrono::Utc::now(),
    );
    let res = builder.build_named(&args.basket, from, to)?;
    console::print_build_summary(&res);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&res)?);
    }
    Ok(if res.general_rows == 0 {
        exit_codes::RUN_FAILED
    } else {
        exit_codes::OK
    })
}

fn cmd_publish(args: PublishArgs) -> anyhow::Result<i32> {
    let ctx = Workspace::load(&args.cfg)?;
    let (from, to) = parse_window(&args.window)?;
    let fetcher = HttpFetcher::new()?;
    let publisher = Publisher::new(
        &ctx.cfg,
        &ctx.store,
        &ctx.store,
        &ctx.mapping,
        &ctx.snapshots,
        &fetcher,
    );
    let req = PublishRequest {
        basket_type: args.basket.clone(),
        from,
        to,
        region: args.region.clone(),
        skip_sync: args.skip_sync,
        skip_build: args.skip_build,
    };

    let run = match publisher.publish(&req) {
        Ok(run) => run,
        Err(e) if is_input_error(&e) => return Err(e),
        Err(e) => {
            eprintln!("FAIL: publication failed: {e:#}");
            return Ok(exit_codes::RUN_FAILED);
        }
    };
    console::print_publication_summary(&run);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    }
    Ok(if run.status.is_failure() {
        exit_codes::RUN_FAILED
    } else {
        exit_codes::OK
    })
}

fn cmd_runs(args: RunsArgs) -> anyhow::Result<i32> {
    let ctx = Workspace::load(&args.cfg)?;
    if let Some(uuid) = &args.run {
        let Some(run) = ctx.store.get_run(uuid)? else {
            eprintln!("no publication run {}", uuid);
            return Ok(exit_codes::RUN_FAILED);
        };
        console::print_publication_summary(&run);
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(exit_codes::OK);
    }
    console::print_runs(&ctx.store.list_runs(args.limit)?);
    Ok(exit_codes::OK)
}

fn cmd_ingest(args: IngestArgs) -> anyhow::Result<i32> {
    let ctx = Workspace::load(&args.cfg)?;
    let file = std::fs::File::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let rows = read_observations_csv(file)?;
    let inserted = ctx.store.insert_observations(&rows)?;
    eprintln!("ingested {} observations from {}", inserted, args.file.display());
    Ok(exit_codes::OK)
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
