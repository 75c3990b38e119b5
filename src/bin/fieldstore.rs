use fieldstore::FieldStore;
use fieldstore::catalog::CatalogEdit;
use fieldstore::config::FieldStoreConfig;
use fieldstore::export::export_table;
use fieldstore::migration::MigrationAction;
use fieldstore::permission::{Principal, Role};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FIELDSTORE_LOG")
                .unwrap_or_else(|_| EnvFilter::new("fieldstore=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    match args[1].as_str() {
        "fields" => match args.get(2).map(String::as_str) {
            Some("list") => cmd_fields_list(&args[3..]),
            Some("add") => cmd_fields_edit(&args[3..], parse_append),
            Some("insert") => cmd_fields_edit(&args[3..], parse_insert),
            Some("rename") => cmd_fields_edit(&args[3..], parse_rename),
            Some("remove") => cmd_fields_edit(&args[3..], |a| {
                Ok(CatalogEdit::Remove {
                    index: parse_index(a)?,
                })
            }),
            Some("up") => cmd_fields_edit(&args[3..], |a| {
                Ok(CatalogEdit::MoveUp {
                    index: parse_index(a)?,
                })
            }),
            Some("down") => cmd_fields_edit(&args[3..], |a| {
                Ok(CatalogEdit::MoveDown {
                    index: parse_index(a)?,
                })
            }),
            Some(other) => Err(format!("unknown fields command: {other}")),
            None => Err("missing fields subcommand".into()),
        },
        "schema" => match args.get(2).map(String::as_str) {
            Some("ensure") => cmd_schema_ensure(&args[3..]),
            Some("status") => cmd_schema_status(&args[3..]),
            Some(other) => Err(format!("unknown schema command: {other}")),
            None => Err("missing schema subcommand".into()),
        },
        "export" => cmd_export(&args[2..]),
        other => {
            print_usage();
            Err(format!("unknown top-level command: {other}"))
        }
    }
}

fn open_store(args: &[String]) -> Result<FieldStore, String> {
    let data_dir = parse_flag_value(args, "--data-dir").ok_or("--data-dir is required")?;
    let mut config = FieldStoreConfig::default();
    if let Some(table) = parse_flag_value(args, "--table") {
        config = config.with_table_name(table);
    }
    FieldStore::open(config, &PathBuf::from(data_dir)).map_err(|e| format!("open store: {e}"))
}

fn cmd_fields_list(args: &[String]) -> Result<(), String> {
    let store = open_store(args)?;
    let catalog = store.load_catalog().map_err(|e| format!("load catalog: {e}"))?;
    for (idx, field) in catalog.fields().iter().enumerate() {
        println!("{idx}\t{}\t{}\t{:?}", field.key, field.label, field.kind());
    }
    Ok(())
}

fn cmd_fields_edit<F>(args: &[String], parse: F) -> Result<(), String>
where
    F: Fn(&[String]) -> Result<CatalogEdit, String>,
{
    let edit = parse(args)?;
    let store = open_store(args)?;
    let report = store
        .edit_catalog(edit)
        .map_err(|e| format!("edit catalog: {e}"))?;
    println!(
        "ok\t{}\t{}",
        report.catalog.len(),
        describe_action(&report.migration.action)
    );
    if report.migration.is_destructive() {
        println!("discarded\t{}", report.migration.discarded_rows);
    }
    Ok(())
}

fn cmd_schema_ensure(args: &[String]) -> Result<(), String> {
    let store = open_store(args)?;
    let report = store.startup_migration();
    println!(
        "ok\t{}\t{}\t{}",
        report.table_name,
        report.columns.len(),
        describe_action(&report.action)
    );
    if report.is_destructive() {
        println!("discarded\t{}", report.discarded_rows);
    }
    Ok(())
}

fn cmd_schema_status(args: &[String]) -> Result<(), String> {
    let store = open_store(args)?;
    let action = store
        .pending_migration()
        .map_err(|e| format!("schema status: {e}"))?;
    println!("{}\t{}", store.records().table_name(), describe_action(&action));
    Ok(())
}

fn cmd_export(args: &[String]) -> Result<(), String> {
    let identity = parse_flag_value(args, "--as").ok_or("--as is required")?;
    let role: Role = parse_flag_value(args, "--role")
        .ok_or("--role is required")?
        .parse()
        .map_err(|e| format!("invalid --role: {e}"))?;
    let tenant = parse_flag_value(args, "--tenant").unwrap_or_default();
    let store = open_store(args)?;
    let principal = Principal::new(identity, role, tenant);
    let table = export_table(store.records(), &principal).map_err(|e| format!("export: {e}"))?;
    let json = serde_json::to_string_pretty(&table).map_err(|e| format!("encode export: {e}"))?;
    println!("{json}");
    Ok(())
}

fn parse_append(args: &[String]) -> Result<CatalogEdit, String> {
    Ok(CatalogEdit::Append {
        key: parse_flag_value(args, "--key").ok_or("--key is required")?,
        label: parse_flag_value(args, "--label").ok_or("--label is required")?,
    })
}

fn parse_insert(args: &[String]) -> Result<CatalogEdit, String> {
    let position = parse_flag_value(args, "--at")
        .ok_or("--at is required")?
        .parse()
        .map_err(|e| format!("invalid --at: {e}"))?;
    Ok(CatalogEdit::InsertAt {
        position,
        key: parse_flag_value(args, "--key").ok_or("--key is required")?,
        label: parse_flag_value(args, "--label").ok_or("--label is required")?,
    })
}

fn parse_rename(args: &[String]) -> Result<CatalogEdit, String> {
    Ok(CatalogEdit::RenameLabel {
        index: parse_index(args)?,
        label: parse_flag_value(args, "--label").ok_or("--label is required")?,
    })
}

fn parse_index(args: &[String]) -> Result<usize, String> {
    parse_flag_value(args, "--index")
        .ok_or("--index is required")?
        .parse()
        .map_err(|e| format!("invalid --index: {e}"))
}

fn describe_action(action: &MigrationAction) -> String {
    match action {
        MigrationAction::Create => "created".into(),
        MigrationAction::Unchanged => "unchanged".into(),
        MigrationAction::Rebuild {
            dropped_columns,
            added_columns,
        } => format!(
            "rebuilt\tdropped={}\tadded={}",
            dropped_columns.join(","),
            added_columns.join(",")
        ),
    }
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    for idx in 0..args.len() {
        if args[idx] == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  fieldstore fields list --data-dir <dir>");
    eprintln!("  fieldstore fields add --data-dir <dir> --key <key> --label <label>");
    eprintln!("  fieldstore fields insert --data-dir <dir> --at <pos> --key <key> --label <label>");
    eprintln!("  fieldstore fields rename --data-dir <dir> --index <idx> --label <label>");
    eprintln!("  fieldstore fields remove|up|down --data-dir <dir> --index <idx>");
    eprintln!("  fieldstore schema ensure|status --data-dir <dir>");
    eprintln!(
        "  fieldstore export --data-dir <dir> --as <identity> --role <a|b|c|x> [--tenant <label>]"
    );
    eprintln!("common flags: [--table <name>]");
}
