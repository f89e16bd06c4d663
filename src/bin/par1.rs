//! par1 command-line tool
//!
//! Verbs: check, recover, add, mix, interactive. Exit codes: 0 on
//! success, 1 on uncorrectable loss or partial failure, 2 on a fatal
//! parse error.

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;

use par1rs::{Config, ParError, ParSession, SetStatus};

fn toggles() -> Vec<Arg> {
    vec![
        Arg::new("move")
            .short('m')
            .long("move")
            .help("Move existing files out of the way (.bad/.old)")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("recover_volumes")
            .short('r')
            .long("recover-volumes")
            .help("Recover missing parity volumes as well")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("fix")
            .short('f')
            .long("fix")
            .help("Fix faulty filenames")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("smart")
            .long("smart-rename")
            .help("Learn a rename pattern from matched files (with --fix)")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("per_volume")
            .short('p')
            .long("per-volume")
            .help("Number of files per parity volume")
            .value_name("N")
            .value_parser(clap::value_parser!(u32))
            .global(true),
        Arg::new("volumes")
            .short('n')
            .long("volumes")
            .help("Number of parity volumes to create")
            .value_name("N")
            .value_parser(clap::value_parser!(u32))
            .global(true),
        Arg::new("duplicates")
            .short('d')
            .long("duplicates")
            .help("Search for duplicate files")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("keep")
            .short('k')
            .long("keep")
            .help("Keep broken output files")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("no_include")
            .long("no-include")
            .help("Do not add following files to the parity set")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("no_volumes")
            .long("no-volumes")
            .help("Do not create parity volumes")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("ignore_case")
            .short('C')
            .long("ignore-case")
            .help("Compare filenames without case")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("no_control")
            .long("no-control")
            .help("Do not check control hashes")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("close_handles")
            .short('O')
            .long("close-handles")
            .help("Work around the open-file limit")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Increase verbosity")
            .action(ArgAction::Count)
            .global(true),
    ]
}

fn config_from(matches: &ArgMatches) -> Config {
    let mut cfg = Config::default();
    cfg.move_away = matches.get_flag("move");
    cfg.recover_volumes = matches.get_flag("recover_volumes");
    cfg.fix_names = matches.get_flag("fix");
    cfg.smart_rename = matches.get_flag("smart");
    cfg.find_duplicates = matches.get_flag("duplicates");
    cfg.keep_broken = matches.get_flag("keep");
    cfg.include_new = !matches.get_flag("no_include");
    cfg.create_volumes = !matches.get_flag("no_volumes");
    cfg.check_control = !matches.get_flag("no_control");
    cfg.ignore_case = matches.get_flag("ignore_case");
    cfg.limit_handles = matches.get_flag("close_handles");
    cfg.loglevel = matches.get_count("verbose") as i32;
    if let Some(&n) = matches.get_one::<u32>("volumes") {
        cfg.volumes = n;
        cfg.per_volume = false;
    }
    if let Some(&p) = matches.get_one::<u32>("per_volume") {
        cfg.volumes = p;
        cfg.per_volume = true;
    }
    cfg
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let matches = Command::new("par1")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Parity archive tool: protect files with Reed-Solomon recovery volumes")
        .arg_required_else_help(true)
        .args(toggles())
        .subcommand(
            Command::new("check")
                .visible_alias("c")
                .about("Check a parity archive")
                .arg(Arg::new("par").help("PAR file").required(true)),
        )
        .subcommand(
            Command::new("recover")
                .visible_alias("r")
                .about("Check and restore missing files")
                .arg(Arg::new("par").help("PAR file").required(true)),
        )
        .subcommand(
            Command::new("add")
                .visible_alias("a")
                .about("Create a parity archive or add files to one")
                .arg(Arg::new("par").help("PAR file").required(true))
                .arg(Arg::new("files").help("Files to protect").num_args(0..)),
        )
        .subcommand(
            Command::new("mix")
                .about("Use every PAR archive in the directory for a combined restore"),
        )
        .subcommand(
            Command::new("interactive")
                .visible_alias("i")
                .about("Enter the interactive interface")
                .arg(Arg::new("par").help("PAR file to load first")),
        )
        .get_matches();

    let code = match matches.subcommand() {
        Some(("check", sub)) => handle_verify(&matches, sub, false),
        Some(("recover", sub)) => handle_verify(&matches, sub, true),
        Some(("add", sub)) => handle_add(&matches, sub),
        Some(("mix", _)) => handle_mix(&matches),
        Some(("interactive", sub)) => handle_interactive(&matches, sub),
        _ => {
            eprintln!("Error: No command specified");
            Ok(2)
        }
    };

    match code {
        Ok(n) => ExitCode::from(n),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn new_session(matches: &ArgMatches) -> ParSession {
    ParSession::new(config_from(matches), PathBuf::from("."))
}

/// Map a load failure to the fatal-parse exit code.
fn report_load_error(name: &str, err: &ParError) -> u8 {
    eprintln!("{}: {}", name, err);
    2
}

fn handle_verify(matches: &ArgMatches, sub: &ArgMatches, restore: bool) -> Result<u8> {
    let par = sub.get_one::<String>("par").expect("par is required");
    let mut session = new_session(matches);

    eprintln!("Checking {}", par);
    if let Err(e) = session.load(par) {
        return Ok(report_load_error(par, &e));
    }
    session.search(false)?;

    Ok(match session.verify_set(restore)? {
        SetStatus::AllFound => 0,
        SetStatus::Restorable { .. } => 0,
        SetStatus::Restored(outcome) => {
            if outcome.failed() {
                1
            } else {
                0
            }
        }
        SetStatus::Unrestorable { .. } => 1,
    })
}

fn handle_add(matches: &ArgMatches, sub: &ArgMatches) -> Result<u8> {
    let par = sub.get_one::<String>("par").expect("par is required");
    let files: Vec<&String> = sub
        .get_many::<String>("files")
        .map(|v| v.collect())
        .unwrap_or_default();
    let mut session = new_session(matches);

    eprintln!("Adding to {}", par);
    if let Err(e) = session.load(par) {
        return Ok(report_load_error(par, &e));
    }

    let mut fail = 0u8;
    for file in files {
        match session.addfile(file) {
            Ok(()) => eprintln!("  {:<40} - OK", file),
            Err(ParError::AlreadyLoaded(_)) => {
                eprintln!("  {:<40} - ALREADY EXISTS", file)
            }
            Err(ParError::NameClash(_)) => {
                eprintln!("  {:<40} - NAME CLASH", file);
                fail |= 1;
            }
            Err(e) => {
                eprintln!("  {:<40} - {}", file, e);
                fail |= 1;
            }
        }
    }

    let cfg = session.config().clone();
    if cfg.create_volumes && cfg.volumes > 0 {
        let count = if cfg.per_volume {
            let parity = session.files().iter().filter(|f| f.in_parity_set()).count() as u32;
            if parity == 0 {
                0
            } else {
                parity.div_ceil(cfg.volumes)
            }
        } else {
            cfg.volumes
        };
        if count > 0 {
            let slot = session
                .parlist()
                .iter()
                .position(|name| name == par)
                .unwrap_or(0);
            session.addpars(slot, count as u64)?;
            eprintln!("\nCreating PAR volumes:");
        }
    }

    match session.create(None) {
        Ok(outcome) if !outcome.failed() => Ok(fail),
        Ok(_) => Ok(fail | 1),
        Err(e) => {
            eprintln!("{}", e);
            Ok(fail | 1)
        }
    }
}

fn handle_mix(matches: &ArgMatches) -> Result<u8> {
    let mut session = new_session(matches);
    if session.gather_all()? == 0 {
        eprintln!("No PAR archives found");
        return Ok(1);
    }
    Ok(match session.verify_set(true)? {
        SetStatus::AllFound => 0,
        SetStatus::Restorable { .. } => 0,
        SetStatus::Restored(outcome) => {
            if outcome.failed() {
                1
            } else {
                0
            }
        }
        SetStatus::Unrestorable { .. } => 1,
    })
}

fn handle_interactive(matches: &ArgMatches, sub: &ArgMatches) -> Result<u8> {
    let mut session = new_session(matches);
    if let Some(par) = sub.get_one::<String>("par") {
        if let Err(e) = session.load(par) {
            eprintln!("{}: {}", par, e);
        }
    }
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    par1rs::ui::run(&mut session, stdin.lock(), stdout.lock())?;
    Ok(0)
}
