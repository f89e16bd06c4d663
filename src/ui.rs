//! Interactive text interface
//!
//! A line-oriented dispatcher over [`ParSession`]: commands are
//! matched by unambiguous prefix, list entries are addressed by their
//! number in the most recently printed PARLIST/FILELIST.

use std::io::{BufRead, Write};

use crate::error::ParError;
use crate::session::ParSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmd {
    Load,
    Search,
    Unload,
    Parlist,
    Filelist,
    Check,
    Find,
    Fixname,
    Getstatus,
    Setstatus,
    Recover,
    Addfile,
    Removefile,
    Addpars,
    Create,
    Help,
    Quit,
}

const COMMANDS: &[(&str, Cmd)] = &[
    ("LOAD", Cmd::Load),
    ("SEARCH", Cmd::Search),
    ("UNLOAD", Cmd::Unload),
    ("PARLIST", Cmd::Parlist),
    ("FILELIST", Cmd::Filelist),
    ("CHECK", Cmd::Check),
    ("FIND", Cmd::Find),
    ("FIXNAME", Cmd::Fixname),
    ("GETSTATUS", Cmd::Getstatus),
    ("SETSTATUS", Cmd::Setstatus),
    ("RECOVER", Cmd::Recover),
    ("ADDFILE", Cmd::Addfile),
    ("REMOVEFILE", Cmd::Removefile),
    ("ADDPARS", Cmd::Addpars),
    ("CREATE", Cmd::Create),
    ("HELP", Cmd::Help),
    ("QUIT", Cmd::Quit),
];

const HELP: &str = "\
LOAD <filename>    : Add a (new) PAR file to the current list.
SEARCH             : Search for PAR files matching the current filelist.
UNLOAD <entry>     : Remove a PAR file from the list.
PARLIST            : Show the current list of PAR files.
FILELIST           : Show the current list of data files.
CHECK <entry>      : Check the MD5sum of a file.
FIND <entry>       : Find a file by its filename.
FIXNAME [<entry>]  : Fix faulty filenames [of <entry>].
GETSTATUS <entry>  : Get the status bits of an entry.
SETSTATUS <entry> <status> : Set the status bits of an entry.
RECOVER [<entry>]  : Recover missing files [only <entry>]
ADDFILE <filename> : Add a data file to the current filelist.
REMOVEFILE <entry> : Remove a data file from the current filelist.
ADDPARS <entry> <number> : Add new PAR files until there are <number>.
CREATE [<entry>]   : Create PAR files [only <entry>].
HELP               : Show this help.
QUIT               : Quit.";

/// Match a command by unambiguous prefix; an exact name always wins.
fn lookup(word: &str) -> std::result::Result<Cmd, &'static str> {
    let upper = word.to_ascii_uppercase();
    if let Some((_, cmd)) = COMMANDS.iter().find(|(name, _)| *name == upper) {
        return Ok(*cmd);
    }
    let matches: Vec<Cmd> = COMMANDS
        .iter()
        .filter(|(name, _)| name.starts_with(&upper))
        .map(|(_, cmd)| *cmd)
        .collect();
    match matches.len() {
        0 => Err("Unknown command."),
        1 => Ok(matches[0]),
        _ => Err("Ambiguous command."),
    }
}

fn errcode(result: std::result::Result<(), ParError>) -> &'static str {
    match result {
        Ok(()) => "OK",
        Err(ParError::NotFound(_)) => "ERROR: Not found",
        Err(ParError::Corrupt(_)) => "ERROR: Corrupt",
        Err(ParError::AlreadyLoaded(_)) => "ERROR: Already loaded",
        Err(ParError::NameClash(_)) => "ERROR: Name Clash",
        Err(ParError::NotImplemented) => "ERROR: Not Implemented",
        Err(ParError::InvalidArgument) => "ERROR: Invalid Argument",
        Err(ParError::Unrestorable { .. }) | Err(ParError::WriteBlocked(_)) => "ERROR: Failed",
        Err(_) => "ERROR: File error",
    }
}

/// Parse a 1-based entry number into an index into `list`.
fn get_entry(token: Option<&str>, list: &[String]) -> Option<usize> {
    let n: usize = token?.parse().ok()?;
    if n == 0 || n > list.len() {
        return None;
    }
    Some(n - 1)
}

fn get_number(token: Option<&str>) -> u64 {
    let Some(t) = token else { return 0 };
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).unwrap_or(0)
    } else {
        t.parse().unwrap_or(0)
    }
}

fn print_list(out: &mut impl Write, list: &[String]) -> std::io::Result<()> {
    for (i, name) in list.iter().enumerate() {
        writeln!(out, "{:3}: {}", i + 1, name)?;
    }
    Ok(())
}

/// Run the command loop until QUIT or end of input.
pub fn run(
    session: &mut ParSession,
    input: impl BufRead,
    mut out: impl Write,
) -> std::io::Result<()> {
    let mut parlist: Vec<String> = Vec::new();
    let mut filelist: Vec<String> = Vec::new();

    for line in input.lines() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        let Some(word) = tokens.next() else {
            continue;
        };
        let cmd = match lookup(word) {
            Ok(c) => c,
            Err(msg) => {
                writeln!(out, "{}", msg)?;
                continue;
            }
        };

        match cmd {
            Cmd::Load => {
                let name = tokens.next().unwrap_or("");
                let result = if name.is_empty() {
                    Err(ParError::InvalidArgument)
                } else {
                    session.load(name)
                };
                writeln!(out, "{}", errcode(result))?;
            }
            Cmd::Search => {
                let partial = get_number(tokens.next()) != 0;
                writeln!(out, "{}", errcode(session.search(partial)))?;
            }
            Cmd::Unload => {
                let result = match get_entry(tokens.next(), &parlist) {
                    Some(e) => session.unload(e),
                    None => Err(ParError::InvalidArgument),
                };
                writeln!(out, "{}", errcode(result))?;
            }
            Cmd::Parlist => {
                parlist = session.parlist();
                print_list(&mut out, &parlist)?;
            }
            Cmd::Filelist => {
                filelist = session.filelist();
                print_list(&mut out, &filelist)?;
            }
            Cmd::Check => match get_entry(tokens.next(), &filelist) {
                Some(e) => writeln!(out, "{}", errcode(session.check(e)))?,
                None => {
                    if filelist.is_empty() {
                        writeln!(out, "ERROR: No filelist.")?;
                    } else {
                        for e in 0..filelist.len() {
                            writeln!(out, "CHECK {}", filelist[e])?;
                            writeln!(out, "{}", errcode(session.check(e)))?;
                        }
                    }
                }
            },
            Cmd::Find => {
                match get_entry(tokens.next(), &filelist)
                    .and_then(|e| session.find(e).ok())
                {
                    Some(name) => writeln!(out, "{}", name)?,
                    None => writeln!(out)?,
                }
            }
            Cmd::Fixname => {
                let entry = get_entry(tokens.next(), &filelist);
                writeln!(out, "{}", errcode(session.fixname(entry)))?;
            }
            Cmd::Getstatus => {
                match get_entry(tokens.next(), &filelist).and_then(|e| session.getstatus(e).ok())
                {
                    Some(status) => writeln!(out, "0x{:x}", status)?,
                    None => writeln!(out, "0x0")?,
                }
            }
            Cmd::Setstatus => {
                let entry = get_entry(tokens.next(), &filelist);
                let status = get_number(tokens.next());
                let result = match entry {
                    Some(e) => session.setstatus(e, status),
                    None => Err(ParError::InvalidArgument),
                };
                writeln!(out, "{}", errcode(result))?;
            }
            Cmd::Recover => {
                let entry = get_entry(tokens.next(), &filelist);
                let result = session.recover(entry).map(|outcome| {
                    if outcome.failed() {
                        Err(ParError::Unrestorable {
                            missing: outcome.not_restored,
                            available: 0,
                        })
                    } else {
                        Ok(())
                    }
                });
                writeln!(out, "{}", errcode(result.and_then(|r| r)))?;
            }
            Cmd::Addfile => {
                let name = tokens.next().unwrap_or("");
                let result = if name.is_empty() {
                    Err(ParError::InvalidArgument)
                } else {
                    session.addfile(name)
                };
                writeln!(out, "{}", errcode(result))?;
            }
            Cmd::Removefile => {
                writeln!(out, "{}", errcode(Err(ParError::NotImplemented)))?;
            }
            Cmd::Addpars => {
                let entry = get_entry(tokens.next(), &parlist);
                let number = get_number(tokens.next());
                let result = match entry {
                    Some(e) => session.addpars(e, number),
                    None => Err(ParError::InvalidArgument),
                };
                writeln!(out, "{}", errcode(result))?;
            }
            Cmd::Create => {
                let entry = get_entry(tokens.next(), &parlist);
                let result = session
                    .create(entry)
                    .map(|outcome| {
                        if outcome.failed() {
                            Err(ParError::Unrestorable {
                                missing: outcome.volumes_failed,
                                available: 0,
                            })
                        } else {
                            Ok(())
                        }
                    })
                    .and_then(|r| r);
                writeln!(out, "{}", errcode(result))?;
            }
            Cmd::Help => writeln!(out, "{}", HELP)?,
            Cmd::Quit => break,
        }
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_lookup_resolves_unique_prefixes() {
        assert_eq!(lookup("l"), Ok(Cmd::Load));
        assert_eq!(lookup("qu"), Ok(Cmd::Quit));
        assert_eq!(lookup("SEARCH"), Ok(Cmd::Search));
        assert_eq!(lookup("par"), Ok(Cmd::Parlist));
    }

    #[test]
    fn prefix_lookup_rejects_ambiguity() {
        // FIND vs FIXNAME vs FILELIST
        assert!(lookup("fi").is_err());
        // But an exact name is never ambiguous
        assert_eq!(lookup("find"), Ok(Cmd::Find));
    }

    #[test]
    fn prefix_lookup_rejects_unknown() {
        assert!(lookup("frobnicate").is_err());
    }

    #[test]
    fn entry_numbers_are_one_based() {
        let list = vec!["a".to_string(), "b".to_string()];
        assert_eq!(get_entry(Some("1"), &list), Some(0));
        assert_eq!(get_entry(Some("2"), &list), Some(1));
        assert_eq!(get_entry(Some("3"), &list), None);
        assert_eq!(get_entry(Some("0"), &list), None);
        assert_eq!(get_entry(None, &list), None);
    }

    #[test]
    fn numbers_accept_hex() {
        assert_eq!(get_number(Some("10")), 10);
        assert_eq!(get_number(Some("0x10")), 16);
        assert_eq!(get_number(Some("junk")), 0);
        assert_eq!(get_number(None), 0);
    }
}
