//! Scripted runs of the interactive interface

use std::io::Cursor;
use std::path::Path;

use par1rs::reporters::SilentReporter;
use par1rs::{ui, Config, ParSession};

fn run_script(root: &Path, script: &str) -> String {
    let mut session = ParSession::with_reporter(
        Config::default(),
        root.to_path_buf(),
        Box::new(SilentReporter::new()),
    );
    let mut out = Vec::new();
    ui::run(&mut session, Cursor::new(script.to_string()), &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn build_an_archive_interactively() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("one.dat"), vec![1u8; 5000]).unwrap();
    std::fs::write(dir.path().join("two.dat"), vec![2u8; 6000]).unwrap();

    let output = run_script(
        dir.path(),
        "load demo.par\n\
         addfile one.dat\n\
         addfile two.dat\n\
         filelist\n\
         parlist\n\
         addpars 1 1\n\
         create\n\
         quit\n",
    );

    assert!(output.contains("  1: one.dat"), "output: {}", output);
    assert!(output.contains("  2: two.dat"));
    assert!(output.contains("  1: demo.par"));
    assert!(dir.path().join("demo.par").exists());
    assert!(dir.path().join("demo.p01").exists());
    // Every mutating command answered OK
    assert_eq!(output.matches("OK").count(), 5, "output: {}", output);
}

#[test]
fn status_bits_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("one.dat"), b"contents").unwrap();

    let output = run_script(
        dir.path(),
        "load demo.par\n\
         addfile one.dat\n\
         filelist\n\
         getstatus 1\n\
         setstatus 1 0x0\n\
         getstatus 1\n\
         quit\n",
    );

    assert!(output.contains("0x1"), "output: {}", output);
    assert!(output.contains("0x0"), "output: {}", output);
}

#[test]
fn loading_twice_reports_already_loaded() {
    let dir = tempfile::tempdir().unwrap();

    let output = run_script(dir.path(), "load demo.par\nload demo.par\nquit\n");
    assert!(output.contains("ERROR: Already loaded"), "output: {}", output);
}

#[test]
fn unknown_and_ambiguous_commands_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), "frobnicate\nfi\nquit\n");
    assert!(output.contains("Unknown command."));
    assert!(output.contains("Ambiguous command."));
}

#[test]
fn check_without_filelist_complains() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), "check\nquit\n");
    assert!(output.contains("ERROR: No filelist."));
}

#[test]
fn removefile_is_not_implemented() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), "removefile 1\nquit\n");
    assert!(output.contains("ERROR: Not Implemented"));
}
