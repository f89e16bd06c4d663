//! Rename-away safety, smart rename, and duplicate detection

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use par1rs::reporters::{FileStatus, Reporter, SilentReporter};
use par1rs::{Config, ParSession};

fn pseudo_random(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// Captures duplicate and status events for assertions.
#[derive(Clone, Default)]
struct RecordingReporter {
    duplicates: Rc<RefCell<Vec<(String, String)>>>,
    statuses: Rc<RefCell<Vec<(String, FileStatus)>>>,
}

impl Reporter for RecordingReporter {
    fn file_status(&self, name: &str, status: &FileStatus) {
        self.statuses
            .borrow_mut()
            .push((name.to_string(), status.clone()));
    }

    fn rename(&self, _from: &str, _to: &str) {}

    fn duplicate(&self, kept: &str, other: &str) {
        self.duplicates
            .borrow_mut()
            .push((kept.to_string(), other.to_string()));
    }

    fn note(&self, _message: &str) {}

    fn progress(&self, _done: u64, _total: u64) {}

    fn progress_done(&self) {}
}

/// Build an archive over the given file names (all seeded randomly),
/// one recovery volume.
fn build_archive(root: &Path, names: &[&str]) {
    for (i, name) in names.iter().enumerate() {
        std::fs::write(root.join(name), pseudo_random(8192, 0x1000 + i as u64)).unwrap();
    }
    let mut s = ParSession::with_reporter(
        Config::default(),
        root.to_path_buf(),
        Box::new(SilentReporter::new()),
    );
    s.load("demo.par").unwrap();
    for name in names {
        s.addfile(name).unwrap();
    }
    s.addpars(0, 1).unwrap();
    assert!(!s.create(None).unwrap().failed());
}

#[test]
fn s5_smart_rename_restores_expected_names() {
    let dir = tempfile::tempdir().unwrap();
    let expected = ["bar.001", "bar.002", "bar.003", "bar.004", "bar.005"];
    build_archive(dir.path(), &expected);

    // Everything got renamed on disk
    for name in expected {
        let other = name.replace("bar", "foo");
        std::fs::rename(dir.path().join(name), dir.path().join(other)).unwrap();
    }

    let mut cfg = Config::default();
    cfg.move_away = true;
    cfg.fix_names = true;
    cfg.smart_rename = true;
    let mut s = ParSession::with_reporter(
        cfg,
        dir.path().to_path_buf(),
        Box::new(SilentReporter::new()),
    );
    s.load("demo.par").unwrap();
    s.fixname(None).unwrap();

    for name in expected {
        assert!(dir.path().join(name).exists(), "{} not renamed back", name);
        assert!(!dir.path().join(name.replace("bar", "foo")).exists());
    }
}

#[test]
fn smart_rename_covers_content_changed_files() {
    let dir = tempfile::tempdir().unwrap();
    let expected = ["bar.001", "bar.002", "bar.003", "bar.004", "bar.005"];
    build_archive(dir.path(), &expected);

    for name in expected {
        let other = name.replace("bar", "foo");
        std::fs::rename(dir.path().join(name), dir.path().join(other)).unwrap();
    }
    // Two of the renamed files were also modified, so content matching
    // cannot bind them; only the learned pattern can
    std::fs::write(dir.path().join("foo.004"), b"changed content").unwrap();
    std::fs::write(dir.path().join("foo.005"), b"also changed").unwrap();

    let mut cfg = Config::default();
    cfg.move_away = true;
    cfg.fix_names = true;
    cfg.smart_rename = true;
    let mut s = ParSession::with_reporter(
        cfg,
        dir.path().to_path_buf(),
        Box::new(SilentReporter::new()),
    );
    s.load("demo.par").unwrap();
    let _ = s.fixname(None);

    for name in expected {
        assert!(dir.path().join(name).exists(), "{} not renamed back", name);
    }
    assert_eq!(
        std::fs::read(dir.path().join("bar.004")).unwrap(),
        b"changed content"
    );
}

#[test]
fn s6_duplicate_files_are_reported_and_matched() {
    let dir = tempfile::tempdir().unwrap();
    build_archive(dir.path(), &["z.dat"]);

    // The expected file now exists twice, under two other names
    std::fs::rename(dir.path().join("z.dat"), dir.path().join("x.dat")).unwrap();
    std::fs::copy(dir.path().join("x.dat"), dir.path().join("y.dat")).unwrap();

    let reporter = RecordingReporter::default();
    let mut cfg = Config::default();
    cfg.find_duplicates = true;
    let mut s = ParSession::with_reporter(
        cfg,
        dir.path().to_path_buf(),
        Box::new(reporter.clone()),
    );
    s.load("demo.par").unwrap();
    s.search(false).unwrap();
    s.verify_set(false).unwrap();

    let dups = reporter.duplicates.borrow();
    assert_eq!(dups.len(), 1, "expected one duplicate report: {:?}", dups);
    let (kept, other) = &dups[0];
    let mut pair = [kept.as_str(), other.as_str()];
    pair.sort();
    assert_eq!(pair, ["x.dat", "y.dat"]);

    // And the expected entry found a home
    let statuses = reporter.statuses.borrow();
    assert!(statuses
        .iter()
        .any(|(name, st)| name == "z.dat" && matches!(st, FileStatus::Found(_))));
}

#[test]
fn rename_away_without_move_fails_untouched() {
    let dir = tempfile::tempdir().unwrap();
    build_archive(dir.path(), &["data.bin"]);

    // The expected name is occupied by a different file
    std::fs::rename(dir.path().join("data.bin"), dir.path().join("moved.bin")).unwrap();
    std::fs::write(dir.path().join("data.bin"), b"squatter").unwrap();

    let mut cfg = Config::default();
    cfg.fix_names = true; // but move_away stays off
    let mut s = ParSession::with_reporter(
        cfg,
        dir.path().to_path_buf(),
        Box::new(SilentReporter::new()),
    );
    s.load("demo.par").unwrap();
    assert!(s.fixname(None).is_err());

    // Nothing was overwritten or renamed
    assert_eq!(std::fs::read(dir.path().join("data.bin")).unwrap(), b"squatter");
    assert!(dir.path().join("moved.bin").exists());
}

#[test]
fn rename_away_with_move_steps_occupant_aside() {
    let dir = tempfile::tempdir().unwrap();
    build_archive(dir.path(), &["data.bin"]);

    std::fs::rename(dir.path().join("data.bin"), dir.path().join("moved.bin")).unwrap();
    std::fs::write(dir.path().join("data.bin"), b"squatter").unwrap();

    let mut cfg = Config::default();
    cfg.fix_names = true;
    cfg.move_away = true;
    let mut s = ParSession::with_reporter(
        cfg,
        dir.path().to_path_buf(),
        Box::new(SilentReporter::new()),
    );
    s.load("demo.par").unwrap();
    s.fixname(None).unwrap();

    // The real content is back under its name; the squatter moved to .bad
    assert!(dir.path().join("data.bin").exists());
    assert_eq!(
        std::fs::read(dir.path().join("data.bin.bad")).unwrap(),
        b"squatter"
    );
    assert!(!dir.path().join("moved.bin").exists());
}

#[test]
fn bad_suffix_falls_back_to_numbered_names() {
    let dir = tempfile::tempdir().unwrap();
    build_archive(dir.path(), &["data.bin"]);

    std::fs::rename(dir.path().join("data.bin"), dir.path().join("moved.bin")).unwrap();
    std::fs::write(dir.path().join("data.bin"), b"squatter").unwrap();
    std::fs::write(dir.path().join("data.bin.bad"), b"earlier .bad").unwrap();

    let mut cfg = Config::default();
    cfg.fix_names = true;
    cfg.move_away = true;
    let mut s = ParSession::with_reporter(
        cfg,
        dir.path().to_path_buf(),
        Box::new(SilentReporter::new()),
    );
    s.load("demo.par").unwrap();
    s.fixname(None).unwrap();

    assert_eq!(
        std::fs::read(dir.path().join("data.bin.bad")).unwrap(),
        b"earlier .bad"
    );
    assert_eq!(
        std::fs::read(dir.path().join("data.bin.bad00")).unwrap(),
        b"squatter"
    );
}
