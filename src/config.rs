//! Command configuration
//!
//! The original tool kept its switches in a global `cmd` struct; here
//! they travel as an explicit value passed through the call graph.

/// Toggles and counts shared by every operation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of volumes to create, or files per volume when `per_volume`
    pub volumes: u32,
    /// `volumes` counts files per volume instead of total volumes
    pub per_volume: bool,
    /// Rename files that are in the way instead of failing
    pub move_away: bool,
    /// Also recover missing parity volumes
    pub recover_volumes: bool,
    /// Rename on-disk files whose names don't match the archive
    pub fix_names: bool,
    /// Learn a substitution pattern from matched names and apply it to
    /// the rest (only meaningful together with `fix_names`)
    pub smart_rename: bool,
    /// Accept case-folded filename matches
    pub ignore_case: bool,
    /// Scan for content-identical duplicates while matching
    pub find_duplicates: bool,
    /// Mark newly added files as members of the parity set
    pub include_new: bool,
    /// Create parity volumes when adding files
    pub create_volumes: bool,
    /// Validate control hashes when reading archives; written archives
    /// always carry one
    pub check_control: bool,
    /// Keep broken output files instead of deleting them
    pub keep_broken: bool,
    /// Work around the open-file limit by closing idle read handles
    pub limit_handles: bool,
    /// Verbosity: 0 normal, 1 verbose, 2 dumps parsed archives
    pub loglevel: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            volumes: 10,
            per_volume: true,
            move_away: false,
            recover_volumes: false,
            fix_names: false,
            smart_rename: false,
            ignore_case: false,
            find_duplicates: false,
            include_new: true,
            create_volumes: true,
            check_control: true,
            keep_broken: false,
            limit_handles: false,
            loglevel: 0,
        }
    }
}
