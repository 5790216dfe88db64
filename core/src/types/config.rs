use crate::error::{AnonError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default folder under the output directory that holds relocated images
pub const DEFAULT_NAMESPACE_ROOT: &str = "images";

/// Default file name of the sanitized database copy
pub const DEFAULT_SANITIZED_DB_NAME: &str = "Medical_update.gdb";

/// Default file name of the CSV report
pub const DEFAULT_REPORT_NAME: &str = "results.csv";

/// Default bound on how long a database call waits for a lock
///
/// This is the only time bound in a run. Image reads, image writes and the
/// database file copy go through blocking filesystem calls with no deadline,
/// so a hung network share stalls the run until the OS gives up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable configuration of one de-identification run
///
/// Constructed once from the three process-boundary parameters and passed
/// into [`crate::pipeline::run`].
///
/// # Example
///
/// ```
/// use medanon_core::RunConfig;
///
/// let config = RunConfig::new("MEDICAL.GDB", "MKB10.GDB", "out")
///     .with_workers(4)
///     .with_namespace_root("anon");
///
/// assert_eq!(config.workers, 4);
/// assert_eq!(config.report_path(), std::path::Path::new("out/results.csv"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Clinical outcomes database (never opened for writing)
    pub outcomes_db: PathBuf,

    /// Diagnosis-code reference database
    pub diagnosis_db: PathBuf,

    /// Directory receiving the report, the sanitized copy and the image tree
    pub output_dir: PathBuf,

    /// Folder name under which relocated images are organized
    pub namespace_root: String,

    /// File name of the sanitized database copy
    pub sanitized_db_name: String,

    /// File name of the CSV report
    pub report_name: String,

    /// Relocation worker count; 1 runs sequentially
    pub workers: usize,

    /// Busy timeout applied to every database connection; file I/O is unbounded
    pub busy_timeout: Duration,

    /// Rewrite stored image paths in the sanitized copy
    pub update_paths: bool,

    /// Draw a progress bar during relocation
    pub show_progress: bool,
}

impl RunConfig {
    /// Creates a configuration with default names, one worker and no progress bar
    pub fn new(
        outcomes_db: impl Into<PathBuf>,
        diagnosis_db: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            outcomes_db: outcomes_db.into(),
            diagnosis_db: diagnosis_db.into(),
            output_dir: output_dir.into(),
            namespace_root: DEFAULT_NAMESPACE_ROOT.to_string(),
            sanitized_db_name: DEFAULT_SANITIZED_DB_NAME.to_string(),
            report_name: DEFAULT_REPORT_NAME.to_string(),
            workers: 1,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            update_paths: true,
            show_progress: false,
        }
    }

    pub fn with_namespace_root(mut self, root: impl Into<String>) -> Self {
        self.namespace_root = root.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_path_updates(mut self, update_paths: bool) -> Self {
        self.update_paths = update_paths;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Location of the sanitized database copy
    pub fn sanitized_db_path(&self) -> PathBuf {
        self.output_dir.join(&self.sanitized_db_name)
    }

    /// Location of the CSV report
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(&self.report_name)
    }

    /// Directory containing the outcomes database; relative stored paths resolve here
    pub fn source_base_dir(&self) -> &Path {
        self.outcomes_db
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Checks the configuration before any side effects
    ///
    /// # Errors
    ///
    /// Returns [`AnonError::InvalidConfig`] if:
    /// - either input database is not an existing file
    /// - the sanitized copy and the report share one path
    /// - an output (sanitized copy, report or image folder) is an input database
    /// - an input database lies inside the image folder
    /// - the namespace root is not a single plain folder name
    /// - the worker count is zero
    pub fn validate(&self) -> Result<()> {
        for (label, path) in [
            ("outcomes database", &self.outcomes_db),
            ("diagnosis database", &self.diagnosis_db),
        ] {
            if !path.is_file() {
                return Err(AnonError::InvalidConfig(format!(
                    "{} {} is not a file",
                    label,
                    path.display()
                )));
            }
        }

        if self.output_dir.is_file() {
            return Err(AnonError::InvalidConfig(format!(
                "output directory {} is a file",
                self.output_dir.display()
            )));
        }

        let copy = self.sanitized_db_path();
        let report = self.report_path();
        if copy == report {
            return Err(AnonError::InvalidConfig(format!(
                "report and sanitized copy are both {}",
                copy.display()
            )));
        }

        let image_root = self.output_dir.join(&self.namespace_root);
        for (label, input) in [
            ("outcomes database", &self.outcomes_db),
            ("diagnosis database", &self.diagnosis_db),
        ] {
            for (output, target) in [
                ("sanitized copy", &copy),
                ("report", &report),
                ("image folder", &image_root),
            ] {
                if same_file(target, input) {
                    return Err(AnonError::InvalidConfig(format!(
                        "{} {} would overwrite the {}",
                        output,
                        target.display(),
                        label
                    )));
                }
            }
            if is_inside(input, &image_root) {
                return Err(AnonError::InvalidConfig(format!(
                    "{} {} lies inside the image folder {}",
                    label,
                    input.display(),
                    image_root.display()
                )));
            }
        }

        let root = self.namespace_root.as_str();
        if root.is_empty()
            || root == "."
            || root == ".."
            || root.contains(['/', '\\'])
            || root.ends_with(':')
        {
            return Err(AnonError::InvalidConfig(format!(
                "namespace root '{}' must be a single folder name",
                root
            )));
        }

        if self.workers == 0 {
            return Err(AnonError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Whether both paths name one existing file; a missing path matches nothing
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn is_inside(path: &Path, dir: &Path) -> bool {
    match (path.canonicalize(), dir.canonicalize()) {
        (Ok(path), Ok(dir)) => path.starts_with(dir),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn config_with_inputs(dir: &TempDir) -> RunConfig {
        let outcomes = dir.path().join("MEDICAL.GDB");
        let diagnosis = dir.path().join("MKB10.GDB");
        File::create(&outcomes).unwrap();
        File::create(&diagnosis).unwrap();
        RunConfig::new(outcomes, diagnosis, dir.path().join("out"))
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::new("a.db", "b.db", "out");
        assert_eq!(config.namespace_root, "images");
        assert_eq!(config.sanitized_db_path(), Path::new("out/Medical_update.gdb"));
        assert_eq!(config.report_path(), Path::new("out/results.csv"));
        assert_eq!(config.workers, 1);
        assert!(config.update_paths);
    }

    #[test]
    fn test_source_base_dir() {
        let config = RunConfig::new("/archive/db/MEDICAL.GDB", "b.db", "out");
        assert_eq!(config.source_base_dir(), Path::new("/archive/db"));

        let bare = RunConfig::new("MEDICAL.GDB", "b.db", "out");
        assert_eq!(bare.source_base_dir(), Path::new("."));
    }

    #[test]
    fn test_validate_ok() {
        let dir = TempDir::new().unwrap();
        assert!(config_with_inputs(&dir).validate().is_ok());
    }

    #[test]
    fn test_validate_missing_input() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig::new(
            dir.path().join("missing.gdb"),
            dir.path().join("also-missing.gdb"),
            dir.path(),
        );
        assert!(matches!(
            config.validate(),
            Err(AnonError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_namespace_and_workers() {
        let dir = TempDir::new().unwrap();
        let base = config_with_inputs(&dir);

        assert!(base.clone().with_namespace_root("a/b").validate().is_err());
        assert!(base.clone().with_namespace_root("").validate().is_err());
        assert!(base.clone().with_namespace_root("..").validate().is_err());
        assert!(base.clone().with_workers(0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_copy_over_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("Medical_update.gdb");
        let diagnosis = dir.path().join("MKB10.GDB");
        File::create(&source).unwrap();
        File::create(&diagnosis).unwrap();

        let config = RunConfig::new(&source, diagnosis, dir.path());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_report_over_source() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_inputs(&dir);
        config.output_dir = dir.path().to_path_buf();
        config.report_name = "MEDICAL.GDB".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("outcomes database"));
    }

    #[test]
    fn test_validate_rejects_copy_over_diagnosis() {
        let dir = TempDir::new().unwrap();
        let outcomes = dir.path().join("MEDICAL.GDB");
        let diagnosis = dir.path().join("Medical_update.gdb");
        File::create(&outcomes).unwrap();
        File::create(&diagnosis).unwrap();

        let config = RunConfig::new(outcomes, diagnosis, dir.path());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("diagnosis database"));
    }

    #[test]
    fn test_validate_rejects_report_named_like_copy() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_inputs(&dir);
        config.report_name = config.sanitized_db_name.clone();

        assert!(matches!(
            config.validate(),
            Err(AnonError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_inputs_under_image_folder() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("out/images");
        std::fs::create_dir_all(&images).unwrap();
        let outcomes = images.join("MEDICAL.GDB");
        let diagnosis = dir.path().join("MKB10.GDB");
        File::create(&outcomes).unwrap();
        File::create(&diagnosis).unwrap();

        let config = RunConfig::new(outcomes, diagnosis, dir.path().join("out"));
        assert!(config.validate().is_err());

        // Image folder named after the outcomes file itself
        let flat = config_with_inputs(&dir);
        let clash = RunConfig::new(&flat.outcomes_db, &flat.diagnosis_db, dir.path())
            .with_namespace_root("MEDICAL.GDB");
        assert!(clash.validate().is_err());
    }
}
