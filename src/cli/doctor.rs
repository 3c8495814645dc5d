use crate::common::{Config, Workspace};
use crate::core::session::cuda_available;
use crate::core::whitelist::list_images;
use crate::video::tool_available;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub ok: bool,
    pub detail: String,
    /// A failed required check makes the whole run fail.
    pub required: bool,
}

impl Check {
    fn new(name: &str, ok: bool, detail: impl Into<String>, required: bool) -> Self {
        Self { name: name.to_string(), ok, detail: detail.into(), required }
    }
}

#[derive(Debug, Default)]
pub struct DoctorReport {
    pub checks: Vec<Check>,
}

impl DoctorReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.ok || !c.required)
    }

    pub fn push(&mut self, check: Check) {
        self.checks.push(check);
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let mark = match (check.ok, check.required) {
                (true, _) => "✓",
                (false, true) => "✗",
                (false, false) => "!",
            };
            writeln!(f, "{} {:<20} {}", mark, check.name, check.detail)?;
        }
        write!(f, "\n{}", if self.passed() { "All required checks passed." } else { "Some required checks failed." })
    }
}

/// Runs every environment check for the given config file.
pub fn run_checks(config_path: &Path, dev: bool) -> DoctorReport {
    let mut report = DoctorReport::default();
    report.push(Check::new("version", true, env!("CARGO_PKG_VERSION"), false));

    for tool in ["ffmpeg", "ffprobe"] {
        let ok = tool_available(tool);
        let detail = if ok { "found on PATH" } else { "not found; install ffmpeg" };
        report.push(Check::new(tool, ok, detail, true));
    }

    let config = match Config::load_from_path(config_path) {
        Ok(config) => {
            let detail = if config_path.exists() {
                format!("{} is valid", config_path.display())
            } else {
                format!("{} not found, using defaults", config_path.display())
            };
            report.push(Check::new("config", true, detail, true));
            config
        }
        Err(e) => {
            report.push(Check::new("config", false, e.to_string(), true));
            Config::default()
        }
    };

    let workspace = match Workspace::new(&config, dev) {
        Ok(ws) => ws,
        Err(e) => {
            report.push(Check::new("workspace", false, e.to_string(), true));
            return report;
        }
    };

    for (name, path) in [
        ("detector model", &config.models.detector_path),
        ("recognizer model", &config.models.recognizer_path),
    ] {
        let resolved = workspace.resolve_model(path);
        let ok = resolved.is_file();
        let detail = if ok {
            resolved.display().to_string()
        } else {
            format!("missing: {}", resolved.display())
        };
        report.push(Check::new(name, ok, detail, true));
    }

    report.push(check_whitelist_dir(workspace.whitelist_dir()));
    report.push(check_output_writable(workspace.output_dir()));

    // Loading the runtime library panics when it is absent
    let cuda = std::panic::catch_unwind(cuda_available).unwrap_or(false);
    let detail = if cuda { "CUDA execution provider available" } else { "CPU only" };
    report.push(Check::new("gpu", cuda, detail, false));

    report
}

pub fn check_whitelist_dir(dir: &Path) -> Check {
    if !dir.is_dir() {
        return Check::new("whitelist", false, format!("{} does not exist", dir.display()), false);
    }
    match list_images(dir) {
        Ok(images) => {
            let ok = !images.is_empty();
            Check::new("whitelist", ok, format!("{} image(s) in {}", images.len(), dir.display()), false)
        }
        Err(e) => Check::new("whitelist", false, e.to_string(), false),
    }
}

pub fn check_output_writable(dir: &Path) -> Check {
    let probe = dir.join(".face-blur-write-test");
    let result = fs::create_dir_all(dir)
        .and_then(|_| fs::write(&probe, b"ok"))
        .and_then(|_| fs::remove_file(&probe));

    match result {
        Ok(()) => Check::new("output dir", true, format!("{} is writable", dir.display()), false),
        Err(e) => Check::new("output dir", false, format!("{}: {}", dir.display(), e), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn optional_failures_do_not_fail_the_run() {
        let mut report = DoctorReport::default();
        report.push(Check::new("ffmpeg", true, "", true));
        report.push(Check::new("gpu", false, "CPU only", false));
        assert!(report.passed());

        report.push(Check::new("config", false, "bad", true));
        assert!(!report.passed());
        assert!(report.to_string().contains("✗ config"));
    }

    #[test]
    fn whitelist_check_counts_images() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.png"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let check = check_whitelist_dir(dir.path());
        assert!(check.ok);
        assert!(check.detail.starts_with("1 image(s)"));

        assert!(!check_whitelist_dir(&dir.path().join("missing")).ok);
    }

    #[test]
    fn output_check_creates_the_directory() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested/output");
        assert!(check_output_writable(&out).ok);
        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }
}
