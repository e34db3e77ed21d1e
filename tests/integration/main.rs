//! Integration tests for Molt

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn molt() -> Command {
        cargo_bin_cmd!("molt")
    }

    /// build/cache/env dirs plus args wired up for one invocation
    struct BuildDirs {
        temp: TempDir,
    }

    impl BuildDirs {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            std::fs::create_dir_all(temp.path().join("build")).unwrap();
            std::fs::create_dir_all(temp.path().join("env")).unwrap();
            Self { temp }
        }

        fn build(&self) -> std::path::PathBuf {
            self.temp.path().join("build")
        }

        fn cache(&self) -> std::path::PathBuf {
            self.temp.path().join("cache")
        }

        fn args(&self) -> [String; 3] {
            [
                self.build().display().to_string(),
                self.cache().display().to_string(),
                self.temp.path().join("env").display().to_string(),
            ]
        }
    }

    #[test]
    fn help_displays() {
        molt()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Python build pipeline"));
    }

    #[test]
    fn version_displays() {
        molt()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("molt"));
    }

    #[test]
    fn missing_args_rejected() {
        molt()
            .arg("/tmp/build-only")
            .assert()
            .failure()
            .stderr(predicate::str::contains("required"));
    }

    #[test]
    fn nonexistent_build_dir_fails() {
        let dirs = BuildDirs::new();
        molt()
            .args([
                "/nonexistent/build".to_string(),
                dirs.cache().display().to_string(),
                dirs.temp.path().join("env").display().to_string(),
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn unknown_version_fails_and_records_reason() {
        let dirs = BuildDirs::new();
        std::fs::write(dirs.build().join(".python-version"), "3.8.0\n").unwrap();

        molt()
            .args(dirs.args())
            .assert()
            .failure()
            .stderr(predicate::str::contains("3.8.0"));

        // the reason slug survives for the next build to inspect
        let record =
            std::fs::read_to_string(dirs.cache().join(".molt/python.json")).unwrap();
        assert!(record.contains("\"failure_reason\": \"python-version-not-found\""));
    }

    #[test]
    fn garbled_version_request_fails() {
        let dirs = BuildDirs::new();
        std::fs::write(dirs.build().join(".python-version"), "not-a-version\n").unwrap();

        molt()
            .args(dirs.args())
            .assert()
            .failure()
            .stderr(predicate::str::contains("not-a-version"));
    }

    #[test]
    fn conflicting_lock_files_fail_fast() {
        let dirs = BuildDirs::new();
        std::fs::write(dirs.build().join("poetry.lock"), "").unwrap();
        std::fs::write(dirs.build().join("Pipfile.lock"), "{}").unwrap();

        molt()
            .args(dirs.args())
            .assert()
            .failure()
            .stderr(predicate::str::contains("poetry.lock"));

        let record =
            std::fs::read_to_string(dirs.cache().join(".molt/python.json")).unwrap();
        assert!(record.contains("ambiguous-package-manager"));
    }

    #[test]
    fn failing_pre_compile_hook_stops_the_build() {
        let dirs = BuildDirs::new();
        std::fs::create_dir_all(dirs.build().join("bin")).unwrap();
        std::fs::write(
            dirs.build().join("bin/pre_compile"),
            "#!/bin/bash\necho boom\nexit 9\n",
        )
        .unwrap();

        molt()
            .args(dirs.args())
            .assert()
            .failure()
            .stderr(predicate::str::contains("pre_compile"));
    }
}
