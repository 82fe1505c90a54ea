//! Integration tests for Rampart
//!
//! Drives the library the way a validator run does: prepare, a batch of
//! downloads through a fetcher that actually mirrors files to disk,
//! cleanup, and then a second "process" over the same repository.

use rampart::cache::Cache;
use rampart::config::Config;
use rampart::fetch::{FetchError, Fetcher};
use rampart::overlay;
use rampart::uri::RpkiUri;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Logging the way the validator would set it up. Safe to call from every
/// test; only the first initialization wins.
fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rampart=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}

/// A fetcher that mirrors fake objects into the repository, the way the
/// real rsync/HTTPS transports would.
struct MirrorFetcher {
    repository: PathBuf,
    subtree_calls: u32,
    object_calls: u32,
}

impl MirrorFetcher {
    fn new(config: &Config) -> Self {
        Self {
            repository: config.local_repository.clone(),
            subtree_calls: 0,
            object_calls: 0,
        }
    }
}

impl Fetcher for MirrorFetcher {
    fn fetch_subtree(&mut self, uri: &RpkiUri) -> Result<(), FetchError> {
        self.subtree_calls += 1;
        let dir = self.repository.join(uri.local());
        fs::create_dir_all(&dir).map_err(|_| FetchError::new(1))?;
        fs::write(dir.join("object.cer"), b"subtree object").map_err(|_| FetchError::new(1))?;
        Ok(())
    }

    fn fetch_object(&mut self, uri: &RpkiUri) -> Result<bool, FetchError> {
        self.object_calls += 1;
        let path = self.repository.join(uri.local());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| FetchError::new(1))?;
        }

        let bytes = format!("object at {}", uri.global());
        let changed = fs::read(&path).map(|old| old != bytes.as_bytes()).unwrap_or(true);
        fs::write(&path, bytes).map_err(|_| FetchError::new(1))?;
        Ok(changed)
    }
}

fn test_config(temp: &TempDir) -> Config {
    Config {
        local_repository: temp.path().to_path_buf(),
        slurm: None,
    }
}

/// Walk a metadata.json document down a basename path.
fn metadata_node<'a>(document: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut level: &[Value] = document.as_array()?;
    let mut found: Option<&Value> = None;

    for name in path {
        let node = level
            .iter()
            .find(|node| node.get("basename").and_then(Value::as_str) == Some(*name))?;
        level = match node.get("children") {
            Some(children) => children.as_array()?,
            None => &[],
        };
        found = Some(node);
    }

    found
}

fn read_metadata(repository: &Path) -> Value {
    let text = fs::read_to_string(repository.join("metadata.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

mod cache_runs {
    use super::*;

    const DIRECT: u64 = 1;
    const SUCCESS: u64 = 1 << 1;
    const FILE: u64 = 1 << 3;

    #[test]
    fn cold_start_fetch_survives_restart() {
        init();
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let uri = RpkiUri::parse("https://h/a/b.cer").unwrap();

        // First run.
        {
            let mut fetcher = MirrorFetcher::new(&config);
            let mut cache = Cache::prepare(&config);

            let outcome = cache.download(&uri, &mut fetcher);
            assert!(outcome.is_success());
            assert!(outcome.changed);
            assert_eq!(fetcher.object_calls, 1);

            cache.cleanup();
        }

        // The fresh object survived its own sweep.
        assert!(temp.path().join("https/h/a/b.cer").exists());

        let metadata = read_metadata(temp.path());
        let node = metadata_node(&metadata, &["https", "h", "a", "b.cer"]).unwrap();
        assert_eq!(
            node.get("flags").and_then(Value::as_u64),
            Some(DIRECT | SUCCESS | FILE)
        );
        assert_eq!(node.get("error").and_then(Value::as_u64), Some(0));

        // Second process: the node is loaded back and is no longer fresh,
        // so the URI is fetched once more, with unchanged bytes.
        {
            let mut fetcher = MirrorFetcher::new(&config);
            let mut cache = Cache::prepare(&config);

            let outcome = cache.download(&uri, &mut fetcher);
            assert!(outcome.is_success());
            assert!(!outcome.changed);
            assert_eq!(fetcher.object_calls, 1);
        }
    }

    #[test]
    fn downloads_replay_within_a_run() {
        init();
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let mut fetcher = MirrorFetcher::new(&config);
        let mut cache = Cache::prepare(&config);

        let uri = RpkiUri::parse("https://h/x.cer").unwrap();
        assert!(cache.download(&uri, &mut fetcher).is_success());
        assert!(cache.download(&uri, &mut fetcher).is_success());
        assert_eq!(fetcher.object_calls, 1);

        let parent = RpkiUri::parse("rsync://r/repo/").unwrap();
        let child = RpkiUri::parse("rsync://r/repo/sub/obj.cer").unwrap();
        assert!(cache.download(&parent, &mut fetcher).is_success());
        assert!(cache.download(&child, &mut fetcher).is_success());
        assert_eq!(fetcher.subtree_calls, 1);
    }

    #[test]
    fn file_to_directory_flip_across_runs() {
        init();
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);

        {
            let mut fetcher = MirrorFetcher::new(&config);
            let mut cache = Cache::prepare(&config);
            let file = RpkiUri::parse("https://x.cer").unwrap();
            assert!(cache.download(&file, &mut fetcher).is_success());
            cache.cleanup();
        }
        assert!(temp.path().join("https/x.cer").is_file());

        {
            let mut fetcher = MirrorFetcher::new(&config);
            let mut cache = Cache::prepare(&config);
            let nested = RpkiUri::parse("https://x.cer/y.cer").unwrap();
            assert!(cache.download(&nested, &mut fetcher).is_success());
            cache.cleanup();
        }

        // The old file gave way to a directory holding the new object.
        assert!(temp.path().join("https/x.cer").is_dir());
        assert!(temp.path().join("https/x.cer/y.cer").is_file());

        let metadata = read_metadata(temp.path());
        let flipped = metadata_node(&metadata, &["https", "x.cer"]).unwrap();
        assert_eq!(flipped.get("flags").and_then(Value::as_u64), Some(0));
        let leaf = metadata_node(&metadata, &["https", "x.cer", "y.cer"]).unwrap();
        assert_eq!(
            leaf.get("flags").and_then(Value::as_u64),
            Some(DIRECT | SUCCESS | FILE)
        );
    }

    #[test]
    fn sweep_removes_unused_state() {
        init();
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);

        // An orphan file nothing ever downloaded.
        fs::create_dir_all(temp.path().join("https")).unwrap();
        fs::write(temp.path().join("https/stale.txt"), b"leftover").unwrap();

        // A mirrored object that the second run never touches.
        {
            let mut fetcher = MirrorFetcher::new(&config);
            let mut cache = Cache::prepare(&config);
            let uri = RpkiUri::parse("https://h/old.cer").unwrap();
            assert!(cache.download(&uri, &mut fetcher).is_success());
            cache.cleanup();
        }
        assert!(!temp.path().join("https/stale.txt").exists());
        assert!(temp.path().join("https/h/old.cer").exists());

        {
            let mut cache = Cache::prepare(&config);
            cache.cleanup();
        }

        // Untouched during the run: gone, directory and all.
        assert!(!temp.path().join("https/h").exists());
        let metadata = read_metadata(temp.path());
        assert!(metadata_node(&metadata, &["https", "h"]).is_none());
    }

    #[test]
    fn failed_fetch_is_swept() {
        init();
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);

        struct FailingFetcher;
        impl Fetcher for FailingFetcher {
            fn fetch_subtree(&mut self, _uri: &RpkiUri) -> Result<(), FetchError> {
                Err(FetchError::new(12))
            }
            fn fetch_object(&mut self, _uri: &RpkiUri) -> Result<bool, FetchError> {
                Err(FetchError::new(12))
            }
        }

        {
            let mut cache = Cache::prepare(&config);
            let uri = RpkiUri::parse("https://h/broken.cer").unwrap();
            assert_eq!(cache.download(&uri, &mut FailingFetcher).code, 12);
            // Fresh-but-failed does not survive the sweep, but the sweep
            // itself must not crash on the phantom node.
            cache.cleanup();
        }

        let metadata = read_metadata(temp.path());
        assert!(metadata_node(&metadata, &["https", "h"]).is_none());
    }

    #[test]
    fn corrupt_metadata_is_a_fresh_start() {
        init();
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        fs::write(temp.path().join("metadata.json"), b"{ not json").unwrap();

        let mut fetcher = MirrorFetcher::new(&config);
        let mut cache = Cache::prepare(&config);
        let uri = RpkiUri::parse("https://h/a.cer").unwrap();
        assert!(cache.download(&uri, &mut fetcher).is_success());
        assert_eq!(fetcher.object_calls, 1);
    }
}

mod overlay_loading {
    use super::*;

    fn config_with_slurm(temp: &TempDir, text: &str) -> Config {
        let path = temp.path().join("slurm.json");
        fs::write(&path, text).unwrap();
        Config {
            local_repository: temp.path().to_path_buf(),
            slurm: Some(path),
        }
    }

    #[test]
    fn loads_a_realistic_document() {
        init();
        let temp = TempDir::new().unwrap();
        let config = config_with_slurm(
            &temp,
            r#"{
                "slurmVersion": 1,
                "validationOutputFilters": {
                    "prefixFilters": [
                        { "prefix": "192.0.2.0/24",
                          "comment": "All VRPs encompassed by prefix" },
                        { "asn": 64496, "comment": "All VRPs matching ASN" },
                        { "prefix": "198.51.100.0/24", "asn": 64497,
                          "comment": "All VRPs encompassed by prefix, matching ASN" }
                    ],
                    "bgpsecFilters": [
                        { "asn": 64496, "comment": "All keys for ASN" },
                        { "SKI": "Zm9v", "comment": "Key matching Router SKI" }
                    ]
                },
                "locallyAddedAssertions": {
                    "prefixAssertions": [
                        { "asn": 64496, "prefix": "198.51.100.0/24",
                          "comment": "My important route" },
                        { "asn": 64496, "prefix": "2001:db8::/32",
                          "maxPrefixLength": 48, "comment": "My important de-aggregated routes" }
                    ],
                    "bgpsecAssertions": [
                        { "asn": 64496, "SKI": "c2tp", "routerPublicKey": "a2V5" }
                    ]
                }
            }"#,
        );

        let overlay = overlay::load(&config).unwrap();
        assert_eq!(overlay.prefix_filters.len(), 3);
        assert_eq!(overlay.bgpsec_filters.len(), 2);
        assert_eq!(overlay.prefix_assertions.len(), 2);
        assert_eq!(overlay.bgpsec_assertions.len(), 1);

        let v6 = &overlay.prefix_assertions[1];
        assert_eq!(v6.max_prefix_length, Some(48));
        assert_eq!(v6.prefix.unwrap().length, 32);

        let key = &overlay.bgpsec_assertions[0];
        assert_eq!(key.ski.as_deref(), Some(b"ski".as_slice()));
        assert_eq!(key.router_public_key.as_deref(), Some(b"key".as_slice()));
    }

    #[test]
    fn version_gate() {
        init();
        let temp = TempDir::new().unwrap();
        let config = config_with_slurm(
            &temp,
            r#"{
                "slurmVersion": 2,
                "validationOutputFilters": { "prefixFilters": [], "bgpsecFilters": [] },
                "locallyAddedAssertions": { "prefixAssertions": [], "bgpsecAssertions": [] }
            }"#,
        );

        assert!(overlay::load(&config).is_err());
    }

    #[test]
    fn bad_elements_do_not_poison_the_load() {
        init();
        let temp = TempDir::new().unwrap();
        let config = config_with_slurm(
            &temp,
            r#"{
                "slurmVersion": 1,
                "validationOutputFilters": {
                    "prefixFilters": [
                        { "prefix": "192.0.2.1/24" },
                        { "asn": 99999999999 },
                        { "prefix": "192.0.2.0/24" }
                    ],
                    "bgpsecFilters": [
                        { "SKI": "bad=" }
                    ]
                },
                "locallyAddedAssertions": {
                    "prefixAssertions": [],
                    "bgpsecAssertions": []
                }
            }"#,
        );

        let overlay = overlay::load(&config).unwrap();
        assert_eq!(overlay.prefix_filters.len(), 1);
        assert!(overlay.bgpsec_filters.is_empty());
    }
}
