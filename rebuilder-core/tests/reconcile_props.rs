//! Properties of reconciliation over real trees: ordering, exclusivity of
//! the *Only classes and content-only matching.

use camino::{Utf8Path, Utf8PathBuf};
use proptest::prelude::*;
use rebuilder_artifacts::{RuleSet, enumerate_dir};
use rebuilder_core::adapters::MirrorOrigin;
use rebuilder_core::ports::OriginPort;
use rebuilder_core::CancelToken;
use rebuilder_core::reconcile::reconcile;
use rebuilder_types::artifact::ArtifactOrigin;
use rebuilder_types::compare::Classification;
use rebuilder_types::job::{BuildJob, SourceRevision, Target};
use std::collections::BTreeMap;

fn job(root: &Utf8Path, workers: usize) -> BuildJob {
    BuildJob {
        version: "SNAPSHOT".into(),
        target: Target::parse("ath79/generic").unwrap(),
        revision: SourceRevision {
            branch: "master".into(),
            tag: None,
        },
        source_git: "https://example.invalid/openwrt.git".into(),
        origin_url: "https://downloads.example.invalid".into(),
        build_dir: root.join("build"),
        dl_dir: root.join("build/dl"),
        results_dir: root.join("results"),
        origin_cache_dir: root.join("cache"),
        jobs: 1,
        deep_diff: false,
        diff_workers: workers,
        diffoscope_timeout_secs: 5,
        build_timeout_secs: None,
        config_overrides: vec![],
        patches_dir: None,
    }
}

fn put(path: &Utf8Path, body: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

/// Which side(s) hold a name, and whether the bytes agree.
#[derive(Debug, Clone, Copy)]
enum Side {
    Local,
    Official,
    BothSame,
    BothDifferent,
}

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![
        Just(Side::Local),
        Just(Side::Official),
        Just(Side::BothSame),
        Just(Side::BothDifferent),
    ]
}

fn layout() -> impl Strategy<Value = BTreeMap<String, Side>> {
    prop::collection::btree_map("[a-z]{1,6}(\\.bin|\\.ipk|/[a-z]{1,4}\\.ipk)", side(), 1..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn classification_follows_presence_and_content(files in layout(), workers in 1usize..6) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let job = job(&root, workers);
        let mirror = root.join("mirror");
        let official_dir = mirror.join(job.target_dir());
        std::fs::create_dir_all(&official_dir).unwrap();

        for (name, side) in &files {
            match side {
                Side::Local => put(&job.target_bin_dir().join(name), name.as_bytes()),
                Side::Official => put(&official_dir.join(name), name.as_bytes()),
                Side::BothSame => {
                    put(&job.target_bin_dir().join(name), name.as_bytes());
                    put(&official_dir.join(name), name.as_bytes());
                }
                Side::BothDifferent => {
                    put(&job.target_bin_dir().join(name), b"local");
                    put(&official_dir.join(name), b"official");
                }
            }
        }

        let rules = RuleSet::v1();
        let origin = MirrorOrigin::new(&mirror);
        let local = enumerate_dir(&job.target_bin_dir(), ArtifactOrigin::Local, &rules, &job.target).unwrap();
        let official = origin.listing(&job, &rules).unwrap();
        let results = reconcile(&job, &local, &official, &origin, None, &CancelToken::new()).unwrap();

        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(&names, &sorted);
        prop_assert_eq!(results.len(), files.len());

        for r in &results {
            let expected = match files[&r.name] {
                Side::Local => Classification::LocalOnly,
                Side::Official => Classification::OfficialOnly,
                Side::BothSame => Classification::Matched,
                Side::BothDifferent => Classification::Mismatched,
            };
            prop_assert_eq!(r.classification, expected, "{}", r.name);
            prop_assert!(r.diffoscope.is_none());
        }
    }
}
