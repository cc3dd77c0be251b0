#![no_main]

//! Fuzz target for artifact name normalization.
//!
//! Normalization must never panic, and a produced logical name must be a
//! clean relative path.

use libfuzzer_sys::fuzz_target;
use rebuilder_artifacts::{Normalized, RuleSet};
use rebuilder_types::job::Target;

#[derive(Debug, arbitrary::Arbitrary)]
struct NameInput {
    raw: String,
    target: TargetChoice,
}

#[derive(Debug, arbitrary::Arbitrary)]
enum TargetChoice {
    X86,
    Ath79,
    Mediatek,
    Custom(String),
}

fuzz_target!(|input: NameInput| {
    let target = match &input.target {
        TargetChoice::X86 => Target::parse("x86/64"),
        TargetChoice::Ath79 => Target::parse("ath79/generic"),
        TargetChoice::Mediatek => Target::parse("mediatek/filogic"),
        TargetChoice::Custom(s) => Target::parse(s),
    };
    let Ok(target) = target else {
        return;
    };

    let rules = RuleSet::v1();
    if let Ok(Normalized::Name(name)) = rules.normalize(&input.raw, &target) {
        assert!(!name.is_empty());
        assert!(!name.starts_with('/'), "absolute name from {:?}", input.raw);
        assert!(!name.chars().any(char::is_control));
        assert!(name.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != ".."));
    }
});
