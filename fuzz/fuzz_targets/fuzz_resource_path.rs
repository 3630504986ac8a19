//! Fuzz testing for resource path normalization.
//!
//! Any string either fails to parse or yields a path that parses back to
//! itself and whose parent chain ends at a top-level segment.

#![no_main]

use libfuzzer_sys::fuzz_target;

use arbordb::ResourcePath;

fuzz_target!(|raw: &str| {
    let Ok(path) = ResourcePath::parse(raw) else {
        return;
    };

    let again = ResourcePath::parse(path.as_str()).expect("normalized path parses");
    assert_eq!(again, path);

    let mut depth = path.depth();
    let mut current = path;
    while let Some(parent) = current.parent() {
        assert!(parent.is_ancestor_of(&current));
        assert_eq!(parent.depth() + 1, depth);
        depth -= 1;
        current = parent;
    }
    assert_eq!(depth, 1);
});
