use gate_route::Pattern;
use proptest::prelude::*;

proptest! {
    #[test]
    fn compile_never_panics(pattern in ".*") {
        let _ = Pattern::compile(&pattern);
    }

    #[test]
    fn literal_pattern_matches_itself(input in "[a-z0-9./_-]{0,40}") {
        // No metacharacters in the alphabet, so the pattern is literal.
        let pattern = Pattern::compile(&input).expect("literal pattern compiles");
        if input.is_empty() {
            // Empty is promoted to `*`.
            prop_assert!(pattern.matches(""));
        } else {
            prop_assert!(pattern.matches(&input));
        }
    }

    #[test]
    fn matching_is_deterministic(pattern in "[a-z0-9.*?/-]{0,20}", input in "[a-z0-9./-]{0,40}") {
        let compiled = Pattern::compile(&pattern).expect("pattern compiles");
        prop_assert_eq!(compiled.matches(&input), compiled.matches(&input));
        prop_assert_eq!(compiled.matches_path(&input), compiled.matches_path(&input));
    }

    #[test]
    fn star_prefix_accepts_any_suffix(suffix in "[a-z0-9/]{0,20}") {
        let pattern = Pattern::compile("/static/*").expect("pattern compiles");
        let full = format!("/static/{}", suffix);
        prop_assert!(pattern.matches(&full));
    }

    #[test]
    fn trailing_slash_equivalence(path in "/[a-z0-9/]{0,20}") {
        // matches_path(p) holds exactly when p or p+"/" matches.
        let pattern = Pattern::compile("/app/?x/*").expect("pattern compiles");
        let expected = pattern.matches(&path) || pattern.matches(&format!("{path}/"));
        prop_assert_eq!(pattern.matches_path(&path), expected);
    }
}
